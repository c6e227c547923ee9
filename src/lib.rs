pub mod artifact;
pub mod config;
pub mod constraints;
pub mod envelope;
pub mod error;
pub mod handoff;
pub mod merge;
pub mod operation;
pub mod pipeline;
pub mod planner;
pub mod process_api;
pub mod selection;
pub mod transport;

pub use artifact::FileArtifact;
pub use config::ServiceConfig;
pub use constraints::{Constraints, FileInputAttrs, extract_constraints};
pub use envelope::{Envelope, EnvelopeError, encrypt, decrypt};
pub use error::{ErrorKind, PipelineError};
pub use operation::OperationKind;
pub use pipeline::{RunReport, SequentialExecutor};
pub use merge::MergeOrchestrator;
pub use planner::{plan, plan_into};
pub use transport::{HttpTransport, Transport};
