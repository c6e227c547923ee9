//! Single-shot JSON integration: `POST /process`.
//!
//! This is a separate surface from the per-operation multipart endpoints.
//! The file travels as standard base64 inside a JSON body with no envelope
//! and no password header; the service decides the operations itself from
//! the constraints.
//!
//! ```text
//! request:  {"file": "<base64>", "filename": "a.pdf", "constraints": {...}}
//! response: {"file": "<base64>"}
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifact::FileArtifact;
use crate::constraints::Constraints;
use crate::error::PipelineError;
use crate::transport::{RequestBody, ServiceRequest, Transport};

pub const PROCESS_ENDPOINT: &str = "/process";

#[derive(Debug, Serialize)]
struct ProcessRequest<'a> {
    file:        String,
    filename:    &'a str,
    constraints: &'a Constraints,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    file: String,
}

pub struct JsonProcessClient<T: Transport> {
    transport: T,
}

impl<T: Transport> JsonProcessClient<T> {
    pub fn new(transport: T) -> Self { Self { transport } }

    /// Submit `artifact` and return the processed file under the same name
    /// and type.
    pub fn process(&self, artifact: &FileArtifact, constraints: &Constraints) -> Result<FileArtifact, PipelineError> {
        let body = ProcessRequest {
            file:        STANDARD.encode(artifact.bytes()),
            filename:    artifact.name(),
            constraints,
        };
        let request = ServiceRequest {
            endpoint: PROCESS_ENDPOINT.to_string(),
            password: None,
            body:     RequestBody::Json(serde_json::to_value(&body)?),
        };

        let response = self.transport.send(request)?;
        if !response.is_success() {
            return Err(PipelineError::ProcessRejected { status: response.status });
        }
        let parsed: ProcessResponse = serde_json::from_slice(&response.body)?;
        let bytes = STANDARD
            .decode(parsed.file.as_bytes())
            .map_err(|e| PipelineError::Payload(e.to_string()))?;

        info!(file = artifact.name(), size = bytes.len(), "processed via JSON endpoint");
        Ok(FileArtifact::new(artifact.name(), artifact.mime(), bytes))
    }
}
