use clap::{Args, Parser, Subcommand};
use formfit::artifact::FileArtifact;
use formfit::config::{ServiceConfig, DEFAULT_PASSWORD, DEFAULT_SERVICE_URL};
use formfit::constraints::{extract_constraints, FileInputAttrs};
use formfit::envelope;
use formfit::handoff::{requested_result_name, ArtifactHandoff, DirectoryHandoff};
use formfit::operation::OperationKind;
use formfit::planner::plan;
use formfit::selection::{FormProcessor, SelectionOutcome};
use formfit::transport::HttpTransport;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "formfit", about = "Fit files to web form upload constraints via the processing service")]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ServiceArgs {
    /// Base URL of the processing service
    #[arg(long, global = true, env = "FORMFIT_SERVICE_URL", default_value = DEFAULT_SERVICE_URL)]
    service_url: String,
    /// Shared secret for envelopes and the X-Password header
    #[arg(long, global = true, env = "FORMFIT_PASSWORD", default_value = DEFAULT_PASSWORD, hide_env_values = true)]
    password: String,
    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    timeout: u64,
}

/// The target form: its file input's attributes and its visible text.
#[derive(Args)]
struct FormArgs {
    /// Text file holding the page's visible text
    #[arg(long)]
    page: Option<PathBuf>,
    /// Value of the input's `accept` attribute
    #[arg(long)]
    accept: Option<String>,
    /// Value of the input's `data-max-size` attribute
    #[arg(long)]
    max_size: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the constraints inferred for a form, and the plan for a file
    Inspect {
        #[command(flatten)]
        form: FormArgs,
        /// File to plan against the inferred constraints
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Fit a file to a form, as if it had just been selected
    Process {
        input: PathBuf,
        #[command(flatten)]
        form: FormArgs,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Run one explicitly requested operation: compress, split, convert
    Run {
        /// Operation name (compress on an image uses the image compressor)
        #[arg(short, long, value_parser = parse_single_file_op)]
        op: OperationKind,
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Merge several files into one PDF
    Merge {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Seal a file into an envelope
    Encrypt {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Open an envelope
    Decrypt {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::default()
        .with_base_url(cli.service.service_url)
        .with_password(cli.service.password)
        .with_timeout(Duration::from_secs(cli.service.timeout));

    match cli.command {

        // ── Inspect ──────────────────────────────────────────────────────────
        Commands::Inspect { form, file } => {
            let (attrs, text) = read_form(&form)?;
            let constraints = extract_constraints(&attrs, &text);
            println!("{}", serde_json::to_string_pretty(&constraints)?);
            if let Some(path) = file {
                let artifact = FileArtifact::from_path(&path)?;
                let planned = plan(artifact.meta(), &constraints);
                if planned.is_noop() {
                    println!("{}: meets constraints", artifact.name());
                } else {
                    let ops: Vec<&str> = planned.operations.iter().map(|op| op.name()).collect();
                    println!("{}: {}", artifact.name(), ops.join(" -> "));
                }
                if let Some((w, h)) = planned.dimension_hint {
                    println!("  target dimensions {}x{} (not enforced)",
                        w.map_or("?".into(), |v| v.to_string()),
                        h.map_or("?".into(), |v| v.to_string()));
                }
            }
        }

        // ── Process ──────────────────────────────────────────────────────────
        Commands::Process { input, form, output_dir } => {
            let (attrs, text) = read_form(&form)?;
            let artifact = FileArtifact::from_path(&input)?;
            let processor = FormProcessor::new(HttpTransport::new(config.clone())?, &config.password);
            let mut handoff = DirectoryHandoff::new(&output_dir);
            let tag = handoff.slot.select(vec![artifact.clone()]);

            match processor.on_selection(&mut handoff, &tag, vec![artifact], &attrs, &text)? {
                SelectionOutcome::Unchanged => println!("{}: meets constraints", input.display()),
                SelectionOutcome::Replaced { artifact, report, download } => {
                    let path = match download {
                        Some(path) => path,
                        None       => handoff.download(&artifact, artifact.name())?,
                    };
                    let ops: Vec<&str> = report.executed.iter().map(|op| op.name()).collect();
                    println!("{} -> {} [{}]", input.display(), path.display(), ops.join(", "));
                }
                SelectionOutcome::Downloaded { path, .. } => {
                    println!("{} -> {}", input.display(), path.display());
                }
                SelectionOutcome::Merged { .. } | SelectionOutcome::Discarded => {}
            }
        }

        // ── Run ──────────────────────────────────────────────────────────────
        Commands::Run { op, input, output_dir } => {
            let artifact = FileArtifact::from_path(&input)?;
            let processor = FormProcessor::new(HttpTransport::new(config.clone())?, &config.password);
            let resolved = op.resolve_manual(artifact.mime());
            let report = processor.executor().run_requested(artifact.clone(), op)?;
            let name = requested_result_name(&report, resolved, artifact.name());
            let path = DirectoryHandoff::new(&output_dir).download(&report.artifact, &name)?;
            println!("{} -> {}", input.display(), path.display());
        }

        // ── Merge ────────────────────────────────────────────────────────────
        Commands::Merge { inputs, output_dir } => {
            let files = inputs
                .iter()
                .map(FileArtifact::from_path)
                .collect::<Result<Vec<_>, _>>()?;
            let processor = FormProcessor::new(HttpTransport::new(config.clone())?, &config.password);
            let mut handoff = DirectoryHandoff::new(&output_dir);
            let tag = handoff.slot.select(files.clone());
            match processor.on_selection(&mut handoff, &tag, files, &FileInputAttrs::default(), "")? {
                SelectionOutcome::Merged { path, .. } => {
                    println!("Merged {} files -> {}", inputs.len(), path.display());
                }
                _ => println!("Nothing merged"),
            }
        }

        // ── Encrypt ──────────────────────────────────────────────────────────
        Commands::Encrypt { input, output } => {
            let data = std::fs::read(&input)?;
            let sealed = envelope::encrypt(&data, &config.password)?;
            println!("  iv {}  {} B -> {} B", hex::encode(sealed.iv()), data.len(), sealed.len());
            std::fs::write(&output, sealed.as_bytes())?;
            println!("Sealed: {}", output.display());
        }

        // ── Decrypt ──────────────────────────────────────────────────────────
        Commands::Decrypt { input, output } => {
            let data = std::fs::read(&input)?;
            let opened = envelope::decrypt(&data, &config.password)?;
            std::fs::write(&output, &opened)?;
            println!("Opened: {} ({} B)", output.display(), opened.len());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn read_form(form: &FormArgs) -> std::io::Result<(FileInputAttrs, String)> {
    let text = match &form.page {
        Some(path) => std::fs::read_to_string(path)?,
        None       => String::new(),
    };
    let attrs = FileInputAttrs {
        accept:        form.accept.clone(),
        data_max_size: form.max_size.clone(),
    };
    Ok((attrs, text))
}

/// `--op` accepts every operation except `merge`, which has its own command.
fn parse_single_file_op(s: &str) -> Result<OperationKind, String> {
    let op: OperationKind = s.parse()?;
    if !op.is_single_file() {
        return Err(format!("'{op}' takes several files; use the merge command"));
    }
    Ok(op)
}
