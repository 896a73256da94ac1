//! Command handlers
//!
//! Each handler returns the process exit code: 0 on success, 1 on failure.
//! Errors are printed together with their remediation text.

use super::commands::{ChatArgs, HealthArgs, ModelsArgs, PullArgs};
use super::output::{
    BackendHealth, HealthReport, HealthStatus, ModelsReport, OutputFormat, OutputFormatter,
};
use super::progress::PullProgressBar;
use crate::config::ChatConfig;
use crate::llm::{
    BackendConnector, BackendDescriptor, BackendResolver, ChatError, HttpConnector, HttpProbe,
    ProbeOutcome, Provisioning, TransportProbe, Turn,
};
use crate::progress::{LoggingHandler, ProgressHandler};
use crate::session::{ChatSession, StreamEvent, Transcript};
use anyhow::{bail, Context, Result};
use bytes::Bytes;
use futures_util::StreamExt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, error, info};

/// Image types the chat accepts
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "svg", "gif", "webp"];

/// A line typed into the interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    Empty,
    Quit,
    History,
    Image(&'a str),
    Message(&'a str),
}

pub fn parse_repl_command(line: &str) -> ReplCommand<'_> {
    let line = line.trim();
    match line {
        "" => ReplCommand::Empty,
        "/quit" | "/exit" => ReplCommand::Quit,
        "/history" => ReplCommand::History,
        _ => match line.strip_prefix("/image") {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
                ReplCommand::Image(rest.trim())
            }
            _ => ReplCommand::Message(line),
        },
    }
}

/// Reads an image attachment after checking its type
pub fn load_image(path: &Path) -> Result<Bytes> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if !SUPPORTED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        bail!(
            "Unsupported image type '{}'. Supported: {}",
            path.display(),
            SUPPORTED_IMAGE_EXTENSIONS.join(", ")
        );
    }
    if !path.is_file() {
        bail!("Image not found: {}", path.display());
    }

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    debug!("Loaded image {} ({} bytes)", path.display(), bytes.len());
    Ok(Bytes::from(bytes))
}

fn load_config() -> Result<ChatConfig> {
    let config = ChatConfig::default();
    config.validate().context("Invalid configuration")?;
    debug!("Configuration:\n{}", config);
    Ok(config)
}

fn print_chat_error(error: &ChatError) {
    eprintln!("Error: {}\n\n{}", error, error.remediation());
}

pub async fn handle_chat(args: &ChatArgs, quiet: bool) -> i32 {
    match run_chat(args, quiet).await {
        Ok(code) => code,
        Err(e) => {
            error!("Chat failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

async fn run_chat(args: &ChatArgs, quiet: bool) -> Result<i32> {
    let mut config = load_config()?;
    if let Some(model) = &args.model {
        config.model = model.clone();
    }

    let image = args.image.as_deref().map(load_image).transpose()?;

    let progress: Arc<dyn ProgressHandler> = if quiet {
        Arc::new(LoggingHandler)
    } else {
        Arc::new(PullProgressBar::new())
    };
    let mut session = ChatSession::from_config(&config, progress).await;

    match &args.prompt {
        Some(prompt) => match stream_reply(&mut session, prompt, image).await {
            Ok(_) => Ok(0),
            Err(e) => {
                print_chat_error(&e);
                Ok(1)
            }
        },
        None => {
            if let Some(e) = session.setup_error() {
                print_chat_error(e);
            }
            run_repl(&mut session, image, quiet).await
        }
    }
}

/// Sends one message and prints the reply as it arrives
async fn stream_reply(
    session: &mut ChatSession,
    text: &str,
    image: Option<Bytes>,
) -> Result<Turn, ChatError> {
    let mut stream = session.submit(text, image).await?;
    let mut stdout = std::io::stdout();

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Fragment(fragment) => {
                print!("{}", fragment);
                let _ = stdout.flush();
            }
            StreamEvent::Completed(turn) => {
                println!();
                return Ok(turn);
            }
            StreamEvent::Failed(e) => {
                println!();
                return Err(e);
            }
        }
    }
    Err(ChatError::stream_failed("reply ended without a result"))
}

async fn run_repl(session: &mut ChatSession, image: Option<Bytes>, quiet: bool) -> Result<i32> {
    if !quiet {
        if let (Some(descriptor), Some(model)) = (session.descriptor(), session.model()) {
            eprintln!("Chatting with {} on {}. Type /quit to leave.", model.name, descriptor);
        }
    }

    let mut pending_image = image;
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next().await.transpose().context("Failed to read input")? else {
            println!();
            break;
        };

        match parse_repl_command(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::History => print_history(session.transcript()),
            ReplCommand::Image(path) => match load_image(Path::new(path)) {
                Ok(bytes) => {
                    pending_image = Some(bytes);
                    eprintln!("Attached {} to the next message", path);
                }
                Err(e) => eprintln!("Error: {:#}", e),
            },
            ReplCommand::Message(text) => {
                let before = session.transcript().len();
                if let Err(e) = stream_reply(session, text, pending_image.clone()).await {
                    print_chat_error(&e);
                }
                // The image went out with the message once the turn was recorded
                if session.transcript().len() > before {
                    pending_image = None;
                }
            }
        }
    }

    info!("Chat ended after {} turns", session.transcript().len());
    Ok(0)
}

fn print_history(transcript: &Transcript) {
    if transcript.is_empty() {
        println!("(no messages yet)");
        return;
    }
    for turn in transcript.turns() {
        let attachment = if turn.has_image() { " [image]" } else { "" };
        println!("{}{}: {}", turn.role(), attachment, turn.text());
    }
}

pub async fn handle_health(args: &HealthArgs) -> i32 {
    match run_health(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

async fn run_health(args: &HealthArgs) -> Result<i32> {
    let config = load_config()?;
    let probe = Arc::new(HttpProbe::new(config.probe_timeout()));
    let signals = config.signals();

    let mut backends = Vec::new();
    let local_status = if signals.hosted {
        HealthStatus::unavailable("skipped in hosted context")
    } else {
        probe_status(probe.as_ref(), &signals.local_endpoint).await
    };
    backends.push(BackendHealth {
        name: "local".to_string(),
        endpoint: signals.local_endpoint.clone(),
        status: local_status,
    });

    if let Some(remote) = &signals.remote_endpoint {
        backends.push(BackendHealth {
            name: "remote".to_string(),
            endpoint: remote.clone(),
            status: probe_status(probe.as_ref(), remote).await,
        });
    }

    backends.push(BackendHealth {
        name: "provider".to_string(),
        endpoint: signals.provider_endpoint.clone(),
        status: if signals.provider_credential {
            HealthStatus::available("credential configured").with_details("not probed")
        } else {
            HealthStatus::unavailable("no credential configured")
        },
    });

    let resolved = BackendResolver::new(probe).resolve(&signals).await;
    let report = HealthReport {
        backends,
        selected: resolved.as_ref().ok().map(|d| d.to_string()),
        remediation: resolved.as_ref().err().map(|e| e.remediation()),
    };

    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    println!("{}", formatter.format_health(&report)?);

    Ok(if resolved.is_ok() { 0 } else { 1 })
}

async fn probe_status(probe: &dyn TransportProbe, endpoint: &str) -> HealthStatus {
    match probe.probe(endpoint).await {
        ProbeOutcome::Healthy => HealthStatus::available("Ollama is running"),
        ProbeOutcome::Unreachable(detail) => HealthStatus::unavailable(detail),
    }
}

async fn resolve(
    config: &ChatConfig,
    progress: Arc<dyn ProgressHandler>,
) -> Result<BackendDescriptor, ChatError> {
    BackendResolver::new(Arc::new(HttpProbe::new(config.probe_timeout())))
        .with_progress(progress)
        .resolve(&config.signals())
        .await
}

pub async fn handle_models(args: &ModelsArgs) -> i32 {
    match run_models(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

async fn run_models(args: &ModelsArgs) -> Result<i32> {
    let config = load_config()?;
    let descriptor = match resolve(&config, Arc::new(LoggingHandler)).await {
        Ok(descriptor) => descriptor,
        Err(e) => {
            print_chat_error(&e);
            return Ok(1);
        }
    };

    let backend = HttpConnector::new(config.clone()).connect(&descriptor);
    let models = backend.list_models().await;
    let configured_model = if descriptor.kind.is_ollama() {
        config.model.clone()
    } else {
        config.provider_model.clone()
    };

    let report = ModelsReport {
        backend: descriptor.to_string(),
        configured_model,
        models: models.into_iter().map(|m| m.name).collect(),
    };
    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    println!("{}", formatter.format_models(&report)?);
    Ok(0)
}

pub async fn handle_pull(args: &PullArgs, quiet: bool) -> i32 {
    match run_pull(args, quiet).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

async fn run_pull(args: &PullArgs, quiet: bool) -> Result<i32> {
    let config = load_config()?;
    let model = args.model.clone().unwrap_or_else(|| config.model.clone());

    let progress: Arc<dyn ProgressHandler> = if quiet {
        Arc::new(LoggingHandler)
    } else {
        Arc::new(PullProgressBar::new())
    };

    let descriptor = match resolve(&config, progress.clone()).await {
        Ok(descriptor) => descriptor,
        Err(e) => {
            print_chat_error(&e);
            return Ok(1);
        }
    };
    if !descriptor.kind.is_ollama() {
        bail!(
            "No Ollama server is reachable; models cannot be downloaded to {}",
            descriptor
        );
    }

    let backend = HttpConnector::new(config).connect(&descriptor);
    match backend.ensure_model(&model, progress.as_ref()).await {
        Provisioning::AlreadyPresent => {
            println!("{} is already present on {}", model, descriptor);
            Ok(0)
        }
        Provisioning::Pulled | Provisioning::Deferred => {
            println!("{} is ready on {}", model, descriptor);
            Ok(0)
        }
        Provisioning::Failed(detail) => {
            print_chat_error(&ChatError::provision_failed(&model, detail));
            Ok(1)
        }
    }
}
