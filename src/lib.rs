//! ollama-chat - terminal chat client for Ollama with backend fallback
//!
//! A chat session resolves an inference backend once at startup, keeps the
//! conversation in memory, and streams every reply as it is generated.
//!
//! # Core Concepts
//!
//! - **Backend resolution**: local Ollama first (unless hosted), then a
//!   configured remote Ollama host, then an OpenAI-compatible provider when a
//!   credential is configured
//! - **Transcript**: the ordered, append-only list of turns sent in full with
//!   every request
//! - **Response stream**: fragments as they arrive, then exactly one
//!   completed or failed event; only completed replies are recorded
//!
//! # Example Usage
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use ollama_chat::progress::NoOpHandler;
//! use ollama_chat::{ChatConfig, ChatSession, StreamEvent};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ChatConfig::default();
//! let mut session = ChatSession::from_config(&config, Arc::new(NoOpHandler)).await;
//!
//! let mut reply = session.submit("Why is the sky blue?", None).await?;
//! while let Some(event) = reply.next().await {
//!     match event {
//!         StreamEvent::Fragment(text) => print!("{}", text),
//!         StreamEvent::Completed(_) => println!(),
//!         StreamEvent::Failed(e) => eprintln!("{}\n{}", e, e.remediation()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`llm`]: probing, resolution, request building and backend clients
//! - [`session`]: transcript ownership and reply streaming
//! - [`progress`]: progress events for resolution and model downloads
//! - [`cli`]: command-line interface

pub mod cli;
pub mod config;
pub mod llm;
pub mod progress;
pub mod session;
pub mod util;

pub use config::{ChatConfig, ConfigError, ExecutionContext};
pub use llm::{BackendDescriptor, BackendKind, ChatBackend, ChatError, Role, Turn};
pub use session::{ChatSession, ResponseStream, SessionOptions, StreamEvent};
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
