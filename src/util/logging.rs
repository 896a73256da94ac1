//! Structured logging setup
//!
//! Logs always go to stderr so streamed replies on stdout stay clean. The
//! subscriber can only be installed once per process; later calls are
//! ignored.
//!
//! # Example
//!
//! ```no_run
//! use ollama_chat::util::logging;
//!
//! // Reads OLLAMA_CHAT_LOG_LEVEL and OLLAMA_CHAT_LOG_JSON
//! logging::init_from_env();
//!
//! tracing::info!("ready");
//! ```

use crate::config::ENV_LOG_LEVEL;
use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Switches the log output to JSON lines
pub const ENV_LOG_JSON: &str = "OLLAMA_CHAT_LOG_JSON";

/// Targets that are too chatty below warn
const NOISY_TARGETS: &[&str] = &["h2", "hyper", "hyper_util", "reqwest"];

static INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for this crate's own events
    pub level: Level,

    pub use_json: bool,

    /// Include the module target (e.g., ollama_chat::session) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Picks the level the way the CLI flags ask for it
    ///
    /// An explicit level wins over `-v`/`-q`, which win over the environment.
    pub fn from_flags(log_level: Option<&str>, verbose: bool, quiet: bool) -> Self {
        let level = if let Some(level_str) = log_level {
            parse_level(level_str)
        } else if verbose {
            Level::DEBUG
        } else if quiet {
            Level::ERROR
        } else {
            level_from_env()
        };

        Self {
            level,
            use_json: json_from_env(),
            ..Default::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::from_default_env();

        // RUST_LOG takes over completely when set
        if env::var("RUST_LOG").is_ok() {
            return filter;
        }

        let own = format!("ollama_chat={}", self.level);
        let directives = std::iter::once(own)
            .chain(NOISY_TARGETS.iter().map(|target| format!("{}=warn", target)));
        for directive in directives {
            match directive.parse::<Directive>() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Ignoring log directive '{}': {}", directive, e),
            }
        }
        filter
    }
}

/// Parses a log level, falling back to INFO
///
/// ```
/// use ollama_chat::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("WARN"), Level::WARN);
/// assert_eq!(parse_level("loud"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn level_from_env() -> Level {
    env::var(ENV_LOG_LEVEL)
        .map(|s| parse_level(&s))
        .unwrap_or(Level::INFO)
}

fn json_from_env() -> bool {
    env::var(ENV_LOG_JSON)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false)
}

pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = config.filter();

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .init();
        }
    });
}

pub fn init_from_env() {
    init_logging(LoggingConfig::from_flags(None, false, false));
}
