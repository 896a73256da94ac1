use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Terminal chat client for Ollama with automatic backend fallback
#[derive(Parser, Debug)]
#[command(
    name = "ollama-chat",
    about = "Terminal chat client for Ollama with automatic backend fallback",
    version,
    author,
    long_about = "ollama-chat talks to a local Ollama server, falls back to a remote Ollama host \
                  and then to an OpenAI-compatible provider when no server is reachable. \
                  Replies are streamed as they are generated, and images can be attached for \
                  vision-capable models."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Chat with a model",
        long_about = "Starts an interactive chat, or answers a single prompt with --prompt.\n\n\
                      In the interactive chat:\n  \
                      /image PATH   attach an image to the next message\n  \
                      /history      show the conversation so far\n  \
                      /quit         leave\n\n\
                      Examples:\n  \
                      ollama-chat chat\n  \
                      ollama-chat chat --model llama3.1 --prompt \"Explain ownership\"\n  \
                      ollama-chat chat --image photo.png --prompt \"What is in this picture?\""
    )]
    Chat(ChatArgs),

    #[command(
        about = "Check backend availability",
        long_about = "Probes the local and remote Ollama endpoints and reports which backend a \
                      chat session would use.\n\n\
                      Examples:\n  \
                      ollama-chat health\n  \
                      ollama-chat health --format json"
    )]
    Health(HealthArgs),

    #[command(about = "List models available on the selected backend")]
    Models(ModelsArgs),

    #[command(
        about = "Download a model to the selected Ollama server",
        long_about = "Pulls a model onto the Ollama server a chat session would use, showing \
                      download progress.\n\n\
                      Examples:\n  \
                      ollama-chat pull\n  \
                      ollama-chat pull llava:13b"
    )]
    Pull(PullArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ChatArgs {
    #[arg(
        short = 'm',
        long,
        value_name = "MODEL",
        help = "Ollama model to use (overrides OLLAMA_CHAT_MODEL)"
    )]
    pub model: Option<String>,

    #[arg(
        short = 'i',
        long,
        value_name = "PATH",
        help = "Image to attach to the first message (png, jpg, jpeg, svg, gif, webp)"
    )]
    pub image: Option<PathBuf>,

    #[arg(
        short = 'p',
        long,
        value_name = "TEXT",
        help = "Send a single message and exit"
    )]
    pub prompt: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct HealthArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ModelsArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct PullArgs {
    #[arg(value_name = "MODEL", help = "Model to download (defaults to the configured model)")]
    pub model: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_chat_args() {
        let args = CliArgs::parse_from(["ollama-chat", "chat"]);
        match args.command {
            Commands::Chat(chat_args) => {
                assert!(chat_args.model.is_none());
                assert!(chat_args.image.is_none());
                assert!(chat_args.prompt.is_none());
            }
            _ => panic!("Expected Chat command"),
        }
    }

    #[test]
    fn test_chat_with_options() {
        let args = CliArgs::parse_from([
            "ollama-chat",
            "chat",
            "--model",
            "llava:13b",
            "--image",
            "/tmp/cat.png",
            "--prompt",
            "what is this?",
        ]);

        match args.command {
            Commands::Chat(chat_args) => {
                assert_eq!(chat_args.model.as_deref(), Some("llava:13b"));
                assert_eq!(chat_args.image, Some(PathBuf::from("/tmp/cat.png")));
                assert_eq!(chat_args.prompt.as_deref(), Some("what is this?"));
            }
            _ => panic!("Expected Chat command"),
        }
    }

    #[test]
    fn test_health_command() {
        let args = CliArgs::parse_from(["ollama-chat", "health", "--format", "yaml"]);
        match args.command {
            Commands::Health(health_args) => {
                assert_eq!(health_args.format, OutputFormatArg::Yaml);
            }
            _ => panic!("Expected Health command"),
        }
    }

    #[test]
    fn test_pull_command() {
        let args = CliArgs::parse_from(["ollama-chat", "pull", "moondream"]);
        match args.command {
            Commands::Pull(pull_args) => assert_eq!(pull_args.model.as_deref(), Some("moondream")),
            _ => panic!("Expected Pull command"),
        }

        let args = CliArgs::parse_from(["ollama-chat", "pull"]);
        assert!(matches!(args.command, Commands::Pull(PullArgs { model: None })));
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["ollama-chat", "-v", "models"]);
        assert!(args.verbose);
        assert!(!args.quiet);

        let args = CliArgs::parse_from(["ollama-chat", "--log-level", "debug", "health"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(CliArgs::try_parse_from(["ollama-chat", "-v", "-q", "health"]).is_err());
    }
}
