use ollama_chat::cli::commands::{CliArgs, Commands};
use ollama_chat::cli::handlers::{handle_chat, handle_health, handle_models, handle_pull};
use ollama_chat::util::{init_logging, LoggingConfig};
use ollama_chat::VERSION;

use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging(LoggingConfig::from_flags(
        args.log_level.as_deref(),
        args.verbose,
        args.quiet,
    ));

    debug!("ollama-chat v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Chat(chat_args) => handle_chat(chat_args, args.quiet).await,
        Commands::Health(health_args) => handle_health(health_args).await,
        Commands::Models(models_args) => handle_models(models_args).await,
        Commands::Pull(pull_args) => handle_pull(pull_args, args.quiet).await,
    };

    std::process::exit(exit_code);
}
