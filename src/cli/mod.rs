pub mod commands;
pub mod handlers;
pub mod output;
pub mod progress;

pub use commands::{ChatArgs, CliArgs, Commands, HealthArgs, ModelsArgs, PullArgs};
pub use output::{OutputFormat, OutputFormatter};
pub use progress::PullProgressBar;
