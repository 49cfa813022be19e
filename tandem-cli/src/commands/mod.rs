use crate::cli::Commands;
use anyhow::Result;

pub mod namespaces;
pub mod share;

/// Dispatch command to appropriate handler
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Share(args) => share::execute(args).await,
        Commands::Namespaces { pid } => namespaces::execute(pid),
    }
}
