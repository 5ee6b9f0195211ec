//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`init`], [`validate`], [`health`] or
//! [`send`]. Each handler lives in its own submodule.

pub mod health;
pub mod init;
pub mod run;
pub mod send;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::RelayError;

pub async fn dispatch(cli: Cli) -> Result<(), RelayError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Init(ref args)) => init::execute(args),
        Some(Commands::Validate(ref args)) => validate::execute(args),
        Some(Commands::Health(args)) => health::execute(args).await,
        Some(Commands::Send(args)) => send::execute(*args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  hdh-relay v{version}: health data hub message relay\n\n  \
         No command provided. To get started:\n\n    \
         hdh-relay init                    Generate a starter config\n    \
         hdh-relay run                     Start the relay (auto-detects ./hdh-relay.yaml)\n    \
         hdh-relay send --help             Route a single message from the shell\n    \
         hdh-relay --help                  See all commands and options\n"
    );
}
