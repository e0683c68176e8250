//! Command dispatch: bridges CLI args -> `Printer` -> output formatting.

pub mod config_cmd;
pub mod gcode;
pub mod model;
pub mod seqs;
pub mod watch;

use duetwatch_core::Printer;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a board-bound command to its handler.
pub async fn dispatch(cmd: Command, printer: &Printer, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(printer, &args).await,
        Command::Gcode(args) => gcode::handle(printer, &args, global).await,
        Command::Model(args) => model::handle(printer, &args, global).await,
        Command::Seqs => seqs::handle(printer, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}

/// Run `f` against a connected printer, disconnecting afterwards
/// whatever the outcome.
pub async fn with_session<F, Fut, R>(printer: &Printer, f: F) -> Result<R, CliError>
where
    F: FnOnce(Printer) -> Fut,
    Fut: Future<Output = Result<R, CliError>>,
{
    printer.connect().await?;
    let result = f(printer.clone()).await;
    printer.disconnect().await;
    result
}
