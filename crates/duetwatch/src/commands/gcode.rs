use duetwatch_core::Printer;
use serde::Serialize;

use crate::cli::{GcodeArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output::{escape_reply, print_output, render};

use super::with_session;

#[derive(Debug, Serialize)]
struct Exchange<'a> {
    command: &'a str,
    reply: String,
}

/// Send each command in order and print its reply.
pub async fn handle(
    printer: &Printer,
    args: &GcodeArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    with_session(printer, |printer| run(printer, &args.commands, global.output)).await
}

/// Replies only arrive through the poller noticing the `reply` counter,
/// so the baseline is established and the poller running before the
/// first command goes out.
async fn run(printer: Printer, commands: &[String], format: OutputFormat) -> Result<(), CliError> {
    printer.tick().await?;
    printer.spawn_poller().await;

    for command in commands {
        let exchange = Exchange {
            command,
            reply: printer.gcode(command).await?,
        };
        print_output(&render(format, &exchange, |e| escape_reply(&e.reply))?);
    }
    Ok(())
}
