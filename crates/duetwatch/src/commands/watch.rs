use duetwatch_core::{ConnectionState, Printer};
use tracing::info;

use crate::cli::WatchArgs;
use crate::error::CliError;
use crate::output::{escape_reply, print_output};

use super::with_session;

/// Mirror the board until Ctrl-C, printing every reply on its own line.
pub async fn handle(printer: &Printer, args: &WatchArgs) -> Result<(), CliError> {
    let show_changes = args.show_changes;
    with_session(printer, |printer| run(printer, show_changes)).await
}

async fn run(printer: Printer, show_changes: bool) -> Result<(), CliError> {
    // Baseline before the poller starts so the first reply bump is
    // seen as a change.
    let report = printer.tick().await?;
    info!(keys = report.changed.len(), "baseline established");

    let mut replies = printer.subscribe_replies();
    let mut ticks = printer.subscribe_ticks();
    let mut state = printer.connection_state();
    printer.spawn_poller().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                return Ok(());
            }
            changed = replies.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let reply = replies.borrow_and_update().clone();
                if !reply.is_empty() {
                    print_output(&escape_reply(&reply));
                }
            }
            changed = ticks.changed(), if show_changes => {
                if changed.is_err() {
                    return Ok(());
                }
                let report = ticks.borrow_and_update().clone();
                if !report.changed.is_empty() {
                    eprintln!("changed: {}", report.changed.join(", "));
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                if *state.borrow_and_update() == ConnectionState::Failed {
                    return Err(CliError::Protocol {
                        message: "the poller stopped after an unrecoverable update".into(),
                    });
                }
            }
        }
    }
}
