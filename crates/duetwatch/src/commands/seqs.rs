use duetwatch_core::{Printer, SequenceCounters};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::{print_output, render};

/// Full fetch, then print the sequence counters the baseline was taken at.
pub async fn handle(printer: &Printer, global: &GlobalOpts) -> Result<(), CliError> {
    let seqs = printer
        .oneshot(|p| async move { Ok(p.seqs().await) })
        .await?
        .unwrap_or_default();

    let out = render(global.output, &seqs, plain)?;
    print_output(&out);
    Ok(())
}

/// One `key value` pair per line.
fn plain(seqs: &SequenceCounters) -> String {
    seqs.iter()
        .map(|(key, value)| format!("{key} {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}
