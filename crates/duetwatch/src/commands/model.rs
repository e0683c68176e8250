use duetwatch_core::{Node, Printer};

use crate::cli::{GlobalOpts, ModelArgs};
use crate::error::CliError;
use crate::output::{print_output, render};

/// Full fetch, then print the baseline or the subtree at `--key`.
pub async fn handle(
    printer: &Printer,
    args: &ModelArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let model = printer.oneshot(|p| async move { Ok(p.model()) }).await?;
    let Some(model) = model else {
        return Err(CliError::Protocol {
            message: "no object model was established".into(),
        });
    };

    let node = match args.key.as_deref() {
        None | Some("") => model.as_ref(),
        Some(key) => model.pointer(key).ok_or_else(|| CliError::KeyNotFound {
            key: key.to_owned(),
        })?,
    };

    let out = render(global.output, node, plain)?;
    print_output(&out);
    Ok(())
}

/// Strings bare, everything else as compact JSON.
fn plain(node: &Node) -> String {
    node.as_str().map_or_else(|| node.to_string(), str::to_owned)
}
