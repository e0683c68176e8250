//! Output formatting: JSON, YAML, plain.

use std::io::{self, Write};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Render a serde-serializable value in the chosen format. `plain_fn`
/// supplies the scripting-friendly text form.
pub fn render<T>(
    format: OutputFormat,
    data: &T,
    plain_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(data).map_err(render_err),
        OutputFormat::JsonCompact => serde_json::to_string(data).map_err(render_err),
        OutputFormat::Yaml => serde_yaml::to_string(data).map_err(render_err),
        OutputFormat::Plain => Ok(plain_fn(data)),
    }
}

/// Print rendered output to stdout.
pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// One reply per line: embedded newlines are shown as `\n`.
pub fn escape_reply(reply: &str) -> String {
    reply.trim_end_matches('\n').replace('\n', "\\n")
}

fn render_err(err: impl std::fmt::Display) -> CliError {
    CliError::Render(err.to_string())
}
