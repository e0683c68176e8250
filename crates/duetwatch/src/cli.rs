//! Clap derive structures for the `duetwatch` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// duetwatch -- mirror a RepRapFirmware board's object model
#[derive(Debug, Parser)]
#[command(
    name = "duetwatch",
    version,
    about = "Mirror and drive RepRapFirmware (Duet) boards",
    long_about = "Keeps a local copy of a Duet board's object model in sync over the\n\
        HTTP polling API and correlates G-code commands with their replies.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Printer profile to use
    #[arg(long, short = 'p', env = "DUETWATCH_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Board address, URL or bare host (overrides profile)
    #[arg(long, short = 'a', env = "DUETWATCH_ADDRESS", global = true)]
    pub address: Option<String>,

    /// Board password (overrides profile, env and keyring)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "DUETWATCH_OUTPUT",
        default_value = "json",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "DUETWATCH_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text (scripting)
    Plain,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mirror the board and print replies as they arrive
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Send G-code commands and print their replies
    #[command(alias = "g")]
    Gcode(GcodeArgs),

    /// Fetch the full object model and print it
    #[command(alias = "m")]
    Model(ModelArgs),

    /// Fetch the full object model and print the sequence counters
    Seqs,

    /// Manage configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Also report which top-level keys changed on every tick
    #[arg(long)]
    pub show_changes: bool,
}

#[derive(Debug, Args)]
pub struct GcodeArgs {
    /// Commands to send, in order
    #[arg(required = true, num_args = 1..)]
    pub commands: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ModelArgs {
    /// Print only this subtree (e.g. `move.axes[0]`)
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the resolved configuration (secrets redacted)
    Show,

    /// Store the active profile's password in the system keyring
    SetPassword,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }
}
