use std::fmt::Write as _;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output::{print_output, render};

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            print_output(&config::config_path().display().to_string());
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config()?);
            let out = render(global.output, &cfg, format_plain)?;
            print_output(&out);
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let cfg = config::load_config()?;
            let profile_name = config::active_profile_name(global, &cfg);
            cfg.profile(&profile_name)?;

            let secret = rpassword::prompt_password("Board password: ")?;
            config::store_password(&profile_name, &secret)?;

            eprintln!("✓ Password stored in system keyring for profile '{profile_name}'");
            Ok(())
        }
    }
}

fn redacted(cfg: &Config) -> Config {
    Config {
        default_profile: cfg.default_profile.clone(),
        defaults: cfg.defaults.clone(),
        profiles: cfg
            .profiles
            .iter()
            .map(|(name, profile)| {
                let profile = Profile {
                    password: profile.password.as_ref().map(|_| REDACTED.into()),
                    ..profile.clone()
                };
                (name.clone(), profile)
            })
            .collect(),
    }
}

/// One line per profile: name, address, where its password comes from.
fn format_plain(cfg: &Config) -> String {
    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();

    let mut out = String::new();
    for name in names {
        let Some(profile) = cfg.profiles.get(name) else {
            continue;
        };
        let marker = if cfg.default_profile.as_ref() == Some(name) {
            "*"
        } else {
            " "
        };
        let (_, source) = config::resolve_password(profile, name);
        let _ = writeln!(out, "{marker} {name}\t{}\t{source}", profile.address);
    }
    out.trim_end().to_owned()
}
