//! CLI configuration: profile resolution with `GlobalOpts` overrides
//! (--address, --password, --timeout, --insecure) on top of
//! `duetwatch_config`.

use std::time::Duration;

use secrecy::SecretString;

use duetwatch_core::{PrinterConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use duetwatch_config::{
    Config, Profile, config_path, load_config, resolve_password, store_password,
};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `PrinterConfig` from the config file, profile and CLI flags.
///
/// Without a matching profile, `--address` alone is enough; the password
/// then comes from the usual chain (env, keyring, firmware default).
pub fn build_printer_config(
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<PrinterConfig, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let profile = match (cfg.profiles.get(&profile_name), &global.address) {
        (Some(profile), _) => profile.clone(),
        (None, Some(address)) => Profile {
            address: address.clone(),
            ..Profile::default()
        },
        // An explicit --profile that doesn't exist is a typo, not a
        // missing setup.
        (None, None) if global.profile.is_some() => cfg.profile(&profile_name)?.clone(),
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    let mut printer = duetwatch_config::profile_to_printer_config(
        &profile,
        &profile_name,
        &cfg.defaults,
    )?;

    if let Some(ref address) = global.address {
        printer.address = duetwatch_config::parse_address(address)?;
    }
    if let Some(ref password) = global.password {
        printer.password = SecretString::from(password.clone());
    }
    if let Some(secs) = global.timeout {
        printer.timeout = Duration::from_secs(secs);
    }
    if global.insecure {
        printer.tls = TlsVerification::DangerAcceptInvalid;
    }

    Ok(printer)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;

    fn global() -> GlobalOpts {
        GlobalOpts {
            profile: None,
            address: None,
            password: None,
            output: OutputFormat::Json,
            verbose: 0,
            insecure: false,
            timeout: None,
        }
    }

    fn config_with_shop() -> Config {
        let mut cfg = Config {
            default_profile: Some("shop".into()),
            ..Config::default()
        };
        cfg.profiles.insert(
            "shop".into(),
            Profile {
                address: "duet.local".into(),
                timeout: Some(5),
                ..Profile::default()
            },
        );
        cfg
    }

    #[test]
    fn flags_override_profile() {
        let mut g = global();
        g.address = Some("10.0.0.9".into());
        g.timeout = Some(2);
        g.insecure = true;

        let printer = build_printer_config(&g, &config_with_shop()).unwrap();
        assert_eq!(printer.address.as_str(), "http://10.0.0.9/");
        assert_eq!(printer.timeout, Duration::from_secs(2));
        assert_eq!(printer.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn profile_values_apply_without_flags() {
        let printer = build_printer_config(&global(), &config_with_shop()).unwrap();
        assert_eq!(printer.address.as_str(), "http://duet.local/");
        assert_eq!(printer.timeout, Duration::from_secs(5));
    }

    #[test]
    fn address_flag_works_without_profile() {
        let mut g = global();
        g.address = Some("192.168.1.50".into());
        let printer = build_printer_config(&g, &Config::default()).unwrap();
        assert_eq!(printer.address.as_str(), "http://192.168.1.50/");
    }

    #[test]
    fn nothing_configured_is_reported() {
        let err = build_printer_config(&global(), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }

    #[test]
    fn unknown_explicit_profile_is_reported() {
        let mut g = global();
        g.profile = Some("nope".into());
        let err = build_printer_config(&g, &config_with_shop()).unwrap_err();
        assert!(matches!(err, CliError::ProfileNotFound { .. }));
    }
}
