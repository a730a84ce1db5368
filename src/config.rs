// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{Config, File};
use serde::Deserialize;
use thiserror::Error;

use crate::command::Command;
use crate::version;
use crate::watcher::Credentials;

pub const DEFAULT_MAILBOX: &str = "INBOX";
pub const DEFAULT_CHECK_INTERVAL: &str = "30s";
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(
    name = "imap-notify",
    version = version::full_version(),
    about = "Run a script when new mail is received"
)]
pub struct Cli {
    /// IMAP server address (e.g., imap.example.org:993)
    #[arg(short = 's', long, env = "IMAP_SERVER")]
    pub server: Option<String>,

    /// IMAP username
    #[arg(short = 'u', long, env = "IMAP_USERNAME")]
    pub username: Option<String>,

    /// IMAP password
    #[arg(short = 'p', long, env = "IMAP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// IMAP mailbox [default: INBOX]
    #[arg(short = 'm', long, env = "IMAP_MAILBOX")]
    pub mailbox: Option<String>,

    /// Script to run when new mail arrives
    #[arg(short = 'S', long, env = "SCRIPT")]
    pub script: Option<String>,

    /// If idle mode is not available, interval between mailbox checks [default: 30s]
    #[arg(
        short = 'i',
        long = "check-interval",
        env = "CHECK_INTERVAL",
        allow_hyphen_values = true
    )]
    pub check_interval: Option<String>,

    /// TOML file providing any of the options above
    #[arg(short = 'c', long, env = "IMAP_NOTIFY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Command and arguments to run when --script is not given
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Startup validation failures. `Display` is the one-line diagnostic.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Please specify --server or set IMAP_SERVER in env.")]
    MissingServer,
    #[error("Please specify --username or set IMAP_USERNAME in env.")]
    MissingUsername,
    #[error("Please specify --password or set IMAP_PASSWORD in env.")]
    MissingPassword,
    #[error("Please specify --mailbox or set IMAP_MAILBOX in env.")]
    MissingMailbox,
    #[error("Please specify --script or set SCRIPT in env.")]
    MissingScript,
    #[error("Error: invalid --check-interval value: {0}")]
    InvalidCheckInterval(String),
    #[error("Error: the given --check-interval should be at least 5s.")]
    CheckIntervalTooShort,
    #[error("Error: extraneous arguments: {0}")]
    ExtraneousArguments(String),
    #[error("Error: failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Options after layering defaults, the config file, env vars and flags.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    server: Option<String>,
    username: Option<String>,
    password: Option<String>,
    mailbox: Option<String>,
    script: Option<String>,
    check_interval: Option<String>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub command: Command,
    pub check_interval: Duration,
}

impl Settings {
    /// Layers and validates `cli`. No network activity happens here.
    pub fn load(cli: Cli) -> Result<Self, SettingsError> {
        let raw = layer(&cli)?;
        validate(raw, cli.args)
    }
}

fn layer(cli: &Cli) -> Result<RawSettings, SettingsError> {
    let mut config_builder = Config::builder()
        .set_default("mailbox", DEFAULT_MAILBOX)?
        .set_default("check_interval", DEFAULT_CHECK_INTERVAL)?;

    if let Some(path) = &cli.config {
        config_builder = config_builder.add_source(File::from(path.as_path()).required(true));
    }

    // Flags and env vars (already merged by clap) override the file.
    let overrides = [
        ("server", &cli.server),
        ("username", &cli.username),
        ("password", &cli.password),
        ("mailbox", &cli.mailbox),
        ("script", &cli.script),
        ("check_interval", &cli.check_interval),
    ];
    for (key, value) in overrides {
        if let Some(value) = value {
            config_builder = config_builder.set_override(key, value.as_str())?;
        }
    }

    Ok(config_builder.build()?.try_deserialize()?)
}

fn validate(raw: RawSettings, args: Vec<String>) -> Result<Settings, SettingsError> {
    let check_interval_text = non_empty(raw.check_interval)
        .unwrap_or_else(|| DEFAULT_CHECK_INTERVAL.to_string());
    let check_interval = parse_duration(&check_interval_text)
        .ok_or(SettingsError::InvalidCheckInterval(check_interval_text))?;

    let server = non_empty(raw.server).ok_or(SettingsError::MissingServer)?;
    let username = non_empty(raw.username).ok_or(SettingsError::MissingUsername)?;
    let password = non_empty(raw.password).ok_or(SettingsError::MissingPassword)?;
    let mailbox = non_empty(raw.mailbox).ok_or(SettingsError::MissingMailbox)?;

    let (argv, extraneous) = match non_empty(raw.script) {
        Some(script) => (vec![script], args),
        None => (args, Vec::new()),
    };
    let command = Command::new(argv).map_err(|_| SettingsError::MissingScript)?;

    if check_interval < MIN_CHECK_INTERVAL {
        return Err(SettingsError::CheckIntervalTooShort);
    }
    if !extraneous.is_empty() {
        return Err(SettingsError::ExtraneousArguments(shell_join(&extraneous)));
    }

    Ok(Settings {
        credentials: Credentials {
            server,
            username,
            password,
            mailbox,
        },
        command,
        check_interval,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Parses Go-style durations (`30s`, `1m30s`, `1.5h`, `250ms`) or a bare
/// number of seconds. A leading sign is accepted; negative durations
/// saturate to zero.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let text = input.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if text.is_empty() {
        return None;
    }
    let magnitude = parse_unsigned_duration(text)?;
    Some(if negative { Duration::ZERO } else { magnitude })
}

fn parse_unsigned_duration(text: &str) -> Option<Duration> {
    if let Ok(secs) = text.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut nanos = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest.find(is_number).unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        nanos += value * scale;
        rest = &rest[unit_len..];
    }
    Some(Duration::from_nanos(nanos as u64))
}

/// Joins arguments into a string a POSIX shell would split back the same way.
pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c);
    if !arg.is_empty() && arg.chars().all(safe) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    const ENV_VARS: [&str; 7] = [
        "IMAP_SERVER",
        "IMAP_USERNAME",
        "IMAP_PASSWORD",
        "IMAP_MAILBOX",
        "SCRIPT",
        "CHECK_INTERVAL",
        "IMAP_NOTIFY_CONFIG",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    fn load(args: &[&str]) -> Result<Settings, SettingsError> {
        let argv = std::iter::once("imap-notify").chain(args.iter().copied());
        Settings::load(Cli::try_parse_from(argv).expect("arguments should parse"))
    }

    const FULL: [&str; 8] = [
        "--server", "imap.test:993", "--username", "u", "--password", "p", "--script", "notify.sh",
    ];

    #[test]
    #[serial]
    fn test_full_flags() {
        clear_env();
        let settings = load(&FULL).unwrap();
        assert_eq!(settings.credentials.server, "imap.test:993");
        assert_eq!(settings.credentials.username, "u");
        assert_eq!(settings.credentials.password, "p");
        assert_eq!(settings.credentials.mailbox, "INBOX");
        assert_eq!(settings.command.program(), "notify.sh");
        assert!(settings.command.args().is_empty());
        assert_eq!(settings.check_interval, Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn test_missing_options_in_order() {
        clear_env();
        assert_eq!(load(&[]).unwrap_err().to_string(), "Please specify --server or set IMAP_SERVER in env.");
        assert!(matches!(load(&["-s", "imap.test:993"]), Err(SettingsError::MissingUsername)));
        assert!(matches!(
            load(&["-s", "imap.test:993", "-u", "u"]),
            Err(SettingsError::MissingPassword)
        ));
        assert!(matches!(
            load(&["-s", "imap.test:993", "-u", "u", "-p", "p", "-m", ""]),
            Err(SettingsError::MissingMailbox)
        ));
        assert!(matches!(
            load(&["-s", "imap.test:993", "-u", "u", "-p", "p"]),
            Err(SettingsError::MissingScript)
        ));
        // Later options missing never mask an earlier one.
        assert!(matches!(load(&["-p", "p", "-S", "x"]), Err(SettingsError::MissingServer)));
    }

    #[test]
    #[serial]
    fn test_env_vars() {
        clear_env();
        env::set_var("IMAP_SERVER", "imap.env:993");
        env::set_var("IMAP_USERNAME", "env-user");
        env::set_var("IMAP_PASSWORD", "env-pass");
        env::set_var("IMAP_MAILBOX", "Alerts");
        env::set_var("SCRIPT", "/usr/local/bin/notify");
        env::set_var("CHECK_INTERVAL", "1m");

        let settings = load(&["--username", "flag-user"]).unwrap();
        clear_env();

        assert_eq!(settings.credentials.server, "imap.env:993");
        assert_eq!(settings.credentials.username, "flag-user");
        assert_eq!(settings.credentials.mailbox, "Alerts");
        assert_eq!(settings.command.program(), "/usr/local/bin/notify");
        assert_eq!(settings.check_interval, Duration::from_secs(60));
    }

    #[test]
    #[serial]
    fn test_positional_command() {
        clear_env();
        let settings = load(&[
            "-s", "imap.test:993", "-u", "u", "-p", "p", "--", "notify-send", "-u", "critical", "New mail",
        ])
        .unwrap();
        assert_eq!(settings.command.program(), "notify-send");
        assert_eq!(settings.command.args(), &["-u", "critical", "New mail"]);
    }

    #[test]
    #[serial]
    fn test_extraneous_arguments() {
        clear_env();
        let mut args = FULL.to_vec();
        args.extend(["--", "extra", "two words"]);
        let err = load(&args).unwrap_err();
        assert_eq!(err.to_string(), "Error: extraneous arguments: extra 'two words'");
    }

    #[test]
    #[serial]
    fn test_check_interval_too_short() {
        clear_env();
        let mut args = FULL.to_vec();
        args.extend(["--check-interval", "4s"]);
        let err = load(&args).unwrap_err();
        assert_eq!(err.to_string(), "Error: the given --check-interval should be at least 5s.");

        let mut args = FULL.to_vec();
        args.extend(["-i", "5s"]);
        assert_eq!(load(&args).unwrap().check_interval, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_negative_check_interval_is_too_short() {
        clear_env();
        let mut args = FULL.to_vec();
        args.extend(["-i", "-5s"]);
        let err = load(&args).unwrap_err();
        assert!(matches!(err, SettingsError::CheckIntervalTooShort));
        assert_eq!(err.to_string(), "Error: the given --check-interval should be at least 5s.");
    }

    #[test]
    #[serial]
    fn test_invalid_check_interval() {
        clear_env();
        let mut args = FULL.to_vec();
        args.extend(["-i", "soon"]);
        assert!(matches!(load(&args), Err(SettingsError::InvalidCheckInterval(v)) if v == "soon"));
    }

    #[test]
    #[serial]
    fn test_config_file_layer() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
server = "imap.file:993"
username = "file-user"
password = "file-pass"
mailbox = "Archive"
script = "/opt/hooks/mail"
check_interval = "2m"
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let settings = load(&["--config", &path, "--mailbox", "INBOX"]).unwrap();
        assert_eq!(settings.credentials.server, "imap.file:993");
        assert_eq!(settings.credentials.password, "file-pass");
        assert_eq!(settings.credentials.mailbox, "INBOX");
        assert_eq!(settings.command.program(), "/opt/hooks/mail");
        assert_eq!(settings.check_interval, Duration::from_secs(120));
    }

    #[test]
    #[serial]
    fn test_missing_config_file() {
        clear_env();
        let mut args = FULL.to_vec();
        args.extend(["--config", "/nonexistent/imap-notify.toml"]);
        assert!(matches!(load(&args), Err(SettingsError::Load(_))));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("10 parsecs"), None);
        assert_eq!(parse_duration("+5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("-5s"), Some(Duration::ZERO));
        assert_eq!(parse_duration("-"), None);
        assert_eq!(parse_duration("--5s"), None);
    }

    #[test]
    fn test_shell_join() {
        let args: Vec<String> = ["plain", "with space", "it's", ""].iter().map(|s| s.to_string()).collect();
        assert_eq!(shell_join(&args), r#"plain 'with space' 'it'\''s' ''"#);
    }
}
