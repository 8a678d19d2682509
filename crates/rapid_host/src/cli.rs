//! Command-line interface of the console host.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Command line arguments. Every option overrides the matching setting of
/// the configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional database URL or SQLite file for offer outcomes
    pub database: Option<String>,
}

impl CliArgs {
    pub fn parse() -> Self {
        Self::from_matches(command().get_matches())
    }

    fn from_matches(matches: clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            database: matches.get_one::<String>("database").cloned(),
        }
    }
}

fn command() -> Command {
    Command::new("Rapid Host")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Console host for rapid framework plugins")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("URL")
                .help("Record offer outcomes (sqlite:// or mysql:// URL, or a SQLite file path)"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::from_matches(command().get_matches_from(["rapid-host"]));
        assert_eq!(args.config_path, PathBuf::from("config.toml"));
        assert!(args.log_level.is_none());
        assert!(!args.json_logs);
        assert!(args.database.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::from_matches(command().get_matches_from([
            "rapid-host",
            "-c",
            "custom.toml",
            "--log-level",
            "debug",
            "--json-logs",
            "--database",
            "offers.db",
        ]));
        assert_eq!(args.config_path, PathBuf::from("custom.toml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert_eq!(args.database.as_deref(), Some("offers.db"));
    }
}
