use std::path::PathBuf;

use clap::Parser;
use prmetrics_config::CONFIG_FILE_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Publishes per-commit metric diffs into pull requests")]
pub struct Cli {
    #[arg(
        long,
        default_value = CONFIG_FILE_NAME,
        help = "Path to the TOML config file (defaults apply when missing)"
    )]
    pub config: PathBuf,

    #[arg(long, help = "Listen address, overrides config and PR_METRICS_BIND")]
    pub bind: Option<String>,

    #[arg(long, help = "SQLite database path, overrides config and PR_METRICS_DB_PATH")]
    pub db_path: Option<PathBuf>,

    #[arg(
        long,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, LogFormat};

    #[test]
    fn defaults_parse_without_flags() {
        let cli = Cli::try_parse_from(["prmetricsd"]).expect("defaults should parse");

        assert_eq!(cli.config.to_str(), Some("pr-metrics.toml"));
        assert_eq!(cli.bind, None);
        assert_eq!(cli.db_path, None);
        assert_eq!(cli.log_format, LogFormat::Human);
    }

    #[test]
    fn overrides_parse() {
        let cli = Cli::try_parse_from([
            "prmetricsd",
            "--config",
            "/etc/prmetrics.toml",
            "--bind",
            "127.0.0.1:9000",
            "--db-path",
            "/var/lib/prmetrics/metrics.sqlite",
            "--log-format",
            "json",
        ])
        .expect("overrides should parse");

        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(
            cli.db_path.as_deref().and_then(|path| path.to_str()),
            Some("/var/lib/prmetrics/metrics.sqlite")
        );
        assert_eq!(cli.log_format.as_str(), "json");
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let err = Cli::try_parse_from(["prmetricsd", "--log-format", "xml"])
            .expect_err("xml is not a log format");

        assert!(err.to_string().contains("expected one of: human, json"));
    }
}
