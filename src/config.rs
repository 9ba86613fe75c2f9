//! CLI configuration via clap.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use clap::Parser;

use crate::error::{Error, Result};

#[derive(Parser, Debug, Clone)]
#[command(name = "cgm-dashboard")]
#[command(about = "Polls per-patient CGM endpoints and serves aggregated dashboard state over HTTP")]
pub struct Config {
    /// Path to the account roster CSV
    #[arg(short, long, default_value = "roster.csv")]
    pub roster: PathBuf,

    /// Upstream base URL template; `{account}` is substituted per account
    #[arg(long, default_value = "https://{account}.herokuapp.com")]
    pub upstream: String,

    /// Seconds between pipeline runs
    #[arg(long, default_value = "300")]
    pub period_secs: u64,

    /// IANA timezone for all displayed times
    #[arg(long, default_value = "Asia/Jerusalem")]
    pub timezone: String,

    /// Dashboard HTTP port
    #[arg(short, long, default_value = "8050")]
    pub port: u16,

    /// Per-account fetch timeout in seconds
    #[arg(long, default_value = "10")]
    pub fetch_timeout_secs: u64,

    /// Maximum concurrent upstream fetches
    #[arg(long, default_value = "8")]
    pub fetch_concurrency: usize,
}

impl Config {
    /// Parse the configured timezone name.
    pub fn tz(&self) -> Result<Tz> {
        Tz::from_str(&self.timezone).map_err(|_| Error::UnknownTimezone(self.timezone.clone()))
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timezone_parses() {
        let config = Config::parse_from(["cgm-dashboard", "--timezone", "Asia/Jerusalem"]);
        assert_eq!(config.tz().unwrap(), chrono_tz::Asia::Jerusalem);
    }

    #[test]
    fn unknown_timezone_rejected() {
        let config = Config::parse_from(["cgm-dashboard", "--timezone", "Mars/Olympus"]);
        assert!(matches!(config.tz(), Err(Error::UnknownTimezone(_))));
    }
}
