use std::{collections::HashSet, env, fmt::Display, str::FromStr, time::Duration};

use dotenv::dotenv;
use log::*;

use crate::error::{Error, Result};
use crate::models::Identity;

/**
 * Settings shared by the binary's subcommands
 */
#[derive(Clone, Debug)]
pub struct Config {
    pub service_url: String,
    pub identity: Identity,
    pub bind: String,
    pub admins: HashSet<String>,
    pub sync: SyncConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let retries = try_load("LIVEPOLL_RETRIES", "2")?;

        Ok(Config {
            service_url: try_load("LIVEPOLL_SERVICE_URL", "http://127.0.0.1:8000")?,
            identity: Identity::from_principal(env::var("LIVEPOLL_PRINCIPAL").ok()),
            bind: try_load("LIVEPOLL_BIND", "127.0.0.1:8000")?,
            admins: parse_list(&env::var("LIVEPOLL_ADMINS").unwrap_or_default()),
            sync: SyncConfig {
                retries,
                ..SyncConfig::default()
            },
        })
    }
}

/**
 * Re-fetch cadence for one feed: a tight interval while the poll is ongoing,
 * a lazy one otherwise
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cadence {
    pub ongoing: Duration,
    pub idle: Duration,
}

impl Cadence {
    pub const STATUS: Cadence = Cadence {
        ongoing: Duration::from_secs(5),
        idle: Duration::from_secs(30),
    };

    pub const RESULTS: Cadence = Cadence {
        ongoing: Duration::from_secs(3),
        idle: Duration::from_secs(30),
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub status: Cadence,
    pub results: Cadence,
    /**
     * Extra attempts after a failed fetch before the feed is marked unavailable
     */
    pub retries: u32,
    /**
     * Delay before the first retry, doubled for each one after
     */
    pub retry_delay: Duration,
    pub countdown_tick: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            status: Cadence::STATUS,
            results: Cadence::RESULTS,
            retries: 2,
            retry_delay: Duration::from_secs(1),
            countdown_tick: Duration::from_secs(1),
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let value = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        Error::Config {
            key: key.to_string(),
            reason: e.to_string(),
        }
    })
}

fn parse_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let admins = parse_list(" alice, ,bob,");
        assert_eq!(admins.len(), 2);
        assert!(admins.contains("alice"));
        assert!(admins.contains("bob"));
    }

    #[test]
    fn test_try_load_reports_bad_values() {
        env::set_var("LIVEPOLL_TEST_RETRIES", "many");
        let err = try_load::<u32>("LIVEPOLL_TEST_RETRIES", "2").unwrap_err();
        assert!(err.to_string().starts_with("Invalid LIVEPOLL_TEST_RETRIES value"));
    }

    #[test]
    fn test_try_load_default() {
        let value: u32 = try_load("LIVEPOLL_TEST_UNSET_KEY", "7").unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_default_cadences() {
        let config = SyncConfig::default();
        assert_eq!(config.status.ongoing, Duration::from_secs(5));
        assert_eq!(config.results.ongoing, Duration::from_secs(3));
        assert_eq!(config.results.idle, Duration::from_secs(30));
        assert_eq!(config.retries, 2);
    }
}
