use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use kiosk_types::models::UserId;

/// Bridge secrets that are never accepted.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "secret",
    "changeme",
    "change-me",
    "dev-secret-change-me",
    "your-secret-here",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub owner: UserId,
    pub bridge_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub session_ttl: Duration,
    pub sweep_secs: u64,
    pub bot_username: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let owner = var("KIOSK_OWNER_ID").context("KIOSK_OWNER_ID must be set")?;
        let owner = UserId(
            owner
                .trim()
                .parse()
                .with_context(|| format!("KIOSK_OWNER_ID is not an integer: {:?}", owner))?,
        );

        let bridge_secret = var("KIOSK_BRIDGE_SECRET").context("KIOSK_BRIDGE_SECRET must be set")?;
        let trimmed = bridge_secret.trim();
        if trimmed.is_empty() || PLACEHOLDER_SECRETS.contains(&trimmed.to_lowercase().as_str()) {
            bail!("KIOSK_BRIDGE_SECRET is empty or a placeholder");
        }

        let db_path = PathBuf::from(var("KIOSK_DB_PATH").unwrap_or_else(|| "kiosk.db".into()));
        let host = var("KIOSK_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("KIOSK_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("KIOSK_PORT is not a valid port")?;

        let ttl_mins: u64 = var("KIOSK_SESSION_TTL_MINS")
            .unwrap_or_else(|| "60".into())
            .parse()
            .context("KIOSK_SESSION_TTL_MINS is not a number")?;
        let sweep_secs: u64 = var("KIOSK_SWEEP_SECS")
            .unwrap_or_else(|| "300".into())
            .parse()
            .context("KIOSK_SWEEP_SECS is not a number")?;
        if ttl_mins == 0 || sweep_secs == 0 {
            bail!("KIOSK_SESSION_TTL_MINS and KIOSK_SWEEP_SECS must be positive");
        }

        let session_ttl = ttl_mins
            .checked_mul(60)
            .map(Duration::from_secs)
            .context("KIOSK_SESSION_TTL_MINS is too large")?;

        let bot_username = var("KIOSK_BOT_USERNAME")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(Self {
            owner,
            bridge_secret: trimmed.to_string(),
            db_path,
            host,
            port,
            session_ttl,
            sweep_secs,
            bot_username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            ("KIOSK_OWNER_ID", "1000"),
            ("KIOSK_BRIDGE_SECRET", "s3cr3t-token"),
        ]))
        .unwrap();
        assert_eq!(config.owner, UserId(1000));
        assert_eq!(config.db_path, PathBuf::from("kiosk.db"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.sweep_secs, 300);
        assert_eq!(config.bot_username, None);
    }

    #[test]
    fn owner_is_required_and_numeric() {
        assert!(Config::from_lookup(lookup(&[("KIOSK_BRIDGE_SECRET", "s3cr3t-token")])).is_err());
        assert!(
            Config::from_lookup(lookup(&[
                ("KIOSK_OWNER_ID", "owner"),
                ("KIOSK_BRIDGE_SECRET", "s3cr3t-token"),
            ]))
            .is_err()
        );
    }

    #[test]
    fn placeholder_secret_rejected() {
        for secret in ["", "  ", "change-me", "ChangeMe", "dev-secret-change-me"] {
            let result = Config::from_lookup(lookup(&[
                ("KIOSK_OWNER_ID", "1"),
                ("KIOSK_BRIDGE_SECRET", secret),
            ]));
            assert!(result.is_err(), "accepted {:?}", secret);
        }
    }

    #[test]
    fn oversized_ttl_rejected() {
        let huge = u64::MAX.to_string();
        let result = Config::from_lookup(lookup(&[
            ("KIOSK_OWNER_ID", "1"),
            ("KIOSK_BRIDGE_SECRET", "s3cr3t-token"),
            ("KIOSK_SESSION_TTL_MINS", huge.as_str()),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn zero_sweep_interval_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("KIOSK_OWNER_ID", "1"),
            ("KIOSK_BRIDGE_SECRET", "s3cr3t-token"),
            ("KIOSK_SWEEP_SECS", "0"),
        ]));
        assert!(result.is_err());
    }
}
