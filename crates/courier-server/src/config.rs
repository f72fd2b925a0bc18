use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "replace-with-a-long-random-string",
    "dev-secret-change-me",
];

/// Ten years.
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl_hours: i64,
    pub asset_dir: PathBuf,
    pub public_url: String,
    /// When set, profile pictures go to this remote host instead of disk.
    pub asset_upload_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = var("COURIER_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("COURIER_JWT_SECRET is unset or still a placeholder");
        }

        let port: u16 = var("COURIER_PORT")
            .unwrap_or_else(|| "8080".into())
            .parse()
            .context("COURIER_PORT must be a port number")?;

        let token_ttl_hours: i64 = match var("COURIER_TOKEN_TTL_HOURS") {
            Some(raw) => raw
                .parse()
                .context("COURIER_TOKEN_TTL_HOURS must be a whole number of hours")?,
            None => 24,
        };
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&token_ttl_hours) {
            bail!("COURIER_TOKEN_TTL_HOURS must be between 1 and {}", MAX_TOKEN_TTL_HOURS);
        }

        Ok(Self {
            jwt_secret,
            db_path: var("COURIER_DB_PATH")
                .unwrap_or_else(|| "courier.db".into())
                .into(),
            host: var("COURIER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            token_ttl_hours,
            asset_dir: var("COURIER_ASSET_DIR")
                .unwrap_or_else(|| "./assets".into())
                .into(),
            public_url: var("COURIER_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
            asset_upload_url: var("COURIER_ASSET_UPLOAD_URL").filter(|url| !url.is_empty()),
        })
    }
}
