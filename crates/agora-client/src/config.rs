//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the demo binary starts with zero
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use agora_shared::constants::{DEFAULT_REMOTE_TIMEOUT_SECS, MAX_UPLOAD_SIZE};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory holding the local database and object storage.
    /// Env: `AGORA_DATA_DIR`
    /// Default: the platform data directory, else `./agora-data`.
    pub data_dir: PathBuf,

    /// Base of the public object URLs.
    /// Env: `AGORA_PUBLIC_URL`
    /// Default: `http://localhost:54321`
    pub public_base_url: String,

    /// Upper bound on every remote call.
    /// Env: `AGORA_REMOTE_TIMEOUT_SECS`
    /// Default: 15 seconds.
    pub remote_timeout: Duration,

    /// Largest accepted upload in bytes.
    /// Env: `AGORA_MAX_UPLOAD_BYTES`
    /// Default: 50 MiB.
    pub max_upload_size: usize,

    /// Remove the stored object again when its record cannot be created.
    /// Env: `AGORA_COMPENSATE_ORPHANS` (true/false)
    /// Default: `false`
    pub compensate_orphans: bool,

    /// Account the demo binary signs in with.
    /// Env: `AGORA_USER_EMAIL`
    /// Default: none (browse signed out).
    pub user_email: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: agora_store::default_data_dir()
                .unwrap_or_else(|_| PathBuf::from("./agora-data")),
            public_base_url: "http://localhost:54321".to_string(),
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
            max_upload_size: MAX_UPLOAD_SIZE,
            compensate_orphans: false,
            user_email: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("AGORA_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        if let Some(url) = lookup("AGORA_PUBLIC_URL") {
            let url = url.trim().trim_end_matches('/');
            if url.starts_with("http://") || url.starts_with("https://") {
                config.public_base_url = url.to_string();
            } else {
                tracing::warn!(value = %url, "Invalid AGORA_PUBLIC_URL, using default");
            }
        }

        if let Some(val) = lookup("AGORA_REMOTE_TIMEOUT_SECS") {
            match val.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.remote_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %val,
                    "Invalid AGORA_REMOTE_TIMEOUT_SECS, using default"
                ),
            }
        }

        if let Some(val) = lookup("AGORA_MAX_UPLOAD_BYTES") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_size = n,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid AGORA_MAX_UPLOAD_BYTES, using default"
                ),
            }
        }

        if let Some(val) = lookup("AGORA_COMPENSATE_ORPHANS") {
            config.compensate_orphans = val == "true" || val == "1";
        }

        if let Some(email) = lookup("AGORA_USER_EMAIL") {
            let email = email.trim();
            if !email.is_empty() {
                config.user_email = Some(email.to_string());
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }
}
