use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const SESSION_FILE_NAME: &str = "session.json";

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend origin without the `/api/v1` suffix.
    pub backend_url: String,
    /// Where the token pair is persisted between invocations.
    pub session_file: PathBuf,
    pub timeout: Duration,
}

impl Config {
    pub fn load() -> Self {
        let backend_url = env_or("SCRUTIN_BACKEND_URL", DEFAULT_BACKEND_URL);
        let timeout_secs = match env::var("SCRUTIN_TIMEOUT_SECS") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("SCRUTIN_TIMEOUT_SECS is not a number, using {DEFAULT_TIMEOUT_SECS}");
                DEFAULT_TIMEOUT_SECS
            }),
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };
        Config {
            backend_url,
            session_file: session_file_path(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Base for every request, mirroring how the backend mounts its routes.
    /// Trailing slashes on the configured origin are dropped before the
    /// `/api/v1` prefix is appended.
    pub fn api_base(&self) -> String {
        format!("{}/api/v1", self.backend_url.trim_end_matches('/'))
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => fallback.to_string(),
    }
}

fn session_file_path() -> PathBuf {
    if let Ok(path) = env::var("SCRUTIN_SESSION_FILE") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    match env::var("HOME") {
        Ok(home) if !home.trim().is_empty() => {
            PathBuf::from(home).join(".scrutin").join(SESSION_FILE_NAME)
        }
        _ => PathBuf::from(".scrutin-session.json"),
    }
}
