//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

pub const DEFAULT_DATABASE_URL: &str = "sqlite://nbapex.db";

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            // Fallback to the project root when run from elsewhere.
            let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Common bootstrap for the CLI: load env once and log where data will be written.
pub fn bootstrap_cli(bin_name: &str) {
    init_env();
    match env_opt("DATABASE_URL").or_else(|| env_opt("DB_URL")) {
        Some(url) => info!(
            target = "bootstrap",
            bin = bin_name,
            database = %redact_value("DATABASE_URL", &url),
            "database configured"
        ),
        None => warn!(
            target = "bootstrap",
            bin = bin_name,
            "DATABASE_URL not set; using {DEFAULT_DATABASE_URL}"
        ),
    }
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!(target = "env", key, value = %raw, "invalid value; using default");
            default
        }),
        Err(_) => default,
    }
}

/// Database URL: DATABASE_URL, then DB_URL, then the local SQLite file.
pub fn db_url() -> String {
    init_env();
    env_opt("DATABASE_URL")
        .or_else(|| env_opt("DB_URL"))
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD") || k.contains("SECRET") || k.contains("TOKEN") {
        return "***".to_string();
    }
    let val_trim = val.trim();
    if let Ok(mut u) = url::Url::parse(val_trim) {
        if u.password().is_some() {
            let _ = u.set_password(Some("***"));
            return u.to_string();
        }
    }
    val_trim.to_string()
}
