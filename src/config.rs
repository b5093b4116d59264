use std::{env, fmt::Display, str::FromStr};

use log::{info, warn};

use crate::listview::DEFAULT_PAGE_SIZE;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1/";

/// Console settings, read once from the environment at start-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub api_url: String,
    pub page_size: usize,
}

impl Config {
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut api_url: String = try_load(&lookup, "DEKANAT_API_URL", DEFAULT_API_URL.to_string());
        if !api_url.ends_with('/') {
            api_url.push('/');
        }

        Self {
            bind: try_load(&lookup, "DEKANAT_BIND", "127.0.0.1".to_string()),
            port: try_load(&lookup, "DEKANAT_PORT", 3000),
            api_url,
            page_size: try_load(&lookup, "DEKANAT_PAGE_SIZE", DEFAULT_PAGE_SIZE).max(1),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        None => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}
