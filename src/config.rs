use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::application::todo_controller::ControllerConfig;
use crate::domain::repository::DeletePolicy;
use crate::infrastructure::store_repo::TASKS_COLLECTION;

/// `DATABASE_URL` value that selects the in-memory store.
pub const MEMORY_STORE: &str = "memory";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub collection: String,
    pub share_stop_timeout: Duration,
    pub delete_policy: DeletePolicy,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://tasks.db".to_string());
        let collection = lookup("TASKS_COLLECTION").unwrap_or_else(|| TASKS_COLLECTION.to_string());
        if collection.trim().is_empty() {
            return Err(invalid("TASKS_COLLECTION", collection, "must not be empty"));
        }

        let share_stop_timeout = match lookup("SHARE_STOP_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| invalid("SHARE_STOP_TIMEOUT_MS", raw, e))?,
            None => ControllerConfig::default().share_stop_timeout,
        };

        let delete_policy = match lookup("DELETE_POLICY").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("permissive") => DeletePolicy::Permissive,
            Some("strict") => DeletePolicy::Strict,
            Some(other) => return Err(invalid("DELETE_POLICY", other.to_string(), "expected `permissive` or `strict`")),
        };

        let raw_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let bind_addr = raw_addr.parse::<SocketAddr>().map_err(|e| invalid("BIND_ADDR", raw_addr.clone(), e))?;

        Ok(Self { database_url, collection, share_stop_timeout, delete_policy, bind_addr })
    }

    pub fn uses_memory_store(&self) -> bool { self.database_url == MEMORY_STORE }

    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig { share_stop_timeout: self.share_stop_timeout }
    }
}

fn invalid(key: &'static str, value: String, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid { key, value, reason: reason.to_string() }
}
