//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Room joined when `ROOM_NAME` is unset
pub const DEFAULT_ROOM_NAME: &str = "my-chat-room";

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection URL (PostgreSQL)
    pub database_url: String,

    /// Room topic to join
    pub room_name: String,

    /// Profile of the local participant; both absent means a guest session
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl std::fmt::Debug for Config {
    #[mutants::skip] // Formatting only; covered by the redaction test
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("room_name", &self.room_name)
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?,

            room_name: env::var("ROOM_NAME")
                .ok()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ROOM_NAME.to_string()),

            display_name: non_empty_var("CHAT_DISPLAY_NAME"),
            email: non_empty_var("CHAT_EMAIL"),
        };

        Ok(config)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
