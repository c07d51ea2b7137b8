//! Configuration for Parlor
//!
//! CLI arguments with environment variable fallbacks using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;

use crate::auth::jwt::DEFAULT_EXPIRY_SECONDS;
use crate::db::DEFAULT_LIST_LIMIT;

/// Where conversations and users live
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

/// Parlor - conversation practice with an LLM partner
#[derive(Parser, Debug, Clone)]
#[command(name = "parlor")]
#[command(about = "Scenario role-play conversations with saved history and feedback reports")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Development mode: default JWT secret, memory store if MongoDB is down
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    #[arg(long, env = "STORE_BACKEND", value_enum, default_value = "mongo")]
    pub store_backend: StoreBackend,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "parlor")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value_t = DEFAULT_EXPIRY_SECONDS)]
    pub jwt_expiry_seconds: u64,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "LLM_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
    pub llm_base_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = "google/gemini-2.0-flash-exp:free")]
    pub llm_model: String,

    #[arg(long, env = "LLM_API_KEY")]
    pub llm_api_key: Option<String>,

    /// Sampling temperature (0.0-2.0)
    #[arg(long, env = "LLM_TEMPERATURE", default_value = "0.7")]
    pub llm_temperature: f32,

    /// Default page size for conversation history
    #[arg(long, env = "CONVERSATION_LIST_LIMIT", default_value_t = DEFAULT_LIST_LIMIT)]
    pub conversation_list_limit: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        match self.jwt_secret.as_deref() {
            None if !self.dev_mode => {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            Some(secret) if secret.len() < 32 => {
                return Err("JWT_SECRET must be at least 32 characters".to_string());
            }
            _ => {}
        }

        if !(0.0..=2.0).contains(&self.llm_temperature) {
            return Err("LLM_TEMPERATURE must be between 0.0 and 2.0".to_string());
        }

        if self.conversation_list_limit == 0 {
            return Err("CONVERSATION_LIST_LIMIT must be at least 1".to_string());
        }

        Ok(())
    }
}
