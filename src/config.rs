//! Configuration for Atrium
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Atrium - realtime core for the Atrium e-learning platform
#[derive(Parser, Debug, Clone)]
#[command(name = "atrium")]
#[command(about = "Group membership, learning-path progression, and realtime event gateway")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "atrium")]
    pub mongodb_db: String,

    /// Enable development mode (in-memory record store fallback, dev JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// JWT secret for credential verification (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Bound on the WebSocket authentication handshake, in milliseconds
    #[arg(long, env = "AUTH_TIMEOUT_MS", default_value = "10000")]
    pub auth_timeout_ms: u64,

    /// Maximum concurrent gateway connections
    #[arg(long, env = "MAX_CLIENTS", default_value = "16384")]
    pub max_clients: usize,
}

impl Args {
    /// Handshake timeout as a Duration
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.auth_timeout_ms == 0 {
            return Err("AUTH_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.max_clients == 0 {
            return Err("MAX_CLIENTS must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        let mut args = Args::parse_from(["atrium"]);
        args.dev_mode = true;
        args
    }

    #[test]
    fn test_dev_mode_needs_no_secret() {
        let args = base_args();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_production_requires_secret() {
        let args = Args::parse_from(["atrium"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut args = base_args();
        args.auth_timeout_ms = 0;
        assert!(args.validate().is_err());
    }
}
