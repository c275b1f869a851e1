// crates/afu9-server/src/config.rs
// ============================================================================
// Module: Server Configuration
// Description: Environment-driven configuration for the control-plane API.
// Purpose: Parse and validate every deployment knob fail-closed at startup.
// Dependencies: afu9-policy, serde, thiserror
// ============================================================================

//! ## Overview
//! Configuration comes exclusively from environment variables. Parsing is
//! side-effect free (`from_env_map` takes a plain map, so tests never touch
//! the process environment) and fail-closed: a malformed allowlist or bind
//! address refuses to start rather than starting permissive.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::net::SocketAddr;

use thiserror::Error;

use afu9_core::LawbookId;
use afu9_policy::RepoAccessError;
use afu9_policy::RepoAccessPolicy;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised during configuration parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable failed to parse.
    #[error("invalid configuration for {key}: {message}")]
    Invalid {
        /// Environment variable name.
        key: String,
        /// Failure description.
        message: String,
    },
    /// The repo allowlist is malformed.
    #[error(transparent)]
    Allowlist(#[from] RepoAccessError),
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Deployment environments the deploy surface accepts.
pub const KNOWN_ENVS: [&str; 3] = ["dev", "staging", "production"];

/// Parsed server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the API binds.
    pub bind_addr: SocketAddr,
    /// Shared service token for write endpoints; absent means local dev mode.
    pub service_token: Option<String>,
    /// Admin token for admin-only endpoints; absent means local dev mode.
    pub admin_token: Option<String>,
    /// Webhook HMAC secret; absent rejects all webhooks.
    pub webhook_secret: Option<String>,
    /// Enables persistence-backed paths.
    pub database_enabled: bool,
    /// Database file path (`DATABASE_NAME` in this port).
    pub database_path: Option<String>,
    /// Governing rulebook id.
    pub lawbook_id: LawbookId,
    /// Gates the force-new-deployment adapter (deny-by-default).
    pub force_new_deploy_enabled: bool,
    /// Enables the S3 implement dispatch path.
    pub dispatch_enabled: bool,
    /// Verbose structured logging.
    pub debug_mode: bool,
    /// Compiled repo access policy.
    pub repo_access: RepoAccessPolicy,
    /// Forge app identifier, when installation auth is configured.
    pub forge_app_id: Option<String>,
    /// Forge app private key PEM, when installation auth is configured.
    pub forge_app_private_key_pem: Option<String>,
}

impl ServerConfig {
    /// Parses configuration from an environment map.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is malformed.
    pub fn from_env_map(env: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_addr = env
            .get("AFU9_BIND_ADDR")
            .map_or("127.0.0.1:8470", String::as_str)
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::Invalid {
                key: "AFU9_BIND_ADDR".to_string(),
                message: err.to_string(),
            })?;
        let repo_access =
            RepoAccessPolicy::from_env_value(env.get("FORGE_REPO_ALLOWLIST").map(String::as_str))?;
        Ok(Self {
            bind_addr,
            service_token: non_empty(env.get("AFU9_SERVICE_TOKEN")),
            admin_token: non_empty(env.get("AFU9_ADMIN_TOKEN")),
            webhook_secret: non_empty(env.get("AFU9_WEBHOOK_SECRET")),
            database_enabled: flag(env.get("DATABASE_ENABLED")),
            database_path: non_empty(env.get("DATABASE_NAME")),
            lawbook_id: env
                .get("LAWBOOK_ID")
                .filter(|value| !value.is_empty())
                .map_or_else(LawbookId::default_id, |value| LawbookId::new(value.as_str())),
            force_new_deploy_enabled: flag(env.get("FORCE_NEW_DEPLOY_ENABLED")),
            dispatch_enabled: env
                .get("AFU9_DISPATCH_ENABLED")
                .is_none_or(|value| value == "true"),
            debug_mode: flag(env.get("DEBUG_MODE")),
            repo_access,
            forge_app_id: non_empty(env.get("FORGE_APP_ID")),
            forge_app_private_key_pem: non_empty(env.get("FORGE_APP_PRIVATE_KEY_PEM")),
        })
    }

    /// Parses configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is malformed.
    pub fn from_process_env() -> Result<Self, ConfigError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&env)
    }

    /// Returns true when `env` names a known deployment environment.
    #[must_use]
    pub fn is_known_env(env: &str) -> bool {
        KNOWN_ENVS.contains(&env)
    }
}

/// Reads a `"true"`-gated boolean flag (deny-by-default).
fn flag(value: Option<&String>) -> bool {
    value.is_some_and(|value| value == "true")
}

/// Normalizes empty variables to absence.
fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|value| !value.is_empty()).cloned()
}
