use std::fmt;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";
pub const DEFAULT_SOURCE_NAME: &str = "default";
pub const DEFAULT_DB_SCHEMA: &str = "public";
pub const DEFAULT_UNAUTHORIZED_ROLE: &str = "public";

/// Process configuration, read from the environment once at startup and
/// passed by reference into every component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the Hasura instance, without a trailing path.
    pub endpoint: String,
    pub admin_secret: String,
    /// Name of the Hasura metadata source the tables live under.
    pub source: String,
    /// Database schema to inspect.
    pub db_schema: String,
    /// Role granted the default read permission.
    pub unauthorized_role: String,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingAdminSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingAdminSecret => {
                write!(f, "please set the HASURA_GRAPHQL_ADMIN_SECRET variable")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let admin_secret = match std::env::var("HASURA_GRAPHQL_ADMIN_SECRET") {
            Ok(s) if !s.is_empty() => s,
            _ => return Err(ConfigError::MissingAdminSecret),
        };

        Ok(Self {
            endpoint: std::env::var("HASURA_GRAPHQL_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            admin_secret,
            source: std::env::var("HASURA_GRAPHQL_SOURCE_NAME")
                .unwrap_or_else(|_| DEFAULT_SOURCE_NAME.to_string()),
            db_schema: std::env::var("HASURA_GRAPHQL_DB_SCHEMA")
                .unwrap_or_else(|_| DEFAULT_DB_SCHEMA.to_string()),
            unauthorized_role: std::env::var("HASURA_GRAPHQL_UNAUTHORIZED_ROLE")
                .unwrap_or_else(|_| DEFAULT_UNAUTHORIZED_ROLE.to_string()),
        })
    }
}
