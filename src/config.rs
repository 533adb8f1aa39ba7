use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,
    /// Maximum database connections in pool
    pub database_max_connections: u32,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Secret used to sign access and refresh tokens
    pub jwt_secret: String,
    /// Access token lifetime in minutes (default: 120)
    pub access_token_ttl_minutes: i64,
    /// Refresh token lifetime in days (default: 7)
    pub refresh_token_ttl_days: i64,
    /// OAuth client id accepted as audience for Google sign-in tokens
    pub google_client_id: Option<String>,
    /// Health check result cache TTL in seconds (default: 15)
    pub health_cache_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| ConfigError::MissingEnvVar("JWT_SECRET"))?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET (must be at least 32 bytes)",
            ));
        }

        let access_token_ttl_minutes = env::var("ACCESS_TOKEN_TTL_MINUTES")
            .unwrap_or_else(|_| "120".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("ACCESS_TOKEN_TTL_MINUTES"))?;

        let refresh_token_ttl_days = env::var("REFRESH_TOKEN_TTL_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("REFRESH_TOKEN_TTL_DAYS"))?;

        let google_client_id = env::var("GOOGLE_CLIENT_ID").ok().filter(|s| !s.is_empty());

        let health_cache_ttl_secs = env::var("HEALTH_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("HEALTH_CACHE_TTL_SECS"))?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            jwt_secret,
            access_token_ttl_minutes,
            refresh_token_ttl_days,
            google_client_id,
            health_cache_ttl_secs,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
