//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::{DEFAULT_ACCESS_TTL_MS, DEFAULT_REFRESH_TTL_MS, TokenLifetimes};
use clap::Parser;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;
/// Claims carry whole seconds, so shorter lifetimes can expire at issuance.
const MIN_TTL_MS: i64 = 1000;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokengate",
    about = "Bearer-token authentication with rotating refresh tokens"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file (":memory:" for a throwaway database)
    #[arg(short, long, default_value = "tokengate.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in milliseconds
    #[arg(long, env = "ACCESS_TOKEN_TTL_MS", default_value_t = DEFAULT_ACCESS_TTL_MS)]
    pub access_ttl_ms: i64,

    /// Refresh token lifetime in milliseconds
    #[arg(long, env = "REFRESH_TOKEN_TTL_MS", default_value_t = DEFAULT_REFRESH_TTL_MS)]
    pub refresh_ttl_ms: i64,

    /// Create a user on startup. The password is read from CREATE_USER_PASSWORD
    #[arg(long, value_name = "NAME")]
    pub create_user: Option<String>,

    /// Comma-separated roles for --create-user
    #[arg(long, value_delimiter = ',', requires = "create_user")]
    pub roles: Vec<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // SAFETY: still single-threaded during startup and nothing else reads this variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if !is_secret_long_enough(&secret) {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

fn is_secret_long_enough(secret: &str) -> bool {
    secret.len() >= MIN_JWT_SECRET_LENGTH
}

/// Check that both lifetimes are at least one second.
/// Returns None and logs an error if validation fails.
pub fn validate_ttls(access_ttl_ms: i64, refresh_ttl_ms: i64) -> Option<TokenLifetimes> {
    if access_ttl_ms < MIN_TTL_MS {
        error!(
            value = access_ttl_ms,
            "Access token TTL must be at least {} ms", MIN_TTL_MS
        );
        return None;
    }
    if refresh_ttl_ms < MIN_TTL_MS {
        error!(
            value = refresh_ttl_ms,
            "Refresh token TTL must be at least {} ms", MIN_TTL_MS
        );
        return None;
    }

    Some(TokenLifetimes {
        access_ttl_ms,
        refresh_ttl_ms,
    })
}

/// Handle the --create-user flag. Exits the process if the user cannot be created.
pub async fn handle_create_user(db: &Database, username: &str, roles: &[String]) {
    let password = match std::env::var("CREATE_USER_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => {
            error!("CREATE_USER_PASSWORD must be set when using --create-user");
            std::process::exit(1);
        }
    };
    // SAFETY: still single-threaded during startup and nothing else reads this variable.
    unsafe { std::env::remove_var("CREATE_USER_PASSWORD") };

    let roles: Vec<String> = roles
        .iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    match db.users().get_by_username(username).await {
        Ok(Some(_)) => {
            info!(username = %username, "User already exists");
        }
        Ok(None) => match db.users().create(username, &password, &roles).await {
            Ok(_) => {
                info!(username = %username, roles = ?roles, "User created");
            }
            Err(e) => {
                error!(error = %e, "Failed to create user");
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!(error = %e, "Failed to check for existing user");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(db: Database, jwt_secret: String, lifetimes: TokenLifetimes) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        lifetimes,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
