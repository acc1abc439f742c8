//! Configuration management for the image API.
//!
//! Settings come from command-line arguments (clap) or environment variables:
//!
//! - `HOST` - Server bind address (default: 0.0.0.0)
//! - `PORT` - Server port (default: 3000)
//! - `MONGO_URI` - MongoDB connection string (required)
//! - `MONGO_DB` - Database name (default: from the URI, else `images`)
//! - `GRIDFS_BUCKET` - GridFS bucket name (default: uploads)
//! - `GRIDFS_CHUNK_SIZE` - GridFS chunk size in bytes (default: driver default)
//! - `ADMIN_TOKEN` - Bearer token for upload and delete (required with auth)
//! - `AUTH_ENABLED` - Require the admin token (default: true)
//! - `PUBLIC_BASE_URL` - Base URL used in upload responses
//! - `MAX_UPLOAD_BYTES` - Maximum request body size (default: 25 MiB)
//! - `CACHE_MAX_AGE` - HTTP cache max-age seconds for images (default: 1 year)
//! - `CORS_ORIGINS` - Comma-separated allowed origins (default: any)
//! - `TRUST_PROXY` - Honor `X-Forwarded-Proto` in upload links (default: false)
//!
//! Variables may also be placed in a `.env` file in the working directory or
//! one of its parents (see [`load_env_file`]). Variables already set in the
//! process environment take precedence over the file.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::server::{DEFAULT_CACHE_MAX_AGE, DEFAULT_MAX_UPLOAD_BYTES};
use crate::store::DEFAULT_BUCKET;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Smallest accepted GridFS chunk size.
pub const MIN_CHUNK_SIZE: u32 = 1024;

/// Largest accepted GridFS chunk size (chunks must fit in a 16 MB document).
pub const MAX_CHUNK_SIZE: u32 = 15 * 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// GridFS Image API - upload, serve and delete images stored in MongoDB.
#[derive(Parser, Debug, Clone)]
#[command(name = "gridfs-image-api")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Server options, used when no subcommand is given
    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    /// Resolve the command to run, defaulting to `serve`.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve(ServeConfig),

    /// Check MongoDB connectivity and optionally look up a stored file
    Check(CheckConfig),
}

/// MongoDB / GridFS connection settings shared by all commands.
#[derive(Args, Debug, Clone)]
pub struct MongoConfig {
    /// MongoDB connection string.
    #[arg(long, env = "MONGO_URI")]
    pub mongo_uri: Option<String>,

    /// Database name. Defaults to the database in the connection string.
    #[arg(long, env = "MONGO_DB")]
    pub mongo_db: Option<String>,

    /// GridFS bucket holding the images.
    #[arg(long, default_value = DEFAULT_BUCKET, env = "GRIDFS_BUCKET")]
    pub bucket: String,

    /// GridFS chunk size in bytes.
    #[arg(long, env = "GRIDFS_CHUNK_SIZE")]
    pub chunk_size: Option<u32>,
}

impl MongoConfig {
    /// Validate the connection settings.
    pub fn validate(&self) -> Result<(), String> {
        match self.mongo_uri.as_deref() {
            None | Some("") => {
                return Err("MongoDB URI is required. Set --mongo-uri or MONGO_URI".to_string())
            }
            Some(_) => {}
        }

        if self.bucket.is_empty() {
            return Err("GridFS bucket name must not be empty".to_string());
        }

        if let Some(size) = self.chunk_size {
            if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&size) {
                return Err(format!(
                    "chunk_size must be between {} and {} bytes",
                    MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
                ));
            }
        }

        Ok(())
    }

    /// The connection string (empty if unset; call validate() first).
    pub fn uri_or_empty(&self) -> &str {
        self.mongo_uri.as_deref().unwrap_or("")
    }
}

/// Configuration for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    /// Base URL used to build links in upload responses (e.g. https://img.example.com).
    ///
    /// If not specified, links use the request's scheme and Host header.
    #[arg(long, env = "PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Trust `X-Forwarded-Proto` from a reverse proxy when building links.
    #[arg(long, default_value_t = false, env = "TRUST_PROXY")]
    pub trust_proxy: bool,

    /// Maximum request body size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    /// HTTP Cache-Control max-age in seconds for served images.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    #[command(flatten)]
    pub mongo: MongoConfig,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Bearer token required for upload and delete.
    #[arg(long, env = "ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    /// Require the admin token on upload and delete.
    ///
    /// WARNING: Only disable authentication in development/testing.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "AUTH_ENABLED")]
    pub auth_enabled: bool,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.mongo.validate()?;

        let has_token = self
            .admin_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false);
        if self.auth_enabled && !has_token {
            return Err(
                "Authentication is enabled but no admin token provided. \
                 Set --admin-token or ADMIN_TOKEN, or disable auth with --auth-enabled=false"
                    .to_string(),
            );
        }

        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }

        if let Some(ref base_url) = self.public_base_url {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err("public_base_url must start with http:// or https://".to_string());
            }
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the admin token, or an empty string if unset (call validate() first).
    pub fn admin_token_or_empty(&self) -> &str {
        self.admin_token.as_deref().unwrap_or("")
    }
}

/// Configuration for the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub mongo: MongoConfig,

    /// Look up a stored file by filename.
    #[arg(long)]
    pub filename: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Load variables from a `.env` file before the CLI is parsed.
///
/// With no `path`, `.env` is searched for in the working directory and its
/// parents. A missing file is not an error. Returns the file that was loaded.
pub fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => dotenvy::from_path(path).ok().map(|_| path.to_path_buf()),
        None => dotenvy::dotenv().ok(),
    }
}

// =============================================================================
// Tests
// =============================================================================
