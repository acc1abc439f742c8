//! GridFS Image API - upload, serve and delete images stored in MongoDB.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridfs_image_api::{
    config::{load_env_file, CheckConfig, Cli, Command, MongoConfig, ServeConfig},
    server::{create_router, RouterConfig},
    store::{GridFsImageStore, ImageStore},
    StoreError,
};

#[tokio::main]
async fn main() -> ExitCode {
    load_env_file(None);
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    // Missing configuration is fatal before anything connects or binds
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("GridFS Image API v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  GridFS bucket: {}", config.mongo.bucket);
    if let Some(size) = config.mongo.chunk_size {
        info!("  Chunk size: {} bytes", size);
    }
    info!("  Max upload: {} bytes", config.max_upload_bytes);
    if config.auth_enabled {
        info!("  Auth: enabled");
    } else {
        warn!("  Auth: DISABLED - anyone can upload and delete images");
        warn!("        Enable for production: --auth-enabled=true --admin-token=<token>");
    }

    info!("Connecting to MongoDB...");
    let store = match connect_store(&config.mongo).await {
        Ok(store) => {
            info!("  Connected to database '{}'", store.database_name());
            store
        }
        Err(e) => {
            error!("  Failed to connect to MongoDB: {}", e);
            error!("  Please check the connection string and that the server is reachable");
            return ExitCode::FAILURE;
        }
    };

    let router = create_router(store, build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Open the GridFS store and verify the server answers a ping.
async fn connect_store(config: &MongoConfig) -> Result<GridFsImageStore, StoreError> {
    let store = GridFsImageStore::connect(
        config.uri_or_empty(),
        config.mongo_db.as_deref(),
        config.bucket.clone(),
        config.chunk_size,
    )
    .await?;
    store.ping().await?;
    Ok(store)
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "gridfs_image_api=debug,tower_http=debug"
    } else {
        "gridfs_image_api=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = if config.auth_enabled {
        RouterConfig::new(config.admin_token_or_empty())
    } else {
        RouterConfig::without_auth()
    };

    router_config = router_config
        .with_cache_max_age(config.cache_max_age)
        .with_max_upload_bytes(config.max_upload_bytes)
        .with_public_base_url(config.public_base_url.clone())
        .with_trust_proxy(config.trust_proxy)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("GridFS Image API Configuration Check");
    println!("═════════════════════════════════════");
    println!();

    if let Err(e) = config.mongo.validate() {
        println!("✗ Configuration: {}", e);
        return ExitCode::FAILURE;
    }
    println!("✓ Bucket: {}", config.mongo.bucket);
    println!();

    print!("Testing MongoDB connection... ");
    let store = match connect_store(&config.mongo).await {
        Ok(store) => {
            println!("✓ success");
            println!("  Database: {}", store.database_name());
            store
        }
        Err(e) => {
            println!("✗ failed");
            println!();
            println!("Error: {}", e);
            println!();
            println!("Please check:");
            println!("  - The connection string is correct");
            println!("  - The MongoDB server is running and reachable");
            println!("  - The credentials have access to the database");
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref filename) = config.filename {
        println!();
        print!("Looking up '{}'... ", filename);

        match store.find_by_filename(filename).await {
            Ok(Some(file)) => {
                println!("✓ found");
                println!("  Size: {} bytes", file.length);
                println!("  Content-Type: {}", file.content_type);
                println!("  Uploaded: {}", file.uploaded_at.to_rfc3339());
            }
            Ok(None) => {
                println!("✗ not found");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                println!("✗ failed");
                println!("  Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    println!();
    println!("═════════════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
