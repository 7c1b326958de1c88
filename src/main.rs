use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use perftrack::{db, error, handlers, routes, session, AppState, Config};

const DEFAULT_CONFIG_PATH: &str = "./etc/perftrack.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "-help" || arg == "--help") {
        println!("Usage: perftrack [OPTIONS]");
        println!("Options:");
        println!("  -config <path>  Path to configuration file (default: {})", DEFAULT_CONFIG_PATH);
        println!("  -help, --help   Print this help message");
        return Ok(());
    }

    let config_path = args
        .iter()
        .skip_while(|arg| arg.as_str() != "-config")
        .nth(1)
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    // Load configuration first (before logging init)
    let mut config = Config::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Could not load config file: {}, using defaults", e);
        let mut config = Config::default();
        config.apply_env();
        config
    });
    let generated_secret = config.ensure_jwt_secret();
    config.validate()?;

    // Priority: RUST_LOG env var > config file > default "info"
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting perftrack server ({})...", config.environment);
    info!("Loading configuration from: {}", config_path);
    if generated_secret {
        warn!(
            "auth.jwt_secret is empty, using a random secret for this process; sessions end on restart"
        );
    }

    error::set_expose_details(!config.is_production());

    let db_conn = db::init_database(&config.database).await.map_err(|e| {
        tracing::error!("Database initialization failed: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    let db_conn = Arc::new(db_conn);

    handlers::activity::service::init(db_conn.clone());
    info!("Activity log service initialized");

    session::spawn_purge_task(db_conn.clone());

    let addr: SocketAddr = config.addr.parse().map_err(|e| {
        anyhow::anyhow!("Invalid listen address '{}': {}", config.addr, e)
    })?;

    let state = AppState::new(db_conn, config);
    let app = routes::create_router(state);

    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
