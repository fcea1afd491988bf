use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use rusty_hub::auth::JwtSessionResolver;
use rusty_hub::config::ServerConfig;
use rusty_hub::core::hub::spawn_hub;
use rusty_hub::core::rate_limiter::RateLimiter;
use rusty_hub::handlers::{routes, ServerState};

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    }

    // Load config from .env
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, max connections per user={}",
        config.host, config.port, config.hub.max_connections_per_user
    );
    if config.development_mode {
        warn!("Development mode enabled");
    }

    let hub = spawn_hub(config.hub.clone());

    let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
    let _reclaim = Arc::clone(&limiter).start_reclaim_task();

    let state = ServerState {
        hub,
        limiter,
        resolver: Arc::new(JwtSessionResolver::new(&config.jwt_secret)),
        hub_config: config.hub.clone(),
    };

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Rusty Hub server on {}", addr);
    warp::serve(routes(state)).run(addr).await;
}
