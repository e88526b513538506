//! Lendforge Liquidation Bot
//!
//! Watches a collateralized lending protocol for under-collateralized
//! positions and liquidates them when it pays.
//! Features:
//! - Index candidates re-verified against chain state every cycle
//! - Gated execution (health factor, profit, gas, balance) with one writer
//! - Oracle deviation checks against an independent price reference
//! - HTTP status surface

mod http;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lendforge_api::{CoinGeckoClient, SubgraphClient};
use lendforge_chain::{ChainClient, ContractAddresses, TransactionSender, Url};
use lendforge_core::{AssetRegistry, BotConfig, Deployment, EngineContext};

use crate::http::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // Refuse to start on any configuration error
    let bot_config = BotConfig::from_env().context("invalid bot configuration")?;
    bot_config.log_config();
    let deployment = Deployment::from_env().context("invalid deployment configuration")?;

    info!(
        chain_id = deployment.chain_id,
        lending_pool = %deployment.lending_pool,
        "Starting Lendforge Liquidation Bot"
    );

    let engine = Arc::new(initialize_engine(bot_config, &deployment).await?);
    let scheduler = Arc::new(engine.build_scheduler());
    scheduler.start();

    // Status surface
    let state = AppState {
        engine: engine.clone(),
        scheduler: scheduler.clone(),
    };
    let app = axum::Router::new()
        .route("/health", axum::routing::get(http::health_handler))
        .route("/status", axum::routing::get(http::status_handler))
        .route("/metrics", axum::routing::get(http::metrics_handler))
        .route("/monitor", axum::routing::post(http::monitor_handler))
        .route("/risky-positions", axum::routing::get(http::risky_positions_handler))
        .route("/positions/:user", axum::routing::get(http::position_handler))
        .route("/liquidations", axum::routing::get(http::liquidations_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", deployment.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", deployment.http_port))?;
    info!(port = deployment.http_port, "Status server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        })
        .await
        .context("status server failed")?;

    scheduler.shutdown().await;
    info!("Goodbye");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lendforge_core=debug,lendforge_chain=debug"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

async fn initialize_engine(config: BotConfig, deployment: &Deployment) -> Result<EngineContext> {
    info!("Initializing components...");

    let rpc_url: Url = deployment.rpc_url.parse().context("invalid RPC_URL")?;

    // Transaction sender
    let sender = TransactionSender::new(&deployment.private_key, rpc_url.clone(), deployment.chain_id)
        .await
        .context("failed to initialize transaction sender")?
        .with_gas_limit(config.execution.gas_limit)
        .with_receipt_timeout(config.execution.receipt_timeout());
    if sender.address() != deployment.liquidator_wallet {
        warn!(
            signer = %sender.address(),
            configured = %deployment.liquidator_wallet,
            "Signer address differs from LIQUIDATOR_WALLET; balance checks use the signer"
        );
    }

    // Chain client
    let contracts = ContractAddresses {
        lending_pool: deployment.lending_pool,
        collateral_manager: deployment.collateral_manager,
        oracle_aggregator: deployment.oracle_aggregator,
    };
    let chain = ChainClient::connect(rpc_url, deployment.chain_id, contracts, sender)
        .await
        .context("failed to connect to chain")?;

    // Off-chain clients
    let index = SubgraphClient::new(deployment.subgraph_url.clone())
        .context("failed to build subgraph client")?;
    let prices = CoinGeckoClient::new(
        deployment.coingecko_api_key.clone(),
        config.price_check.reference_timeout(),
    )
    .context("failed to build price reference client")?;
    info!(subgraph = index.url(), "API clients initialized");

    // Asset registry
    let registry = AssetRegistry::new(deployment.usdc_token, deployment.dai_token);
    info!(asset_count = registry.len(), "Asset registry loaded");

    let engine = EngineContext::new(
        config,
        registry,
        Arc::new(index),
        Arc::new(chain),
        Arc::new(prices),
    );
    info!("All components initialized");
    Ok(engine)
}
