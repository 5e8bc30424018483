//! SpinServe Server
//!
//! Serves the session game engine over WebSocket.
//! Seeds a demo restaurant and walks one table through a full cycle on
//! startup so the logs show the engine working end to end.

use std::sync::Arc;
use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use spinserve::{
    EngineConfig, GameEngine, GameStatus, Money, RestaurantGameConfig, Reward, ServerConfig, Slot,
    VERSION,
    engine::{ConfigStore, OrderLine, TableId},
    network::SpinServer,
    wheel::{MenuItemId, MenuSnapshot, RestaurantId},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let server_config = ServerConfig::from_env();
    let engine_config = EngineConfig::from_env();

    info!("SpinServe Server v{}", VERSION);
    info!("After-reward policy: {:?}", engine_config.after_reward);
    info!("Spin retries: {}, lock timeout: {:?}", engine_config.spin_retries, engine_config.lock_timeout);

    let store = Arc::new(ConfigStore::new());
    let engine = Arc::new(GameEngine::new(engine_config, store));

    install_demo_config(&engine).await?;
    demo_session(&engine).await?;

    let server = Arc::new(SpinServer::new(server_config, engine));
    let runner = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
        result = runner => {
            result.context("Server task panicked")??;
            warn!("Server stopped");
        }
    }

    Ok(())
}

fn demo_restaurant() -> RestaurantId {
    RestaurantId::new("rest_001")
}

/// Install the demo wheel: 60% try again, 40% ten percent off.
async fn install_demo_config(engine: &GameEngine) -> anyhow::Result<()> {
    let mut menu = MenuSnapshot::default();
    menu.insert(MenuItemId::new("parotta"));
    menu.insert(MenuItemId::new("biriyani"));

    let config = RestaurantGameConfig {
        unlock_initial: Money::from_major(200),
        unlock_increment: Money::from_major(50),
        slots: vec![
            Slot::empty("Try Again", 60),
            Slot::prize("10% Off", 40, Reward::percentage(10, "10% Off")?),
        ],
    };

    let version = engine
        .configs()
        .set_game_config(demo_restaurant(), config, &menu)
        .await?;
    info!("Demo restaurant {} configured (v{})", demo_restaurant(), version);
    Ok(())
}

/// Walk one table through a cycle.
async fn demo_session(engine: &GameEngine) -> anyhow::Result<()> {
    info!("=== Starting Demo Session ===");

    let snapshot = engine.open_session(demo_restaurant(), TableId::new("T1")).await;
    let id = snapshot.session.id;
    info!("Session ID: {}", id);

    let snapshot = engine
        .add_order_items(id, vec![OrderLine::new(MenuItemId::new("parotta"), "Parotta", 4, Money::from_major(55))])
        .await?;
    info!(
        "Ordered {}, status {}, unlock at {:?}",
        snapshot.session.total_amount, snapshot.session.game_status, snapshot.next_unlock_at
    );

    if snapshot.session.game_status == GameStatus::Unlocked {
        engine.mark_puzzle_solved(id).await?;
        let outcome = engine.request_spin(id).await?;
        match &outcome.reward {
            Some(reward) => info!("Spin landed on '{}': {}", outcome.label, reward.description()),
            None => info!("Spin landed on '{}'", outcome.label),
        }
        info!("Draw {} from seed {:?}", outcome.record.draw, outcome.record.seed);
    }

    let snapshot = engine.refresh_bill(id).await?;
    info!("After refresh: {} (spin count {})", snapshot.session.game_status, snapshot.session.spin_count);

    let bill = engine.close_session(id).await?;
    info!(
        "Bill: subtotal {}, discount {}, payable {}",
        bill.subtotal, bill.discount_total, bill.total_payable
    );

    let report = engine.audit_session(id).await?;
    if report.is_valid() {
        info!("Ledger verified: {} spins replayed", report.replayed);
    } else {
        warn!("Ledger verification failed: {:?}", report.errors);
    }

    Ok(())
}
