use clap::Parser;
use log::{error, info};
use server::{GameServer, NetworkServer, ServerConfig};
use shared::world::EnemyKind;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "7777")]
    port: u16,

    /// Maximum number of connected players
    #[arg(short, long, default_value = "4")]
    max_players: usize,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// State broadcasts per second
    #[arg(short, long, default_value = "20")]
    sync_rate: u32,

    /// Ticks between forced full snapshots
    #[arg(long, default_value = "300")]
    full_interval: u64,

    /// Level width in tiles
    #[arg(long, default_value = "40")]
    width: i32,

    /// Level height in tiles
    #[arg(long, default_value = "20")]
    height: i32,

    /// Number of patrolling enemies to spawn
    #[arg(long, default_value = "2")]
    enemies: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_players: args.max_players,
        tick_rate: args.tick_rate,
        sync_rate: args.sync_rate,
        full_snapshot_interval: args.full_interval,
        level_width: args.width,
        level_height: args.height,
    };

    let game = Arc::new(GameServer::new(config.clone()));
    let width = game.level().width();
    for i in 0..args.enemies {
        let x = (8 + i as i32 * 10).min(width - 3) as f32;
        game.spawn_enemy(EnemyKind::Slime, x, 1.0).await;
    }

    let network = NetworkServer::bind(&config.address(), Arc::clone(&game)).await?;
    let loop_handle = game.start()?;
    let network_handle = tokio::spawn(network.run());

    info!(
        "Serving up to {} players at {} Hz",
        config.max_players, config.tick_rate
    );

    tokio::select! {
        result = network_handle => {
            match result {
                Ok(Err(e)) => error!("Network server failed: {}", e),
                Err(e) => error!("Network task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    game.stop().await;
    if let Err(e) = loop_handle.await {
        error!("Game loop task panicked: {}", e);
    }
    Ok(())
}
