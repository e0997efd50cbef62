use clap::Parser;
use client::display::render_frame;
use client::{Autopilot, ClientGame, ClientOptions, EmbeddedLink, RemoteLink};
use log::{info, warn};
use server::{GameServer, ServerConfig};
use shared::level::{demo_level_for_viewport, TileMap};
use shared::world::EnemyKind;
use shared::{InputFrame, WorldState};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to; plays single-player in-process when omitted
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Player name sent in the handshake
    #[arg(short = 'n', long, default_value = "player")]
    name: String,

    /// Number of ticks to play before disconnecting
    #[arg(short = 't', long, default_value = "600")]
    ticks: u64,

    /// Local ticks per second
    #[arg(short = 'r', long, default_value = "60")]
    tick_rate: u32,

    /// Reconciliation position tolerance in tiles
    #[arg(long, default_value = "0.01")]
    tolerance: f32,

    /// Seed for the scripted autopilot
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Print a text frame every this many ticks (0 disables)
    #[arg(long, default_value = "0")]
    frame_every: u64,

    #[arg(long)]
    no_prediction: bool,

    #[arg(long)]
    no_reconciliation: bool,

    #[arg(long)]
    no_interpolation: bool,
}

/// Where states come from and inputs go.
enum Link {
    Embedded(EmbeddedLink),
    Remote(RemoteLink),
}

impl Link {
    fn player_id(&self) -> u32 {
        match self {
            Link::Embedded(link) => link.player_id(),
            Link::Remote(link) => link.player_id(),
        }
    }

    fn send_input(&self, frame: InputFrame) -> bool {
        match self {
            Link::Embedded(link) => link.send_input(frame),
            Link::Remote(link) => link.send_input(frame),
        }
    }

    /// Pings a remote server; the embedded link has no round trip to measure.
    fn ping(&self) -> Option<Duration> {
        match self {
            Link::Embedded(_) => None,
            Link::Remote(link) => {
                link.ping();
                link.rtt()
            }
        }
    }

    fn try_recv_state(&mut self) -> Option<Arc<WorldState>> {
        match self {
            Link::Embedded(link) => link.try_recv_state(),
            Link::Remote(link) => link.try_recv_state(),
        }
    }

    async fn disconnect(self) {
        match self {
            Link::Embedded(link) => {
                let server = Arc::clone(link.server());
                link.disconnect().await;
                server.stop().await;
            }
            Link::Remote(link) => link.disconnect().await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let (mut link, level): (Link, Arc<TileMap>) = match &args.server {
        Some(addr) => {
            let link = RemoteLink::connect(addr, &args.name).await?;
            let info = link.level();
            let level = demo_level_for_viewport(info.width as i32, info.height as i32);
            (Link::Remote(link), Arc::new(level))
        }
        None => {
            info!("No server given, starting one in-process");
            let server = Arc::new(GameServer::new(ServerConfig {
                tick_rate: args.tick_rate,
                ..Default::default()
            }));
            server.spawn_enemy(EnemyKind::Slime, 20.0, 1.0).await;
            let link = EmbeddedLink::connect(Arc::clone(&server), &args.name).await?;
            server.start()?;
            let level = link.level();
            (Link::Embedded(link), level)
        }
    };

    let options = ClientOptions {
        prediction: !args.no_prediction,
        reconciliation: !args.no_reconciliation,
        interpolation: !args.no_interpolation,
        tolerance: args.tolerance,
        ..Default::default()
    };
    let player_id = link.player_id();
    let mut game = ClientGame::new(player_id, level.clone(), options);
    let mut autopilot = Autopilot::new(args.seed);

    let mut ticker = interval(Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    for step in 1..=args.ticks {
        ticker.tick().await;

        while let Some(state) = link.try_recv_state() {
            game.apply_server_state(state);
        }

        let frame = game.predict(autopilot.next_intents());
        if !link.send_input(frame) {
            warn!("Lost connection to the server");
            break;
        }
        game.advance_render(1.0);

        if args.frame_every > 0 && step % args.frame_every == 0 {
            for line in render_frame(&level, &game.renderables(), player_id) {
                println!("{}", line);
            }
        }
        if step % 60 == 0 {
            let stats = game.stats();
            info!(
                "Tick {} (server {}): {} states, {} rollbacks, {} replayed ticks",
                game.tick(),
                stats.last_server_tick,
                stats.states_received,
                stats.rollbacks,
                stats.replayed_ticks
            );
            if let Some(rtt) = link.ping() {
                info!("Round trip {:.1} ms", rtt.as_secs_f64() * 1000.0);
            }
        }
    }

    let stats = game.stats();
    println!(
        "Played {} ticks: {} predicted, {} states received, {} rollbacks ({} ticks replayed), {} checksum-only differences",
        args.ticks,
        stats.predicted_ticks,
        stats.states_received,
        stats.rollbacks,
        stats.replayed_ticks,
        stats.checksum_only
    );

    link.disconnect().await;
    Ok(())
}
