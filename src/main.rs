// tetramesh node - headless protocol runner
//
// Joins the lobby, optionally announces a start, and logs the session as
// it replicates. Exists to exercise the protocol end to end on a real
// network segment; rendering and gameplay live elsewhere.

use clap::Parser;
use std::net::Ipv4Addr;
use std::time::Duration;
use tetramesh::config::NetConfig;
use tetramesh::session::{SessionController, SessionEngine};
use tetramesh::transport::MulticastEndpoint;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tetramesh", about = "LAN session sync node")]
struct Args {
    /// Multicast group address
    #[arg(long, default_value = "224.3.29.71")]
    group: Ipv4Addr,

    /// Shared UDP port
    #[arg(long, default_value_t = 10_420)]
    port: u16,

    /// Advertised hostname
    #[arg(long)]
    name: Option<String>,

    /// Number of local players
    #[arg(long, default_value_t = 1)]
    players: u32,

    /// Total game IDs available for one session
    #[arg(long, default_value_t = 8)]
    max_games: u32,

    /// Host computer-controlled games when coordinating
    #[arg(long, default_value_t = false)]
    ai: bool,

    /// Announce a session start after this many seconds in the lobby
    #[arg(long)]
    start_after: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let hostname = args
        .name
        .clone()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "tetramesh".to_string());

    let config = NetConfig::new()
        .with_group_addr(args.group)
        .with_port(args.port)
        .with_max_games(args.max_games)
        .with_run_ai(args.ai);
    if let Err(err) = config.validate() {
        error!(%err, "bad configuration");
        std::process::exit(1);
    }

    let endpoint = match MulticastEndpoint::new(&config) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            error!(%err, "could not open multicast endpoint");
            std::process::exit(1);
        }
    };

    let (engine, handle) = SessionEngine::new(endpoint, config.clone(), &hostname);
    let engine_task = tokio::spawn(engine.run());

    let mut controller = SessionController::new(handle, config.clone(), &hostname, args.players);
    controller.join_lobby();
    info!(%hostname, "in the lobby");

    let lobby_entered = tokio::time::Instant::now();
    let mut start_requested = false;
    loop {
        tokio::time::sleep(config.broadcast_delay).await;

        if let Some(after) = args.start_after {
            if !start_requested && lobby_entered.elapsed() >= Duration::from_secs(after) {
                info!("announcing session start");
                controller.request_start();
                start_requested = true;
            }
        }

        match controller.try_start().await {
            Ok(false) => continue,
            Ok(true) => break,
            Err(err) => {
                error!(%err, "session start failed, back to the lobby");
                controller.join_lobby();
                start_requested = false;
            }
        }
    }

    let plan = controller.plan().cloned();
    if let Some(plan) = plan {
        info!(
            total = plan.total_games,
            local = plan.active_range.len(),
            remote = plan.remote_range.len(),
            ai = plan.ai_range.len(),
            "session active"
        );
    }

    // Mirror the session until someone wins.
    while controller.winner().is_none() {
        tokio::time::sleep(config.socket_time_out).await;
        for game_id in controller.tick() {
            if let Some(view) = controller.view(game_id) {
                info!(game_id, score = view.score, lost = view.lost, "update");
            }
        }
    }
    info!(winner = ?controller.winner(), "session over");

    controller.leave();
    drop(controller);
    let _ = engine_task.await;
}
