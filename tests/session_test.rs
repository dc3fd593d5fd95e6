// End-to-end session tests: two full controller/engine stacks over the
// in-memory fabric, from lobby to winner

use std::net::Ipv4Addr;
use std::time::Duration;
use tetramesh::config::NetConfig;
use tetramesh::protocol::Report;
use tetramesh::session::{SessionController, SessionEngine, SessionError};
use tetramesh::transport::{MemoryEndpoint, MemoryHub};
use tokio::time::{sleep, Instant};

fn addr(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

fn test_config(run_ai: bool) -> NetConfig {
    NetConfig::new()
        .with_socket_time_out(Duration::from_millis(10))
        .with_broadcast_delay(Duration::from_millis(40))
        .with_time_to_expire(Duration::from_secs(3))
        .with_max_games(3)
        .with_run_ai(run_ai)
}

fn spawn_node(
    hub: &MemoryHub,
    config: &NetConfig,
    last: u8,
    name: &str,
    players: u32,
) -> SessionController {
    let endpoint: MemoryEndpoint = hub.endpoint(addr(last), config.socket_time_out);
    let (engine, handle) = SessionEngine::new(endpoint, config.clone(), name);
    tokio::spawn(engine.run());
    SessionController::new(handle, config.clone(), name, players)
}

async fn wait_until<F: FnMut() -> bool>(mut condition: F, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Lobby, election, handshake, replication, and the winner broadcast, all
/// the way through two real nodes. The AI-capable node at .2 must win the
/// election and coordinate; .1 follows.
#[tokio::test]
async fn test_two_nodes_play_a_session_to_the_winner() {
    let hub = MemoryHub::new();
    let config_a = test_config(false);
    let config_b = test_config(true);
    let mut alpha = spawn_node(&hub, &config_a, 1, "alpha", 1);
    let mut beta = spawn_node(&hub, &config_b, 2, "beta", 2);

    alpha.join_lobby();
    beta.join_lobby();
    assert!(
        wait_until(
            || {
                alpha.directory_snapshot().get(addr(2)).is_some()
                    && beta.directory_snapshot().get(addr(1)).is_some()
            },
            Duration::from_secs(2),
        )
        .await,
        "lobby discovery"
    );

    alpha.request_start();
    assert!(
        wait_until(
            || beta.directory_snapshot().any_start(),
            Duration::from_secs(2),
        )
        .await,
        "start announcement should reach the peer"
    );

    let (alpha_started, beta_started) = tokio::join!(alpha.try_start(), beta.try_start());
    assert!(matches!(alpha_started, Ok(true)));
    assert!(matches!(beta_started, Ok(true)));

    assert!(beta.is_coordinator(), "the AI-capable host coordinates");
    assert!(!alpha.is_coordinator());

    // beta holds games 0-1, alpha holds global 2 which displays locally
    // as 0, and max_games leaves the AI range empty.
    let beta_plan = beta.plan().cloned().unwrap();
    assert_eq!(beta_plan.total_games, 3);
    assert_eq!(beta_plan.active_range, vec![0, 1]);
    assert_eq!(beta_plan.remote_range, vec![2]);
    assert!(beta_plan.ai_range.is_empty());

    let alpha_plan = alpha.plan().cloned().unwrap();
    assert_eq!(alpha_plan.active_range, vec![0]);
    assert_eq!(alpha_plan.remote_range, vec![1, 2]);

    // A line clear on beta's first board shows up on alpha shifted past
    // its own block, score intact.
    beta.report_local(
        0,
        Report::Clear {
            lines: 2,
            score: 300,
        },
    );
    assert!(
        wait_until(
            || {
                alpha.tick();
                alpha
                    .view(1)
                    .map(|view| view.score == 300)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await,
        "the clear should replicate to the right display slot"
    );

    // Both of beta's games go down; only alpha's survives, so the
    // coordinator declares global game 2 the winner and broadcasts it.
    beta.report_local(0, Report::Loss);
    beta.report_local(1, Report::Loss);
    assert_eq!(beta.winner(), Some(2));

    assert!(
        wait_until(
            || {
                alpha.tick();
                alpha.winner() == Some(2)
            },
            Duration::from_secs(2),
        )
        .await,
        "the winner broadcast should reach the follower"
    );
}

/// A coordinator whose peer never enters the handshake must give up at
/// the session timeout and land back in discovery.
#[tokio::test]
async fn test_stalled_handshake_times_out_and_resets() {
    let hub = MemoryHub::new();
    let config_a = test_config(false);
    let config_b = test_config(true);
    let alpha = spawn_node(&hub, &config_a, 1, "alpha", 1);
    let mut beta = spawn_node(&hub, &config_b, 2, "beta", 2);

    alpha.join_lobby();
    beta.join_lobby();
    assert!(
        wait_until(
            || beta.directory_snapshot().get(addr(1)).is_some(),
            Duration::from_secs(2),
        )
        .await
    );

    // alpha announces the start but never runs its own join sequence, so
    // its ack never comes.
    alpha.request_start();
    assert!(
        wait_until(
            || beta.directory_snapshot().any_start(),
            Duration::from_secs(2),
        )
        .await
    );

    let outcome = beta.try_start().await;
    assert!(matches!(outcome, Err(SessionError::HandshakeTimedOut)));

    // No session state survives the reset.
    assert!(beta.plan().is_none());
    assert!(beta.winner().is_none());
}
