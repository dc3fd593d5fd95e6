// Discovery integration tests over the in-memory fabric

use std::net::Ipv4Addr;
use std::time::Duration;
use tetramesh::config::NetConfig;
use tetramesh::directory::{HostFields, HostStatus};
use tetramesh::protocol::Message;
use tetramesh::session::{Command, SessionEngine, SessionHandle, SessionMode};
use tetramesh::transport::{Endpoint, MemoryEndpoint, MemoryHub};
use tokio::time::{sleep, Instant};

fn addr(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

fn test_config() -> NetConfig {
    NetConfig::new()
        .with_socket_time_out(Duration::from_millis(10))
        .with_broadcast_delay(Duration::from_millis(40))
        .with_time_to_expire(Duration::from_millis(250))
        .with_max_games(6)
}

fn fields(hostname: &str, status: HostStatus) -> HostFields {
    HostFields {
        status,
        hostname: hostname.to_string(),
        player_count: 1,
        max_capacity: 4,
        ai_capable: false,
    }
}

fn spawn_engine(hub: &MemoryHub, config: &NetConfig, last: u8, name: &str) -> SessionHandle {
    let endpoint: MemoryEndpoint = hub.endpoint(addr(last), config.socket_time_out);
    let (engine, handle) = SessionEngine::new(endpoint, config.clone(), name);
    tokio::spawn(engine.run());
    handle
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

#[tokio::test]
async fn test_hosts_discover_each_other() {
    let hub = MemoryHub::new();
    let config = test_config();
    let alpha = spawn_engine(&hub, &config, 1, "alpha");
    let beta = spawn_engine(&hub, &config, 2, "beta");

    alpha.command(Command::SetLocalFields(fields("alpha", HostStatus::Lobby)));
    alpha.command(Command::SetMode(SessionMode::Discover));
    beta.command(Command::SetLocalFields(fields("beta", HostStatus::Lobby)));
    beta.command(Command::SetMode(SessionMode::Discover));

    let found = wait_until(
        || {
            let a_sees_b = alpha
                .directory_snapshot()
                .get(addr(2))
                .map(|record| record.hostname() == "beta")
                .unwrap_or(false);
            let b_sees_a = beta
                .directory_snapshot()
                .get(addr(1))
                .map(|record| record.hostname() == "alpha")
                .unwrap_or(false);
            a_sees_b && b_sees_a
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(found, "both hosts should appear in each other's directory");
}

#[tokio::test]
async fn test_status_change_propagates() {
    let hub = MemoryHub::new();
    let config = test_config();
    let alpha = spawn_engine(&hub, &config, 1, "alpha");
    let beta = spawn_engine(&hub, &config, 2, "beta");

    alpha.command(Command::SetLocalFields(fields("alpha", HostStatus::Lobby)));
    alpha.command(Command::SetMode(SessionMode::Discover));
    beta.command(Command::SetLocalFields(fields("beta", HostStatus::Lobby)));
    beta.command(Command::SetMode(SessionMode::Discover));

    assert!(
        wait_until(
            || alpha.directory_snapshot().get(addr(2)).is_some(),
            Duration::from_secs(2)
        )
        .await
    );
    assert!(!alpha.directory_snapshot().any_start());

    beta.command(Command::SetLocalFields(fields("beta", HostStatus::Start)));

    let started = wait_until(
        || alpha.directory_snapshot().any_start(),
        Duration::from_secs(2),
    )
    .await;
    assert!(started, "the start announcement should reach the peer");
}

#[tokio::test]
async fn test_offline_peer_is_dropped_immediately() {
    let hub = MemoryHub::new();
    let config = test_config();
    let alpha = spawn_engine(&hub, &config, 1, "alpha");
    let beta = spawn_engine(&hub, &config, 2, "beta");

    alpha.command(Command::SetLocalFields(fields("alpha", HostStatus::Lobby)));
    alpha.command(Command::SetMode(SessionMode::Discover));
    beta.command(Command::SetLocalFields(fields("beta", HostStatus::Lobby)));
    beta.command(Command::SetMode(SessionMode::Discover));

    assert!(
        wait_until(
            || alpha.directory_snapshot().get(addr(2)).is_some(),
            Duration::from_secs(2)
        )
        .await
    );

    beta.command(Command::SetLocalFields(fields("beta", HostStatus::Offline)));

    let dropped = wait_until(
        || alpha.directory_snapshot().get(addr(2)).is_none(),
        Duration::from_secs(2),
    )
    .await;
    assert!(dropped, "an offline announcement should prune the record");
}

#[tokio::test]
async fn test_return_to_lobby_clears_start_intents() {
    let hub = MemoryHub::new();
    // Long expiry so the one-shot peer announcement below stays current
    // for the whole test.
    let config = test_config().with_time_to_expire(Duration::from_secs(5));
    let alpha = spawn_engine(&hub, &config, 1, "alpha");
    let peer = hub.endpoint(addr(2), config.socket_time_out);

    alpha.command(Command::SetLocalFields(fields("alpha", HostStatus::Start)));
    alpha.command(Command::SetMode(SessionMode::Discover));
    peer.send(&Message::Announce(fields("beta", HostStatus::Start)))
        .await
        .unwrap();

    // Wait for the peer's announcement specifically, not just any start
    // intent; alpha's own record alone would satisfy any_start.
    assert!(
        wait_until(
            || {
                alpha
                    .directory_snapshot()
                    .get(addr(2))
                    .map(|record| record.status() == HostStatus::Start)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await,
        "both start intents should be on record"
    );

    alpha.command(Command::ReturnToLobby);

    let cleared = wait_until(
        || {
            let snapshot = alpha.directory_snapshot();
            !snapshot.any_start() && snapshot.get(addr(2)).is_some()
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(cleared, "start intents drop but the known hosts stay");
    assert_eq!(
        alpha.directory_snapshot().self_record().status(),
        HostStatus::Lobby
    );
}

#[tokio::test]
async fn test_traffic_counters_are_published() {
    let hub = MemoryHub::new();
    let config = test_config();
    let alpha = spawn_engine(&hub, &config, 1, "alpha");
    let beta = spawn_engine(&hub, &config, 2, "beta");

    alpha.command(Command::SetLocalFields(fields("alpha", HostStatus::Lobby)));
    alpha.command(Command::SetMode(SessionMode::Discover));
    beta.command(Command::SetLocalFields(fields("beta", HostStatus::Lobby)));
    beta.command(Command::SetMode(SessionMode::Discover));

    let counted = wait_until(
        || {
            let stats = alpha.stats_snapshot();
            stats.datagrams_sent >= 1 && stats.datagrams_received >= 1
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(counted, "announce traffic should show in the counters");
}

#[tokio::test]
async fn test_silent_peer_expires() {
    let hub = MemoryHub::new();
    let config = test_config();
    let alpha = spawn_engine(&hub, &config, 1, "alpha");
    let beta = spawn_engine(&hub, &config, 2, "beta");

    alpha.command(Command::SetLocalFields(fields("alpha", HostStatus::Lobby)));
    alpha.command(Command::SetMode(SessionMode::Discover));
    beta.command(Command::SetLocalFields(fields("beta", HostStatus::Lobby)));
    beta.command(Command::SetMode(SessionMode::Discover));

    assert!(
        wait_until(
            || alpha.directory_snapshot().get(addr(2)).is_some(),
            Duration::from_secs(2)
        )
        .await
    );

    // Dropping the handle shuts beta down; its record must age out of
    // alpha's directory within the expiry window.
    drop(beta);

    let expired = wait_until(
        || alpha.directory_snapshot().get(addr(2)).is_none(),
        Duration::from_secs(2),
    )
    .await;
    assert!(expired, "a silent peer should expire after time_to_expire");
}
