// Session Controller - drives the engine from the game side
//
// The controller is the only writer of commands: it watches the lobby for
// a start signal, runs election and dispatch, baby-sits the handshake
// against the session timeout, then owns the per-game views for the
// active session. All protocol failures funnel into one recovery: reset
// the engine back to discovery and surface an error to the caller.

use crate::config::NetConfig;
use crate::directory::{HostFields, HostStatus};
use crate::protocol::{dispatch, elect, GameAssignment, HostKey, Report};
use crate::session::engine::SessionHandle;
use crate::session::mode::{Command, SessionMode};
use crate::session::view::GameView;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// Session-level errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Handshake did not complete within the session timeout")]
    HandshakeTimedOut,

    #[error("Local host is not part of the session assignment")]
    NotAssigned,
}

/// Display-side layout of one session, derived from the assignment.
///
/// Display IDs always put this host's own games first, starting at zero;
/// the replication channel translates between this numbering and the
/// session's global one.
#[derive(Clone, Debug)]
pub struct SessionPlan {
    pub total_games: u32,
    /// Games played on this machine by people
    pub active_range: Vec<u32>,
    /// Games mirrored from other hosts
    pub remote_range: Vec<u32>,
    /// Computer-controlled games, coordinator only
    pub ai_range: Vec<u32>,
}

impl SessionPlan {
    /// Derive the display layout for `self_addr` from an assignment
    pub fn from_assignment(
        assignment: &GameAssignment,
        self_addr: std::net::Ipv4Addr,
        is_coordinator: bool,
        run_ai: bool,
    ) -> Option<Self> {
        let local = assignment.get(&HostKey::Host(self_addr))?;
        let local_len = local.len();
        let total = assignment.total_games();
        let ai_len = assignment
            .get(&HostKey::Ai)
            .map(|range| range.len())
            .unwrap_or(0);

        let active_range: Vec<u32> = (0..local_len).collect();
        let (remote_range, ai_range) = if is_coordinator {
            let remote: Vec<u32> = (local_len..total - ai_len).collect();
            let ai: Vec<u32> = if run_ai {
                (total - ai_len..total).collect()
            } else {
                Vec::new()
            };
            (remote, ai)
        } else {
            ((local_len..total).collect(), Vec::new())
        };

        Some(Self {
            total_games: total,
            active_range,
            remote_range,
            ai_range,
        })
    }

    /// A connected session has at least one remote game to mirror
    pub fn is_connected(&self) -> bool {
        !self.remote_range.is_empty()
    }
}

/// The game-facing side of a running session
pub struct SessionController {
    handle: SessionHandle,
    config: NetConfig,
    hostname: String,
    player_count: u32,
    is_coordinator: bool,
    connected: bool,
    plan: Option<SessionPlan>,
    views: Vec<GameView>,
    lost: HashSet<u32>,
    winner: Option<u32>,
    /// Reports the gameplay collaborator must apply locally (bonus lines
    /// routed to a local or AI board)
    local_effects: Vec<(u32, Report)>,
}

impl SessionController {
    pub fn new(
        handle: SessionHandle,
        config: NetConfig,
        hostname: &str,
        player_count: u32,
    ) -> Self {
        Self {
            handle,
            config,
            hostname: hostname.to_string(),
            player_count,
            is_coordinator: false,
            connected: false,
            plan: None,
            views: Vec::new(),
            lost: HashSet::new(),
            winner: None,
            local_effects: Vec::new(),
        }
    }

    pub fn plan(&self) -> Option<&SessionPlan> {
        self.plan.as_ref()
    }

    /// Latest view of the lobby, for the host-selection screen
    pub fn directory_snapshot(&self) -> crate::directory::HostDirectory {
        self.handle.directory_snapshot()
    }

    pub fn views(&self) -> &[GameView] {
        &self.views
    }

    pub fn view(&self, game_id: u32) -> Option<&GameView> {
        self.views.get(game_id as usize)
    }

    pub fn winner(&self) -> Option<u32> {
        self.winner
    }

    pub fn is_coordinator(&self) -> bool {
        self.is_coordinator
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Reports the gameplay side must apply to its own boards
    pub fn take_local_effects(&mut self) -> Vec<(u32, Report)> {
        std::mem::take(&mut self.local_effects)
    }

    fn local_fields(&self, status: HostStatus) -> HostFields {
        HostFields {
            status,
            hostname: self.hostname.clone(),
            player_count: self.player_count,
            max_capacity: self.config.max_games,
            ai_capable: self.config.run_ai,
        }
    }

    // ========================================================================
    // LOBBY
    // ========================================================================

    /// Enter the lobby: start advertising and listening
    pub fn join_lobby(&self) {
        self.handle
            .command(Command::SetLocalFields(self.local_fields(HostStatus::Lobby)));
        self.handle.command(Command::SetMode(SessionMode::Discover));
    }

    /// Announce intent to start; peers observe it via discovery
    pub fn request_start(&self) {
        self.handle
            .command(Command::SetLocalFields(self.local_fields(HostStatus::Start)));
    }

    /// Leave the lobby or a finished session
    pub fn leave(&self) {
        self.handle.command(Command::SetLocalFields(
            self.local_fields(HostStatus::Offline),
        ));
        self.handle.command(Command::Reset);
    }

    /// Check the lobby for a start signal and, if one is out there, run
    /// the whole join sequence: elect, dispatch or follow, wait out the
    /// handshake, switch the session active.
    ///
    /// Returns `Ok(false)` when nothing has started yet. Any failure has
    /// already reset the engine by the time it is returned.
    pub async fn try_start(&mut self) -> Result<bool, SessionError> {
        let snapshot = self.handle.directory_snapshot();
        if !snapshot.any_start() {
            return Ok(false);
        }

        let leader = elect(&snapshot);
        self.is_coordinator = leader == snapshot.self_addr();
        info!(%leader, coordinator = self.is_coordinator, "session starting");

        if self.is_coordinator {
            let assignment = dispatch(&snapshot, self.config.max_games, self.config.run_ai, true);
            self.handle
                .command(Command::SetMode(SessionMode::HandshakeCoordinator));
            // Head start so followers are listening before the assignment
            // hits the wire; a follower that misses it stalls the acks.
            sleep(Duration::from_secs(1)).await;
            self.handle.command(Command::SupplyAssignment(assignment));
        } else {
            self.handle
                .command(Command::SetMode(SessionMode::HandshakeFollower));
        }

        self.await_handshake().await?;
        Ok(true)
    }

    /// Wait for the handshake to complete, bounded by the session timeout
    async fn await_handshake(&mut self) -> Result<(), SessionError> {
        let deadline = Instant::now() + self.config.time_to_expire;
        loop {
            let progress = self.handle.progress_snapshot();
            if progress.complete() {
                let assignment = progress.assignment.ok_or(SessionError::NotAssigned)?;
                return self.activate(&assignment);
            }
            if Instant::now() >= deadline {
                warn!("handshake stalled, resetting session");
                self.handle.command(Command::Reset);
                return Err(SessionError::HandshakeTimedOut);
            }
            sleep(self.config.socket_time_out).await;
        }
    }

    /// Verify our place in the assignment and switch the session active
    fn activate(&mut self, assignment: &GameAssignment) -> Result<(), SessionError> {
        let snapshot = self.handle.directory_snapshot();
        let plan = SessionPlan::from_assignment(
            assignment,
            snapshot.self_addr(),
            self.is_coordinator,
            self.config.run_ai,
        )
        .ok_or_else(|| {
            // Left out of the assignment: keep the lobby we know about,
            // just drop the start intents and go back to waiting.
            self.handle.command(Command::ReturnToLobby);
            SessionError::NotAssigned
        })?;

        self.views = vec![GameView::new(); plan.total_games as usize];
        self.lost.clear();
        self.winner = None;
        self.connected = plan.is_connected();
        self.plan = Some(plan);
        self.handle.command(Command::SetMode(SessionMode::Active));
        Ok(())
    }

    /// Set up a solo session without touching the network
    pub fn start_solo(&mut self) {
        let snapshot = self.handle.directory_snapshot();
        let games = i64::from(self.player_count.min(self.config.max_games));
        let mut assignment = GameAssignment::new();
        assignment.insert(
            HostKey::Host(snapshot.self_addr()),
            crate::protocol::GameRange::new(0, games - 1),
        );
        if self.config.run_ai {
            assignment.insert(
                HostKey::Ai,
                crate::protocol::GameRange::new(games, i64::from(self.config.max_games) - 1),
            );
        } else {
            assignment.insert(HostKey::Ai, crate::protocol::GameRange::empty_at(games));
        }

        self.is_coordinator = true;
        self.connected = false;
        let plan = SessionPlan::from_assignment(
            &assignment,
            snapshot.self_addr(),
            true,
            self.config.run_ai,
        )
        .unwrap_or(SessionPlan {
            total_games: 0,
            active_range: Vec::new(),
            remote_range: Vec::new(),
            ai_range: Vec::new(),
        });
        self.views = vec![GameView::new(); plan.total_games as usize];
        self.lost.clear();
        self.winner = None;
        self.plan = Some(plan);
    }

    // ========================================================================
    // ACTIVE SESSION
    // ========================================================================

    /// Feed one locally produced report: apply it to the view, run the
    /// session rules, and replicate it when connected
    pub fn report_local(&mut self, game_id: u32, report: Report) {
        self.apply_report(game_id, report.clone());
        if self.connected {
            self.handle.command(Command::SendUpdate { game_id, report });
        }
    }

    /// Drain the inbound queue once and apply everything to the views.
    /// Returns the display IDs whose views changed this tick.
    pub fn tick(&mut self) -> Vec<u32> {
        let mut updated = Vec::new();
        for (game_id, report) in self.handle.drain_inbound() {
            updated.push(game_id);
            self.apply_report(game_id, report);
        }
        updated
    }

    fn apply_report(&mut self, game_id: u32, report: Report) {
        match &report {
            Report::Winner(winner) => {
                self.winner = Some(*winner);
                return;
            }
            Report::Bonus(_) => {
                // Bonus lines act on a playable board, so they belong to
                // the gameplay side when the target is ours; a remote
                // game's bonus shows up through its own board updates.
                if self.is_playable_here(game_id) {
                    self.local_effects.push((game_id, report));
                }
                return;
            }
            Report::Clear { lines, .. } => {
                let penalty = lines / 2;
                if self.is_coordinator && penalty > 0 && self.views.len() > 1 {
                    self.send_penalty(game_id, penalty);
                }
            }
            Report::Loss => {
                self.lost.insert(game_id);
            }
            _ => {}
        }

        let multi = self.views.len() > 1;
        if let Some(view) = self.views.get_mut(game_id as usize) {
            view.apply(&report, multi);
        }

        if matches!(report, Report::Loss) {
            self.check_winner();
        }
    }

    fn is_playable_here(&self, game_id: u32) -> bool {
        self.plan
            .as_ref()
            .map(|plan| {
                plan.active_range.contains(&game_id) || plan.ai_range.contains(&game_id)
            })
            .unwrap_or(false)
    }

    /// Coordinator only: pick a surviving victim for penalty lines
    fn send_penalty(&mut self, source: u32, penalty: u32) {
        let candidates: Vec<u32> = (0..self.views.len() as u32)
            .filter(|id| *id != source && !self.lost.contains(id))
            .collect();
        let Some(&victim) = candidates.choose(&mut rand::thread_rng()) else {
            return;
        };

        if self.is_playable_here(victim) {
            self.local_effects.push((victim, Report::Bonus(penalty)));
        } else if self.connected {
            self.handle.command(Command::SendUpdate {
                game_id: victim,
                report: Report::Bonus(penalty),
            });
        }
    }

    /// Coordinator only: declare a winner once fewer than two games survive
    fn check_winner(&mut self) {
        if !self.is_coordinator || self.views.len() < 2 || self.winner.is_some() {
            return;
        }
        let survivors: Vec<u32> = (0..self.views.len() as u32)
            .filter(|id| !self.lost.contains(id))
            .collect();
        if survivors.len() < 2 {
            let winner = survivors.first().copied().unwrap_or(0);
            info!(winner, "session over");
            self.winner = Some(winner);
            if self.connected {
                self.handle.command(Command::SendUpdate {
                    game_id: winner,
                    report: Report::Winner(winner),
                });
            }
        }
    }
}
