// Session Engine - the long-lived protocol task
//
// One background task runs the whole protocol, phase by phase: discovery,
// either handshake role, then replication. It owns its mode and every
// piece of protocol state; the controller reaches it only through the
// command channel and observes it through watch channels. Cancellation is
// cooperative and coarse: every phase re-checks commands each loop
// iteration, bounded by the socket wait, and an interrupted phase simply
// abandons its partial progress.

use crate::config::NetConfig;
use crate::directory::{HostDirectory, HostFields, HostStatus};
use crate::protocol::{GameAssignment, Message, Report};
use crate::session::handshake::AckSet;
use crate::session::mode::{Command, HandshakeProgress, SessionMode};
use crate::session::replication::ReplicationState;
use crate::transport::{Endpoint, NetStats, RecvOutcome, TransportError};
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Controller-side handle to a running engine
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    pub mode: watch::Receiver<SessionMode>,
    pub progress: watch::Receiver<HandshakeProgress>,
    pub directory: watch::Receiver<HostDirectory>,
    pub stats: watch::Receiver<NetStats>,
    pub inbound: mpsc::UnboundedReceiver<(u32, Report)>,
}

impl SessionHandle {
    /// Send one command; a closed engine just drops it
    pub fn command(&self, command: Command) {
        let _ = self.commands.send(command);
    }

    pub fn current_mode(&self) -> SessionMode {
        *self.mode.borrow()
    }

    /// Latest directory snapshot
    pub fn directory_snapshot(&self) -> HostDirectory {
        self.directory.borrow().clone()
    }

    /// Latest handshake progress
    pub fn progress_snapshot(&self) -> HandshakeProgress {
        self.progress.borrow().clone()
    }

    /// Latest datagram counters
    pub fn stats_snapshot(&self) -> NetStats {
        self.stats.borrow().clone()
    }

    /// Drain everything currently queued on the inbound path
    pub fn drain_inbound(&mut self) -> Vec<(u32, Report)> {
        let mut drained = Vec::new();
        while let Ok(item) = self.inbound.try_recv() {
            drained.push(item);
        }
        drained
    }
}

/// The protocol task itself
pub struct SessionEngine<E: Endpoint> {
    endpoint: E,
    config: NetConfig,
    hostname: String,
    directory: HostDirectory,
    mode: SessionMode,
    coordinator: bool,
    my_fields: Option<HostFields>,
    supplied_assignment: Option<GameAssignment>,
    session_assignment: Option<GameAssignment>,
    outbound: VecDeque<(u32, Report)>,
    stats: NetStats,
    shutdown: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    mode_tx: watch::Sender<SessionMode>,
    progress_tx: watch::Sender<HandshakeProgress>,
    directory_tx: watch::Sender<HostDirectory>,
    stats_tx: watch::Sender<NetStats>,
    inbound_tx: mpsc::UnboundedSender<(u32, Report)>,
}

impl<E: Endpoint> SessionEngine<E> {
    /// Build an engine around an endpoint, returning the controller handle
    pub fn new(endpoint: E, config: NetConfig, hostname: &str) -> (Self, SessionHandle) {
        let directory = HostDirectory::new(endpoint.local_addr(), hostname, Instant::now());

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (mode_tx, mode_rx) = watch::channel(SessionMode::Idle);
        let (progress_tx, progress_rx) = watch::channel(HandshakeProgress::default());
        let (directory_tx, directory_rx) = watch::channel(directory.clone());
        let (stats_tx, stats_rx) = watch::channel(NetStats::default());
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let engine = Self {
            endpoint,
            config,
            hostname: hostname.to_string(),
            directory,
            mode: SessionMode::Idle,
            coordinator: false,
            my_fields: None,
            supplied_assignment: None,
            session_assignment: None,
            outbound: VecDeque::new(),
            stats: NetStats::default(),
            shutdown: false,
            commands: command_rx,
            mode_tx,
            progress_tx,
            directory_tx,
            stats_tx,
            inbound_tx,
        };
        let handle = SessionHandle {
            commands: command_tx,
            mode: mode_rx,
            progress: progress_rx,
            directory: directory_rx,
            stats: stats_rx,
            inbound: inbound_rx,
        };
        (engine, handle)
    }

    /// Run until the controller handle is dropped
    pub async fn run(mut self) -> Result<(), TransportError> {
        info!(addr = %self.directory.self_addr(), "session engine running");
        while !self.shutdown {
            match self.mode {
                SessionMode::Idle => self.idle().await,
                SessionMode::Discover => self.discover().await?,
                SessionMode::HandshakeCoordinator => self.coordinate().await?,
                SessionMode::HandshakeFollower => self.follow().await?,
                SessionMode::Active => self.replicate().await?,
            }
        }
        info!("session engine stopped");
        Ok(())
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    fn apply_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.shutdown = true;
                    break;
                }
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::SetMode(mode) => self.set_mode(mode),
            Command::Reset => self.reset_data(),
            Command::ReturnToLobby => self.return_to_lobby(),
            Command::SetLocalFields(fields) => {
                self.my_fields = Some(fields.clone());
                self.directory.set_self_fields(fields, Instant::now());
                self.publish_directory();
            }
            Command::SupplyAssignment(assignment) => {
                self.supplied_assignment = Some(assignment);
            }
            Command::SendUpdate { game_id, report } => {
                self.outbound.push_back((game_id, report));
            }
        }
    }

    fn set_mode(&mut self, mode: SessionMode) {
        if self.mode != mode {
            info!(?mode, "mode change");
            self.mode = mode;
            self.mode_tx.send_replace(mode);
        }
    }

    /// Abandon all session state and return to discovery with a fresh
    /// directory, as after startup or a failed handshake
    fn reset_data(&mut self) {
        self.directory =
            HostDirectory::new(self.directory.self_addr(), &self.hostname, Instant::now());
        self.my_fields = None;
        self.supplied_assignment = None;
        self.session_assignment = None;
        self.coordinator = false;
        self.outbound.clear();
        self.publish_directory();
        self.progress_tx.send_replace(HandshakeProgress::default());
        self.set_mode(SessionMode::Discover);
    }

    /// Soften a failed join: the known hosts stay, but every start
    /// intent drops back to lobby and discovery resumes
    fn return_to_lobby(&mut self) {
        self.directory.mark_all_lobby();
        if let Some(fields) = self.my_fields.as_mut() {
            fields.status = HostStatus::Lobby;
        }
        self.supplied_assignment = None;
        self.session_assignment = None;
        self.coordinator = false;
        self.outbound.clear();
        self.publish_directory();
        self.progress_tx.send_replace(HandshakeProgress::default());
        self.set_mode(SessionMode::Discover);
    }

    fn publish_directory(&self) {
        self.directory_tx.send_replace(self.directory.clone());
    }

    fn publish_stats(&self) {
        self.stats_tx.send_replace(self.stats.clone());
    }

    // ========================================================================
    // PHASES
    // ========================================================================

    async fn idle(&mut self) {
        while self.mode == SessionMode::Idle && !self.shutdown {
            self.apply_commands();
            if self.mode != SessionMode::Idle || self.shutdown {
                break;
            }
            sleep(self.config.socket_time_out).await;
        }
    }

    /// Advertise local presence and keep the directory current
    async fn discover(&mut self) -> Result<(), TransportError> {
        debug!("discovery started");
        let mut last_announce: Option<Instant> = None;

        while self.mode == SessionMode::Discover && !self.shutdown {
            self.apply_commands();
            if self.mode != SessionMode::Discover || self.shutdown {
                break;
            }

            let due = last_announce
                .map_or(true, |stamp| stamp.elapsed() >= self.config.broadcast_delay);
            if due && self.announce().await? {
                last_announce = Some(Instant::now());
            }

            match self.endpoint.recv().await {
                Ok(RecvOutcome::Message { origin, message }) => {
                    self.stats.datagrams_received += 1;
                    if origin != self.directory.self_addr() {
                        if let Message::Announce(fields) = message {
                            self.directory.upsert(origin, fields, Instant::now());
                        }
                    }
                }
                Ok(RecvOutcome::Timeout) => {}
                Err(TransportError::Decode(err)) => {
                    self.stats.decode_failures += 1;
                    warn!(%err, "dropped undecodable datagram");
                }
                Err(err) => return Err(err),
            }

            // Expire stale peers after every receive attempt.
            self.directory
                .prune(Instant::now(), self.config.time_to_expire);
            self.publish_directory();
            self.publish_stats();
        }

        // One final advertisement so peers observe the status change
        // promptly instead of waiting out the expiry window.
        self.announce().await?;
        Ok(())
    }

    /// Send one announcement if local status data has been set
    async fn announce(&mut self) -> Result<bool, TransportError> {
        let Some(fields) = self.my_fields.clone() else {
            return Ok(false);
        };
        self.endpoint.send(&Message::Announce(fields)).await?;
        self.stats.datagrams_sent += 1;
        Ok(true)
    }

    /// Coordinator handshake: distribute the assignment, collect acks,
    /// signal start
    async fn coordinate(&mut self) -> Result<(), TransportError> {
        self.coordinator = true;
        let mut progress = HandshakeProgress::default();
        self.progress_tx.send_replace(progress.clone());

        // Await the controller's assignment, bounded by the expiry window.
        let deadline = Instant::now() + self.config.time_to_expire;
        while self.mode == SessionMode::HandshakeCoordinator
            && !self.shutdown
            && self.supplied_assignment.is_none()
        {
            self.apply_commands();
            if self.supplied_assignment.is_none() && Instant::now() >= deadline {
                warn!("no assignment supplied in time, aborting handshake");
                self.reset_data();
                return Ok(());
            }
            if self.supplied_assignment.is_none() {
                sleep(self.config.socket_time_out).await;
            }
        }
        if self.mode != SessionMode::HandshakeCoordinator || self.shutdown {
            return Ok(());
        }
        let Some(assignment) = self.supplied_assignment.take() else {
            return Ok(());
        };

        self.endpoint
            .send(&Message::GameData(assignment.encode()))
            .await?;
        self.stats.datagrams_sent += 1;
        info!(games = assignment.total_games(), "assignment broadcast");
        progress.data_seen = true;
        progress.assignment = Some(assignment.clone());
        self.progress_tx.send_replace(progress.clone());

        // Collect acks. No per-ack timeout: a silent peer stalls us here
        // until the controller's session timeout resets everything.
        let mut acks = AckSet::new(&assignment, self.directory.self_addr());
        while self.mode == SessionMode::HandshakeCoordinator && !self.shutdown && !acks.all_acked()
        {
            self.apply_commands();
            if self.mode != SessionMode::HandshakeCoordinator || self.shutdown {
                return Ok(());
            }
            match self.endpoint.recv().await {
                Ok(RecvOutcome::Message {
                    origin,
                    message: Message::Ack,
                }) => {
                    debug!(%origin, "ack received");
                    acks.mark(origin);
                }
                Ok(_) => {}
                Err(TransportError::Decode(err)) => {
                    self.stats.decode_failures += 1;
                    warn!(%err, "dropped undecodable datagram");
                }
                Err(err) => return Err(err),
            }
            self.publish_stats();
        }
        if self.mode != SessionMode::HandshakeCoordinator || self.shutdown {
            return Ok(());
        }
        progress.acked = true;
        self.progress_tx.send_replace(progress.clone());

        self.endpoint.send(&Message::Sync).await?;
        self.stats.datagrams_sent += 1;
        info!("start signal broadcast");
        progress.start_seen = true;
        self.progress_tx.send_replace(progress);
        self.publish_stats();

        self.session_assignment = Some(assignment);
        self.done().await;
        Ok(())
    }

    /// Follower handshake: wait for an assignment naming us, ack it, wait
    /// for the start signal
    async fn follow(&mut self) -> Result<(), TransportError> {
        self.coordinator = false;
        let mut progress = HandshakeProgress::default();
        self.progress_tx.send_replace(progress.clone());

        let self_key = crate::protocol::HostKey::Host(self.directory.self_addr());
        let mut assignment: Option<GameAssignment> = None;
        while self.mode == SessionMode::HandshakeFollower && !self.shutdown && assignment.is_none()
        {
            self.apply_commands();
            if self.mode != SessionMode::HandshakeFollower || self.shutdown {
                return Ok(());
            }
            match self.endpoint.recv().await {
                Ok(RecvOutcome::Message {
                    message: Message::GameData(encoded),
                    ..
                }) => {
                    let decoded = GameAssignment::decode(&encoded);
                    if decoded.contains(&self_key) {
                        assignment = Some(decoded);
                    }
                }
                Ok(_) => {}
                Err(TransportError::Decode(err)) => {
                    self.stats.decode_failures += 1;
                    warn!(%err, "dropped undecodable datagram");
                }
                Err(err) => return Err(err),
            }
            self.publish_stats();
        }
        let Some(assignment) = assignment else {
            return Ok(());
        };
        info!(games = assignment.total_games(), "assignment received");
        progress.data_seen = true;
        progress.assignment = Some(assignment.clone());
        self.progress_tx.send_replace(progress.clone());

        self.endpoint.send(&Message::Ack).await?;
        self.stats.datagrams_sent += 1;
        progress.acked = true;
        self.progress_tx.send_replace(progress.clone());

        // Wait for the start signal. Deliberately unbounded here; only
        // the controller's session timeout can unstick a dead coordinator.
        let mut started = false;
        while self.mode == SessionMode::HandshakeFollower && !self.shutdown && !started {
            self.apply_commands();
            if self.mode != SessionMode::HandshakeFollower || self.shutdown {
                return Ok(());
            }
            match self.endpoint.recv().await {
                Ok(RecvOutcome::Message {
                    message: Message::Sync,
                    ..
                }) => started = true,
                Ok(_) => {}
                Err(TransportError::Decode(err)) => {
                    self.stats.decode_failures += 1;
                    warn!(%err, "dropped undecodable datagram");
                }
                Err(err) => return Err(err),
            }
            self.publish_stats();
        }
        if !started {
            return Ok(());
        }
        info!("start signal received");
        progress.start_seen = true;
        self.progress_tx.send_replace(progress);
        self.publish_stats();

        self.session_assignment = Some(assignment);
        self.done().await;
        Ok(())
    }

    /// Handshake done: poll until the controller moves the session on
    async fn done(&mut self) {
        while !self.shutdown
            && matches!(
                self.mode,
                SessionMode::HandshakeCoordinator | SessionMode::HandshakeFollower
            )
        {
            self.apply_commands();
            if self.shutdown {
                break;
            }
            if matches!(
                self.mode,
                SessionMode::HandshakeCoordinator | SessionMode::HandshakeFollower
            ) {
                sleep(self.config.socket_time_out).await;
            }
        }
    }

    /// Active session: replicate gameplay events both ways
    async fn replicate(&mut self) -> Result<(), TransportError> {
        let Some(assignment) = self.session_assignment.clone() else {
            warn!("active mode without an assignment, resetting");
            self.reset_data();
            return Ok(());
        };
        let Some(mut replication) =
            ReplicationState::new(&assignment, self.directory.self_addr(), self.coordinator)
        else {
            warn!("local host missing from assignment, resetting");
            self.reset_data();
            return Ok(());
        };
        info!("replication channel open");

        while self.mode == SessionMode::Active && !self.shutdown {
            self.apply_commands();
            if self.mode != SessionMode::Active || self.shutdown {
                break;
            }

            while let Some((game_id, report)) = self.outbound.pop_front() {
                match replication.prepare_send(game_id, report) {
                    Ok(update) => {
                        self.endpoint.send(&Message::GameUpdate(update)).await?;
                        self.stats.datagrams_sent += 1;
                    }
                    Err(err) => warn!(%err, game_id, "unsendable report dropped"),
                }
            }

            match self.endpoint.recv().await {
                Ok(RecvOutcome::Message { origin, message }) => {
                    self.stats.datagrams_received += 1;
                    if origin == self.directory.self_addr() {
                        continue;
                    }
                    if let Message::GameUpdate(update) = message {
                        match replication.admit(update) {
                            Ok(Some(delivery)) => {
                                let _ = self.inbound_tx.send(delivery);
                            }
                            Ok(None) => self.stats.stale_updates_dropped += 1,
                            Err(err) => {
                                self.stats.decode_failures += 1;
                                warn!(%err, "dropped undecodable board payload");
                            }
                        }
                    }
                }
                Ok(RecvOutcome::Timeout) => {}
                Err(TransportError::Decode(err)) => {
                    self.stats.decode_failures += 1;
                    warn!(%err, "dropped undecodable datagram");
                }
                Err(err) => return Err(err),
            }
            self.publish_stats();
        }
        Ok(())
    }
}
