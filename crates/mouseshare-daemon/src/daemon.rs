//! Core daemon orchestration: the control-state machine and event loop.
//!
//! The controller state is a single-writer domain. Capture, transport,
//! discovery, the clipboard bridge, and timers all reach it through one
//! mpsc command channel consumed by [`Daemon::run`]; every transition is
//! totally ordered on this loop.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use mouseshare_arrangement::{compute_entry_position, ArrangedScreen};
use mouseshare_clipboard::{ClipboardContent, ClipboardProvider};
use mouseshare_discovery::DiscoveryEvent;
use mouseshare_input::{
    edge_warp_point, CaptureEvent, DisplayProvider, EventTap, Injector,
};
use mouseshare_protocol::{
    handshake, LocalIdentity, MessageReceiver, MessageSender, SessionCipher, TcpTransport,
};
use mouseshare_types::{
    combined_bounds, ClipboardFormat, Edge, InputEvent, InputPacket, PeerId, Rect, TimedEvent,
};

use crate::batch::EventBatch;
use crate::clipboard_bridge::{self, ClipboardCommand, MAX_CLIPBOARD_SIZE};
use crate::config::Settings;
use crate::error::DaemonError;
use crate::peers::{PeerRegistry, PeerState};
use crate::return_edge::{ReturnEdgeTracker, ReturnOutcome};
use crate::session::{spawn_reader, PeerSession};
use crate::setup::save_settings;
use crate::status::{DaemonStatus, StatusKind};

/// Outgoing events are flushed to the wire on this cadence (~120 Hz).
pub const BATCH_FLUSH_INTERVAL: Duration = Duration::from_millis(8);

/// Heartbeat cadence to every connected peer.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// A Controlling host falls back to Local if the peer has not been heard
/// from within this window after the transition.
pub const FAILSAFE_TIMEOUT: Duration = Duration::from_secs(2);

/// While Controlling, peer silence beyond this forces Local.
pub const CONTROLLING_SILENCE: Duration = Duration::from_secs(5);

/// After returning to Local, edge crossings are ignored for this long.
pub const COOLDOWN: Duration = Duration::from_millis(500);

/// Events processed by the daemon's main loop.
pub enum DaemonEvent {
    /// Captured input, edge arrival, or escape from the event tap.
    Capture(CaptureEvent),
    /// A peer appeared, changed, or vanished on mDNS.
    Discovery(DiscoveryEvent),
    /// A handshake completed on an inbound or outbound connection.
    SessionEstablished {
        peer_id: PeerId,
        peer_name: String,
        screen_width: u32,
        screen_height: u32,
        endpoint: SocketAddr,
        sender: MessageSender,
        receiver: MessageReceiver,
    },
    /// An outbound connection attempt failed.
    ConnectFailed { peer_id: PeerId, reason: String },
    /// A packet arrived from a peer.
    PeerPacket {
        peer_id: PeerId,
        packet: InputPacket,
        sequence_gap: u64,
    },
    /// A peer's connection closed.
    PeerDisconnected(PeerId),
    /// The local clipboard changed (from the bridge).
    ClipboardChanged(ClipboardContent),
    /// Move a peer's screen in the arrangement (settings UI drag).
    RepositionPeerScreen { peer_id: PeerId, x: f64, y: f64 },
    /// Shut the daemon down.
    Shutdown,
}

/// Control-state machine. Exactly one variant holds at any instant, and a
/// non-Local state names exactly one counterparty.
enum ControlState {
    Local,
    Controlling(ControllingSession),
    Controlled(ControlledSession),
}

struct ControllingSession {
    peer_id: PeerId,
    exit_edge: Edge,
    /// Normalised exit position along the exit edge.
    exit_position: f64,
    awaiting_ack: bool,
    failsafe_rearmed: bool,
}

struct ControlledSession {
    peer_id: PeerId,
    entry_edge: Edge,
    tracker: ReturnEdgeTracker,
}

/// Why a Controlling session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaveReason {
    /// The user pressed the escape key.
    Escape,
    /// The controlled host reported the cursor crossed back.
    PeerReturned,
    /// Failsafe, silence threshold, or connection error.
    ConnectionLost,
}

/// The mouseshare peer daemon.
pub struct Daemon {
    settings: Settings,
    settings_path: Option<PathBuf>,
    local_id: PeerId,
    local_name: String,
    transport: Arc<TcpTransport>,
    cipher: Option<Arc<SessionCipher>>,
    tap: Box<dyn EventTap>,
    injector: Box<dyn Injector>,
    displays: Box<dyn DisplayProvider>,
    clipboard: Option<Box<dyn ClipboardProvider>>,
    clipboard_tx: Option<mpsc::Sender<ClipboardCommand>>,
    local_bounds: Rect,
    registry: PeerRegistry,
    sessions: HashMap<PeerId, PeerSession>,
    state: ControlState,
    batch: EventBatch,
    cooldown_until: Option<Instant>,
    failsafe_deadline: Option<Instant>,
    event_tx: mpsc::Sender<DaemonEvent>,
    event_rx: mpsc::Receiver<DaemonEvent>,
    status_tx: watch::Sender<DaemonStatus>,
}

impl Daemon {
    /// Build a daemon around the given OS backends.
    pub fn new(
        settings: Settings,
        local_id: PeerId,
        local_name: &str,
        transport: TcpTransport,
        tap: Box<dyn EventTap>,
        injector: Box<dyn Injector>,
        displays: Box<dyn DisplayProvider>,
        clipboard: Option<Box<dyn ClipboardProvider>>,
    ) -> Result<Self, DaemonError> {
        let cipher = if settings.encryption_enabled {
            Some(Arc::new(SessionCipher::from_password(&settings.password)?))
        } else {
            None
        };

        let (event_tx, event_rx) = mpsc::channel(1024);
        let (status_tx, _) = watch::channel(DaemonStatus::default());

        Ok(Self {
            settings,
            settings_path: None,
            local_id,
            local_name: local_name.to_string(),
            transport: Arc::new(transport),
            cipher,
            tap,
            injector,
            displays,
            clipboard,
            clipboard_tx: None,
            local_bounds: Rect::new(0.0, 0.0, 0.0, 0.0),
            registry: PeerRegistry::new(),
            sessions: HashMap::new(),
            state: ControlState::Local,
            batch: EventBatch::new(),
            cooldown_until: None,
            failsafe_deadline: None,
            event_tx,
            event_rx,
            status_tx,
        })
    }

    /// Persist settings changes (auto-links, screen drags) to this path.
    /// Without one, changes stay in memory only.
    pub fn set_settings_path(&mut self, path: PathBuf) {
        self.settings_path = Some(path);
    }

    /// Sender for feeding events into the daemon (discovery, shutdown,
    /// settings-UI actions).
    pub fn event_sender(&self) -> mpsc::Sender<DaemonEvent> {
        self.event_tx.clone()
    }

    /// Watch receiver for observing state changes.
    pub fn status_receiver(&self) -> watch::Receiver<DaemonStatus> {
        self.status_tx.subscribe()
    }

    /// The bound listener address.
    pub fn local_addr(&self) -> Result<SocketAddr, DaemonError> {
        Ok(self.transport.local_addr()?)
    }

    fn identity(&self) -> LocalIdentity {
        LocalIdentity {
            peer_id: self.local_id,
            peer_name: self.local_name.clone(),
            screen_width: self.local_bounds.width as u32,
            screen_height: self.local_bounds.height as u32,
            encryption_enabled: self.settings.encryption_enabled,
        }
    }

    /// Run the daemon event loop until shutdown.
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        // Local screens and edge rules.
        let displays = self.displays.displays();
        self.local_bounds = combined_bounds(&displays);
        self.settings.arrangement.initialize_local_displays(&displays);
        self.tap
            .update_edge_rules(self.settings.edge_rules(self.local_bounds))
            .await?;

        // Capture pipeline.
        let (capture_tx, mut capture_rx) = mpsc::channel::<CaptureEvent>(4096);
        self.tap.start(capture_tx).await?;
        let capture_event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = capture_rx.recv().await {
                if capture_event_tx
                    .send(DaemonEvent::Capture(event))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        // Accept loop: every inbound connection gets its own handshake task.
        let transport = Arc::clone(&self.transport);
        let accept_event_tx = self.event_tx.clone();
        let identity = self.identity();
        let cipher = self.cipher.clone();
        tokio::spawn(async move {
            loop {
                match transport.accept().await {
                    Ok((stream, remote)) => {
                        let tx = accept_event_tx.clone();
                        let identity = identity.clone();
                        let cipher = cipher.clone();
                        tokio::spawn(async move {
                            match handshake::accept(stream, &identity, cipher).await {
                                Ok((sender, receiver, request)) => {
                                    let _ = tx
                                        .send(DaemonEvent::SessionEstablished {
                                            peer_id: request.peer_id,
                                            peer_name: request.peer_name,
                                            screen_width: request.screen_width,
                                            screen_height: request.screen_height,
                                            endpoint: remote,
                                            sender,
                                            receiver,
                                        })
                                        .await;
                                }
                                Err(e) => {
                                    warn!(remote = %remote, error = %e, "inbound handshake failed");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        debug!(error = %e, "accept error");
                    }
                }
            }
        });

        // Clipboard bridge.
        if self.settings.clipboard_sync_enabled {
            if let Some(provider) = self.clipboard.take() {
                self.clipboard_tx = Some(clipboard_bridge::spawn(provider, self.event_tx.clone()));
            }
        }

        info!(name = %self.local_name, id = %self.local_id, "daemon running");
        self.broadcast_status(StatusKind::Running);

        let mut batch_interval = tokio::time::interval(BATCH_FLUSH_INTERVAL);
        batch_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut heartbeat_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let failsafe_at = self
                .failsafe_deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(DaemonEvent::Shutdown) | None => break,
                        Some(event) => self.handle_event(event).await,
                    }
                }
                _ = batch_interval.tick() => {
                    self.flush_batch().await;
                }
                _ = heartbeat_interval.tick() => {
                    self.on_heartbeat_tick().await;
                }
                () = tokio::time::sleep_until(failsafe_at), if self.failsafe_deadline.is_some() => {
                    self.on_failsafe_expired().await;
                }
            }
        }

        self.shutdown().await
    }

    async fn handle_event(&mut self, event: DaemonEvent) {
        match event {
            DaemonEvent::Capture(capture) => self.handle_capture(capture).await,
            DaemonEvent::Discovery(discovery) => self.handle_discovery(discovery).await,
            DaemonEvent::SessionEstablished {
                peer_id,
                peer_name,
                screen_width,
                screen_height,
                endpoint,
                sender,
                receiver,
            } => {
                self.handle_session_established(
                    peer_id,
                    peer_name,
                    screen_width,
                    screen_height,
                    endpoint,
                    sender,
                    receiver,
                );
            }
            DaemonEvent::ConnectFailed { peer_id, reason } => {
                warn!(peer = %peer_id, reason = %reason, "connection attempt failed");
                self.registry.set_state(peer_id, PeerState::Error(reason));
                self.broadcast_current();
            }
            DaemonEvent::PeerPacket {
                peer_id,
                packet,
                sequence_gap,
            } => self.handle_peer_packet(peer_id, packet, sequence_gap).await,
            DaemonEvent::PeerDisconnected(peer_id) => self.handle_peer_disconnected(peer_id).await,
            DaemonEvent::ClipboardChanged(content) => self.broadcast_clipboard(content).await,
            DaemonEvent::RepositionPeerScreen { peer_id, x, y } => {
                if let Some(id) = self.settings.arrangement.screen_for_peer(peer_id).map(|s| s.id) {
                    self.settings.arrangement.update_position(id, x, y);
                    self.persist_settings();
                }
            }
            DaemonEvent::Shutdown => {}
        }
    }

    // -----------------------------------------------------------------
    // Capture
    // -----------------------------------------------------------------

    async fn handle_capture(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::EdgeReached { edge, x, y } => self.handle_edge_reached(edge, x, y).await,
            CaptureEvent::Input(timed) => self.handle_captured_input(timed).await,
            CaptureEvent::Escape => self.handle_escape().await,
        }
    }

    async fn handle_edge_reached(&mut self, edge: Edge, x: f64, y: f64) {
        if !matches!(self.state, ControlState::Local) {
            return;
        }
        if let Some(until) = self.cooldown_until {
            if Instant::now() < until {
                debug!(%edge, "edge arrival ignored during cooldown");
                return;
            }
            self.cooldown_until = None;
        }

        let Some(peer_id) = self.route_peer_for_edge(edge) else {
            return;
        };
        if !self.registry.is_connected(peer_id) {
            debug!(peer = %peer_id, %edge, "edge peer is not connected");
            return;
        }
        self.enter_controlling(peer_id, edge, x, y).await;
    }

    /// Arrangement lookup plus the auto-link policy: with exactly one
    /// connected peer and no link configured, an edge arrival binds that
    /// edge to that peer and persists the binding.
    fn route_peer_for_edge(&mut self, edge: Edge) -> Option<PeerId> {
        if let Some(peer_id) = self.settings.arrangement.peer_for_edge(edge) {
            return Some(peer_id);
        }
        if self.settings.arrangement.has_edge_links() {
            return None;
        }
        let connected = self.registry.connected_ids();
        if let [only] = connected[..] {
            info!(peer = %only, %edge, "auto-linking edge to the only connected peer");
            self.settings.arrangement.link_edge(edge, only);
            self.persist_settings();
            return Some(only);
        }
        None
    }

    async fn enter_controlling(&mut self, peer_id: PeerId, edge: Edge, x: f64, y: f64) {
        let (exit_position, entry_position) = self.crossing_positions(peer_id, edge, x, y);
        let entry_edge = edge.opposite();
        let (entry_x, entry_y) = match entry_edge {
            Edge::Left => (0.0, entry_position),
            Edge::Right => (1.0, entry_position),
            Edge::Top => (entry_position, 0.0),
            Edge::Bottom => (entry_position, 1.0),
        };

        info!(peer = %peer_id, %edge, exit_position, "crossing to remote");

        let _ = self.injector.set_cursor_visible(false).await;
        let _ = self.injector.park_cursor().await;
        if let Err(e) = self.tap.grab().await {
            warn!(error = %e, "failed to grab input, aborting crossing");
            let _ = self.injector.set_mouse_association(true).await;
            let _ = self.injector.set_cursor_visible(true).await;
            return;
        }

        let sent = match self.sessions.get_mut(&peer_id) {
            Some(session) => {
                session
                    .send_event(InputEvent::ScreenEnter {
                        edge: entry_edge,
                        entry_x,
                        entry_y,
                    })
                    .await
            }
            None => {
                warn!(peer = %peer_id, "no session for edge peer");
                let _ = self.tap.release().await;
                let _ = self.injector.set_mouse_association(true).await;
                let _ = self.injector.set_cursor_visible(true).await;
                return;
            }
        };
        if let Err(e) = sent {
            warn!(peer = %peer_id, error = %e, "failed to send enter");
            let _ = self.tap.release().await;
            let _ = self.injector.set_mouse_association(true).await;
            let _ = self.injector.set_cursor_visible(true).await;
            self.handle_peer_disconnected(peer_id).await;
            return;
        }

        self.batch.clear();
        self.state = ControlState::Controlling(ControllingSession {
            peer_id,
            exit_edge: edge,
            exit_position,
            awaiting_ack: true,
            failsafe_rearmed: false,
        });
        self.failsafe_deadline = Some(Instant::now() + FAILSAFE_TIMEOUT);
        self.registry.set_state(peer_id, PeerState::Controlling);
        let name = self.peer_name(peer_id);
        self.broadcast_status(StatusKind::Controlling { name });
    }

    /// Normalised exit position along the edge, and the matching entry
    /// position on the target screen.
    fn crossing_positions(&self, peer_id: PeerId, edge: Edge, x: f64, y: f64) -> (f64, f64) {
        let arrangement = &self.settings.arrangement;
        let route = arrangement.route_for_edge(edge);
        let source: Option<&ArrangedScreen> = route
            .map(|(source, _)| source)
            .or_else(|| arrangement.screens().iter().find(|s| s.is_local));
        let target: Option<&ArrangedScreen> = route
            .map(|(_, target)| target)
            .or_else(|| arrangement.screen_for_peer(peer_id));

        let exit_position = match source {
            Some(screen) => {
                if edge.is_vertical() {
                    ((y - screen.y) / screen.height).clamp(0.0, 1.0)
                } else {
                    ((x - screen.x) / screen.width).clamp(0.0, 1.0)
                }
            }
            None => 0.5,
        };

        let entry_position = match (source, target) {
            (Some(source), Some(target)) => {
                compute_entry_position(exit_position, source, target, edge)
            }
            // No geometry for the peer: carry the exit coordinate across.
            _ => exit_position,
        };
        (exit_position, entry_position)
    }

    async fn handle_captured_input(&mut self, timed: TimedEvent) {
        if !matches!(self.state, ControlState::Controlling(_)) {
            // Synthetic echoes while Controlled, or stray events while
            // Local: nothing to forward.
            return;
        }
        let flush_now = timed.event.forces_flush();
        self.batch.push(timed);
        if flush_now {
            self.flush_batch().await;
        }
    }

    async fn handle_escape(&mut self) {
        if matches!(self.state, ControlState::Controlling(_)) {
            info!("escape pressed, returning to local control");
            self.return_to_local(LeaveReason::Escape).await;
        }
    }

    async fn flush_batch(&mut self) {
        let ControlState::Controlling(ref ctl) = self.state else {
            self.batch.clear();
            return;
        };
        if self.batch.is_empty() {
            return;
        }
        let peer_id = ctl.peer_id;
        let events = self.batch.take();
        let result = match self.sessions.get_mut(&peer_id) {
            Some(session) => session.send_events(events).await,
            None => return,
        };
        match result {
            Ok(()) => {
                if let Some(peer) = self.registry.get_mut(peer_id) {
                    peer.link.packets_sent += 1;
                }
            }
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "send failed while controlling");
                self.handle_peer_disconnected(peer_id).await;
            }
        }
    }

    // -----------------------------------------------------------------
    // Controlling → Local
    // -----------------------------------------------------------------

    async fn return_to_local(&mut self, reason: LeaveReason) {
        let ControlState::Controlling(ctl) = std::mem::replace(&mut self.state, ControlState::Local)
        else {
            return;
        };

        self.failsafe_deadline = None;
        self.batch.clear();

        // Tell the peer we left, unless the link is already gone.
        if reason != LeaveReason::ConnectionLost {
            if let Some(session) = self.sessions.get_mut(&ctl.peer_id) {
                let _ = session
                    .send_event(InputEvent::ScreenLeave {
                        edge: ctl.exit_edge.opposite(),
                    })
                    .await;
            }
        }

        let _ = self.tap.release().await;
        let _ = self.injector.set_mouse_association(true).await;
        let _ = self
            .injector
            .warp_to_edge(ctl.exit_edge, ctl.exit_position)
            .await;
        let _ = self.injector.set_cursor_visible(true).await;
        self.cooldown_until = Some(Instant::now() + COOLDOWN);

        let name = self.peer_name(ctl.peer_id);
        match reason {
            LeaveReason::Escape => {
                self.registry.set_state(ctl.peer_id, PeerState::Connected);
                self.broadcast_status(StatusKind::EscapedToLocal);
            }
            LeaveReason::PeerReturned => {
                self.registry.set_state(ctl.peer_id, PeerState::Connected);
                self.broadcast_status(StatusKind::Running);
            }
            LeaveReason::ConnectionLost => {
                // The session may survive (silent peer); only the control
                // role is torn down here.
                if self.sessions.contains_key(&ctl.peer_id) {
                    self.registry.set_state(ctl.peer_id, PeerState::Connected);
                }
                self.broadcast_status(StatusKind::LostConnection { name });
            }
        }
    }

    // -----------------------------------------------------------------
    // Receive pipeline
    // -----------------------------------------------------------------

    async fn handle_peer_packet(&mut self, peer_id: PeerId, packet: InputPacket, gap: u64) {
        self.registry.touch(peer_id, gap);

        for timed in packet.events {
            if timed.event.is_meta() {
                self.handle_meta_event(peer_id, timed.event).await;
                continue;
            }

            let ControlState::Controlled(ref mut session) = self.state else {
                debug!(peer = %peer_id, "dropping input event outside Controlled state");
                continue;
            };
            if session.peer_id != peer_id {
                warn!(peer = %peer_id, "input from a peer that is not controlling us");
                continue;
            }

            let outcome = match &timed.event {
                InputEvent::MouseMove { dx, dy, .. } | InputEvent::MouseDrag { dx, dy, .. } => {
                    session.tracker.apply_delta(f64::from(*dx), f64::from(*dy))
                }
                _ => ReturnOutcome::Stay,
            };

            if let Err(e) = self.injector.inject(timed.event).await {
                warn!(error = %e, "failed to inject event");
            }

            if outcome == ReturnOutcome::Return {
                self.finish_controlled_return().await;
            }
        }
    }

    async fn handle_meta_event(&mut self, peer_id: PeerId, event: InputEvent) {
        match event {
            InputEvent::ScreenEnter {
                edge,
                entry_x,
                entry_y,
            } => self.handle_screen_enter(peer_id, edge, entry_x, entry_y).await,
            InputEvent::ScreenEnterAck { .. } => {
                if let ControlState::Controlling(ref mut ctl) = self.state {
                    if ctl.peer_id == peer_id && ctl.awaiting_ack {
                        debug!(peer = %peer_id, "enter acknowledged");
                        ctl.awaiting_ack = false;
                        self.failsafe_deadline = None;
                    }
                }
            }
            InputEvent::ScreenLeave { .. } => self.handle_screen_leave(peer_id).await,
            InputEvent::Heartbeat => {
                // last_seen already refreshed for the whole packet.
            }
            InputEvent::ClipboardUpdate { format, data } => {
                self.apply_remote_clipboard(peer_id, format, data).await;
            }
            _ => {}
        }
    }

    async fn handle_screen_enter(&mut self, peer_id: PeerId, edge: Edge, entry_x: f64, entry_y: f64) {
        if !matches!(self.state, ControlState::Local) {
            warn!(peer = %peer_id, "ScreenEnter while already in a session, ignoring");
            return;
        }
        if !self.registry.is_connected(peer_id) {
            warn!(peer = %peer_id, "ScreenEnter from unconnected peer, ignoring");
            return;
        }

        let relative = if edge.is_vertical() { entry_y } else { entry_x };
        info!(peer = %peer_id, %edge, relative, "peer took control");

        // Grab first so the synthetic cursor cannot re-trigger our edges.
        if let Err(e) = self.tap.grab().await {
            warn!(error = %e, "failed to grab input for controlled session");
            return;
        }
        let _ = self.injector.warp_to_edge(edge, relative).await;
        let _ = self.injector.set_cursor_visible(true).await;

        let (start_x, start_y) = edge_warp_point(&self.local_bounds, edge, relative);
        let tracker = ReturnEdgeTracker::new(edge, self.local_bounds, start_x, start_y);
        self.state = ControlState::Controlled(ControlledSession {
            peer_id,
            entry_edge: edge,
            tracker,
        });

        if let Some(session) = self.sessions.get_mut(&peer_id) {
            if let Err(e) = session
                .send_event(InputEvent::ScreenEnterAck { edge })
                .await
            {
                warn!(peer = %peer_id, error = %e, "failed to acknowledge enter");
            }
        }

        self.registry.set_state(peer_id, PeerState::Controlled);
        let name = self.peer_name(peer_id);
        self.broadcast_status(StatusKind::ControlledBy { name });
    }

    async fn handle_screen_leave(&mut self, peer_id: PeerId) {
        match &self.state {
            ControlState::Controlling(ctl) if ctl.peer_id == peer_id => {
                // The controlled host saw the cursor cross back.
                self.return_to_local(LeaveReason::PeerReturned).await;
            }
            ControlState::Controlled(session) if session.peer_id == peer_id => {
                info!(peer = %peer_id, "controller released us");
                let _ = self.tap.release().await;
                self.state = ControlState::Local;
                self.registry.set_state(peer_id, PeerState::Connected);
                self.broadcast_status(StatusKind::Running);
            }
            _ => {}
        }
    }

    /// Controlled host: the synthetic cursor crossed back over the entry
    /// edge; hand control back to the peer.
    async fn finish_controlled_return(&mut self) {
        let ControlState::Controlled(session) =
            std::mem::replace(&mut self.state, ControlState::Local)
        else {
            return;
        };

        info!(peer = %session.peer_id, "cursor returned through entry edge");
        if let Some(peer_session) = self.sessions.get_mut(&session.peer_id) {
            let _ = peer_session
                .send_event(InputEvent::ScreenLeave {
                    edge: session.entry_edge,
                })
                .await;
        }
        let _ = self.tap.release().await;
        self.registry
            .set_state(session.peer_id, PeerState::Connected);
        self.broadcast_status(StatusKind::Running);
    }

    // -----------------------------------------------------------------
    // Clipboard
    // -----------------------------------------------------------------

    async fn broadcast_clipboard(&mut self, content: ClipboardContent) {
        if content.size() > MAX_CLIPBOARD_SIZE {
            return;
        }
        let event = InputEvent::ClipboardUpdate {
            format: content.format,
            data: content.data,
        };
        let mut failed = Vec::new();
        for (peer_id, session) in &mut self.sessions {
            if let Err(e) = session.send_event(event.clone()).await {
                warn!(peer = %peer_id, error = %e, "clipboard broadcast failed");
                failed.push(*peer_id);
            }
        }
        for peer_id in failed {
            self.handle_peer_disconnected(peer_id).await;
        }
    }

    async fn apply_remote_clipboard(
        &mut self,
        peer_id: PeerId,
        format: ClipboardFormat,
        data: Vec<u8>,
    ) {
        if data.len() > MAX_CLIPBOARD_SIZE {
            warn!(peer = %peer_id, size = data.len(), "dropping oversized clipboard update");
            return;
        }
        if let Some(tx) = &self.clipboard_tx {
            let _ = tx
                .send(ClipboardCommand::Apply(ClipboardContent { format, data }))
                .await;
        }
    }

    // -----------------------------------------------------------------
    // Sessions and discovery
    // -----------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn handle_session_established(
        &mut self,
        peer_id: PeerId,
        peer_name: String,
        screen_width: u32,
        screen_height: u32,
        endpoint: SocketAddr,
        sender: MessageSender,
        receiver: MessageReceiver,
    ) {
        if self.sessions.contains_key(&peer_id) {
            // Simultaneous connect from both sides; keep the existing one.
            debug!(peer = %peer_name, "duplicate session, dropping the new connection");
            return;
        }

        self.registry
            .upsert_connected(peer_id, &peer_name, endpoint, screen_width, screen_height);
        self.settings.arrangement.update_remote_screen(
            peer_id,
            &peer_name,
            f64::from(screen_width),
            f64::from(screen_height),
        );

        self.sessions
            .insert(peer_id, PeerSession::new(peer_id, peer_name.clone(), sender));
        spawn_reader(peer_id, receiver, self.event_tx.clone());

        info!(peer = %peer_name, id = %peer_id, "session established");
        self.broadcast_current();
    }

    async fn handle_discovery(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::PeerFound(discovered) | DiscoveryEvent::PeerUpdated(discovered) => {
                let peer_id = discovered.peer_id;
                self.registry.upsert_discovered(&discovered);
                let should_connect = self.settings.auto_connect
                    && !self.sessions.contains_key(&peer_id)
                    && self.registry.get(peer_id).is_some_and(|p| {
                        matches!(
                            p.state,
                            PeerState::Discovered | PeerState::Disconnected | PeerState::Error(_)
                        )
                    });
                if should_connect {
                    self.registry.set_state(peer_id, PeerState::Connecting);
                    self.broadcast_status(StatusKind::Connecting {
                        name: discovered.name.clone(),
                    });
                    self.spawn_connect(peer_id, discovered.endpoint);
                }
            }
            DiscoveryEvent::PeerLost { name } => {
                let Some(peer) = self.registry.find_by_name(&name) else {
                    return;
                };
                let peer_id = peer.id;
                // A peer with a live transport survives a withdrawn record.
                if !self.sessions.contains_key(&peer_id) {
                    debug!(peer = %name, "discovery record withdrawn, removing peer");
                    self.registry.remove(peer_id);
                    self.prune_arrangement();
                    self.broadcast_current();
                }
            }
        }
    }

    fn spawn_connect(&self, peer_id: PeerId, endpoint: SocketAddr) {
        let identity = self.identity();
        let cipher = self.cipher.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = async {
                let stream = TcpTransport::connect(endpoint).await?;
                handshake::initiate(stream, &identity, cipher).await
            }
            .await;
            let event = match result {
                Ok((sender, receiver, response)) => DaemonEvent::SessionEstablished {
                    peer_id: response.peer_id,
                    peer_name: response.peer_name,
                    screen_width: response.screen_width,
                    screen_height: response.screen_height,
                    endpoint,
                    sender,
                    receiver,
                },
                Err(e) => DaemonEvent::ConnectFailed {
                    peer_id,
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(event).await;
        });
    }

    async fn handle_peer_disconnected(&mut self, peer_id: PeerId) {
        if self.sessions.remove(&peer_id).is_none() && self.registry.get(peer_id).is_none() {
            return;
        }
        let name = self.peer_name(peer_id);
        info!(peer = %name, "peer disconnected");

        match &self.state {
            ControlState::Controlling(ctl) if ctl.peer_id == peer_id => {
                self.return_to_local(LeaveReason::ConnectionLost).await;
            }
            ControlState::Controlled(session) if session.peer_id == peer_id => {
                let _ = self.tap.release().await;
                self.state = ControlState::Local;
                self.broadcast_status(StatusKind::LostConnection { name: name.clone() });
            }
            _ => {}
        }

        // In Local the peer entry is cleared; re-discovery recreates it.
        self.registry.remove(peer_id);
        self.prune_arrangement();
        self.broadcast_current();
    }

    fn prune_arrangement(&mut self) {
        let connected = self.registry.connected_ids().into_iter().collect();
        self.settings
            .arrangement
            .remove_stale_remote_screens(&connected);
    }

    // -----------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------

    async fn on_heartbeat_tick(&mut self) {
        let mut failed = Vec::new();
        for (peer_id, session) in &mut self.sessions {
            if let Err(e) = session.send_event(InputEvent::Heartbeat).await {
                debug!(peer = %peer_id, error = %e, "heartbeat failed");
                failed.push(*peer_id);
            } else if let Some(peer) = self.registry.get_mut(*peer_id) {
                peer.link.packets_sent += 1;
            }
        }
        for peer_id in failed {
            self.handle_peer_disconnected(peer_id).await;
        }

        // Silence threshold while Controlling.
        if let ControlState::Controlling(ref ctl) = self.state {
            let silent = self
                .registry
                .get(ctl.peer_id)
                .is_none_or(|p| p.last_seen.elapsed() > CONTROLLING_SILENCE);
            if silent {
                warn!(peer = %ctl.peer_id, "peer silent beyond threshold, returning to local");
                self.return_to_local(LeaveReason::ConnectionLost).await;
            }
        }
    }

    async fn on_failsafe_expired(&mut self) {
        let ControlState::Controlling(ref mut ctl) = self.state else {
            self.failsafe_deadline = None;
            return;
        };

        let stale = self
            .registry
            .get(ctl.peer_id)
            .is_none_or(|p| p.last_seen.elapsed() >= FAILSAFE_TIMEOUT);

        if stale {
            warn!(peer = %ctl.peer_id, "failsafe expired with a stale peer");
            self.return_to_local(LeaveReason::ConnectionLost).await;
        } else if ctl.awaiting_ack && !ctl.failsafe_rearmed {
            // The peer is alive but has not acknowledged yet; wait one more
            // window.
            ctl.failsafe_rearmed = true;
            self.failsafe_deadline = Some(Instant::now() + FAILSAFE_TIMEOUT);
        } else if ctl.awaiting_ack {
            warn!(peer = %ctl.peer_id, "no enter acknowledgement, returning to local");
            self.return_to_local(LeaveReason::ConnectionLost).await;
        } else {
            self.failsafe_deadline = None;
        }
    }

    // -----------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------

    fn peer_name(&self, peer_id: PeerId) -> String {
        self.registry
            .get(peer_id)
            .map_or_else(|| peer_id.to_string(), |p| p.name.clone())
    }

    fn broadcast_status(&self, kind: StatusKind) {
        let (controlling, controlled_by) = match &self.state {
            ControlState::Local => (None, None),
            ControlState::Controlling(ctl) => (Some(ctl.peer_id), None),
            ControlState::Controlled(session) => (None, Some(session.peer_id)),
        };
        let _ = self.status_tx.send(DaemonStatus {
            kind,
            controlling,
            controlled_by,
            session_count: self.sessions.len(),
        });
    }

    /// Re-broadcast with the current state's default status text.
    fn broadcast_current(&self) {
        let kind = match &self.state {
            ControlState::Local => StatusKind::Running,
            ControlState::Controlling(ctl) => StatusKind::Controlling {
                name: self.peer_name(ctl.peer_id),
            },
            ControlState::Controlled(session) => StatusKind::ControlledBy {
                name: self.peer_name(session.peer_id),
            },
        };
        self.broadcast_status(kind);
    }

    fn persist_settings(&self) {
        let Some(path) = &self.settings_path else {
            return;
        };
        if let Err(e) = save_settings(&self.settings, Some(path)) {
            warn!(error = %e, "failed to persist settings");
        }
    }

    // -----------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------

    async fn shutdown(&mut self) -> Result<(), DaemonError> {
        info!("daemon shutting down");

        if matches!(self.state, ControlState::Controlling(_)) {
            self.return_to_local(LeaveReason::Escape).await;
        }
        self.sessions.clear();

        self.tap.shutdown().await?;
        self.injector.shutdown().await?;

        info!("daemon shut down complete");
        Ok(())
    }
}
