//! Connection hub: the single owner of live connection membership
//!
//! The hub runs as one task. Producers never touch its maps; they submit
//! intents through a [`HubHandle`] and the loop applies them one at a time.

use log::{debug, info, trace, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::config::HubConfig;
use crate::core::connection::{Connection, Delivery};
use crate::core::envelope::{BroadcastRequest, Envelope, Event, Scope};
use crate::error::{Result, RustyHubError};

/// Snapshot of hub membership and delivery counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub workspaces: usize,
    pub users: usize,
    pub scoped_channels: usize,
    pub delivered: u64,
    pub dropped: u64,
    pub evicted: u64,
}

#[derive(Debug)]
enum ScopeCommand {
    Scope { connection_id: Uuid, channel_id: i64 },
    Unscope { connection_id: Uuid, channel_id: i64 },
}

/// Cloneable submission side of the hub
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<Arc<Connection>>,
    unregister_tx: mpsc::UnboundedSender<Uuid>,
    scope_tx: mpsc::UnboundedSender<ScopeCommand>,
    broadcast_tx: mpsc::UnboundedSender<BroadcastRequest>,
    stats: watch::Receiver<HubStats>,
}

impl HubHandle {
    /// Submit a pending connection for registration
    pub fn register(&self, connection: Arc<Connection>) -> Result<()> {
        self.register_tx
            .send(connection)
            .map_err(|_| RustyHubError::HubUnavailable)
    }

    /// Submit removal of a connection; unknown ids are ignored by the hub
    pub fn unregister(&self, connection_id: Uuid) -> Result<()> {
        self.unregister_tx
            .send(connection_id)
            .map_err(|_| RustyHubError::HubUnavailable)
    }

    /// Submit a fan-out request
    pub fn broadcast(&self, request: BroadcastRequest) -> Result<()> {
        self.broadcast_tx
            .send(request)
            .map_err(|_| RustyHubError::HubUnavailable)
    }

    /// Restrict broadcasts for `channel_id` to explicitly scoped connections,
    /// adding this one
    pub fn scope_channel(&self, connection_id: Uuid, channel_id: i64) -> Result<()> {
        self.scope_tx
            .send(ScopeCommand::Scope {
                connection_id,
                channel_id,
            })
            .map_err(|_| RustyHubError::HubUnavailable)
    }

    pub fn unscope_channel(&self, connection_id: Uuid, channel_id: i64) -> Result<()> {
        self.scope_tx
            .send(ScopeCommand::Unscope {
                connection_id,
                channel_id,
            })
            .map_err(|_| RustyHubError::HubUnavailable)
    }

    /// Latest published statistics
    pub fn stats(&self) -> HubStats {
        self.stats.borrow().clone()
    }

    /// Watch statistics as the hub publishes them
    pub fn subscribe_stats(&self) -> watch::Receiver<HubStats> {
        self.stats.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.broadcast_tx.is_closed()
    }
}

/// Hub state, owned by its command loop
pub struct Hub {
    config: HubConfig,
    connections: HashMap<Uuid, Arc<Connection>>,
    workspaces: HashMap<i64, HashSet<Uuid>>,
    channels: HashMap<i64, HashSet<Uuid>>,
    // Channels each connection is scoped to, so removal only visits those
    scoped: HashMap<Uuid, HashSet<i64>>,
    // Ordered by registration time, oldest first
    users: HashMap<i64, Vec<Uuid>>,
    delivered: u64,
    dropped: u64,
    evicted: u64,
    register_rx: mpsc::UnboundedReceiver<Arc<Connection>>,
    unregister_rx: mpsc::UnboundedReceiver<Uuid>,
    scope_rx: mpsc::UnboundedReceiver<ScopeCommand>,
    broadcast_rx: mpsc::UnboundedReceiver<BroadcastRequest>,
    stats_tx: watch::Sender<HubStats>,
}

impl Hub {
    /// Create a hub and the handle used to feed it
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (scope_tx, scope_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats) = watch::channel(HubStats::default());

        let hub = Self {
            config,
            connections: HashMap::new(),
            workspaces: HashMap::new(),
            channels: HashMap::new(),
            scoped: HashMap::new(),
            users: HashMap::new(),
            delivered: 0,
            dropped: 0,
            evicted: 0,
            register_rx,
            unregister_rx,
            scope_rx,
            broadcast_rx,
            stats_tx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            scope_tx,
            broadcast_tx,
            stats,
        };
        (hub, handle)
    }

    /// Process commands until every handle is dropped
    pub async fn run(mut self) {
        info!(
            "Hub started (max {} connections per user)",
            self.config.max_connections_per_user
        );

        loop {
            // Membership changes win over broadcasts so a producer that
            // registers and then broadcasts is observed in that order.
            tokio::select! {
                biased;
                Some(connection) = self.register_rx.recv() => self.register(connection),
                Some(connection_id) = self.unregister_rx.recv() => self.unregister(connection_id),
                Some(command) = self.scope_rx.recv() => self.apply_scope(command),
                Some(request) = self.broadcast_rx.recv() => self.broadcast(request),
                else => break,
            }
            self.publish_stats();
        }

        let remaining: Vec<Uuid> = self.connections.keys().copied().collect();
        for connection_id in remaining {
            self.remove(connection_id);
        }
        self.publish_stats();
        info!("Hub stopped");
    }

    fn register(&mut self, connection: Arc<Connection>) {
        let connection_id = connection.id();
        let user_id = connection.user_id();
        let workspace_id = connection.workspace_id();

        if self.connections.contains_key(&connection_id) {
            debug!("Connection {} already registered, ignoring", connection_id);
            return;
        }
        if !connection.mark_registered() {
            warn!(
                "Refusing to register connection {} in state {:?}",
                connection_id,
                connection.state()
            );
            return;
        }

        let cap = self.config.max_connections_per_user.max(1);
        while let Some(oldest) = self
            .users
            .get(&user_id)
            .filter(|list| list.len() >= cap)
            .and_then(|list| list.first().copied())
        {
            info!(
                "User {} reached {} connections, evicting oldest connection {}",
                user_id, cap, oldest
            );
            self.remove(oldest);
            self.evicted += 1;
        }

        self.connections.insert(connection_id, Arc::clone(&connection));
        self.workspaces
            .entry(workspace_id)
            .or_default()
            .insert(connection_id);
        self.users.entry(user_id).or_default().push(connection_id);

        let welcome = Envelope::stamp(
            Event::ConnectionEstablished {
                connection_id,
                user: connection.user().as_ref().clone(),
            },
            Scope::user(workspace_id, user_id),
        );
        match connection.try_send(Arc::new(welcome)) {
            Delivery::Queued => {
                info!(
                    "Connection {} registered for user {} in workspace {} ({} live)",
                    connection_id,
                    user_id,
                    workspace_id,
                    self.connections.len()
                );
            }
            outcome => {
                warn!(
                    "Could not queue welcome for connection {} ({:?}), rolling back registration",
                    connection_id, outcome
                );
                self.remove(connection_id);
            }
        }
    }

    fn unregister(&mut self, connection_id: Uuid) {
        match self.remove(connection_id) {
            Some(connection) => info!(
                "Connection {} unregistered for user {} after {:?} ({} live)",
                connection_id,
                connection.user_id(),
                connection.connection_duration(),
                self.connections.len()
            ),
            None => debug!("Connection {} already unregistered", connection_id),
        }
    }

    /// Take a connection out of every index and close its queue
    fn remove(&mut self, connection_id: Uuid) -> Option<Arc<Connection>> {
        let connection = self.connections.remove(&connection_id)?;

        if let Some(members) = self.workspaces.get_mut(&connection.workspace_id()) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.workspaces.remove(&connection.workspace_id());
            }
        }

        if let Some(list) = self.users.get_mut(&connection.user_id()) {
            list.retain(|id| *id != connection_id);
            if list.is_empty() {
                self.users.remove(&connection.user_id());
            }
        }

        for channel_id in self.scoped.remove(&connection_id).unwrap_or_default() {
            self.leave_channel(connection_id, channel_id);
        }

        connection.close();
        Some(connection)
    }

    fn apply_scope(&mut self, command: ScopeCommand) {
        match command {
            ScopeCommand::Scope {
                connection_id,
                channel_id,
            } => {
                if !self.connections.contains_key(&connection_id) {
                    debug!(
                        "Ignoring channel {} scope for unknown connection {}",
                        channel_id, connection_id
                    );
                    return;
                }
                self.channels
                    .entry(channel_id)
                    .or_default()
                    .insert(connection_id);
                self.scoped
                    .entry(connection_id)
                    .or_default()
                    .insert(channel_id);
            }
            ScopeCommand::Unscope {
                connection_id,
                channel_id,
            } => {
                if let Some(channels) = self.scoped.get_mut(&connection_id) {
                    channels.remove(&channel_id);
                    if channels.is_empty() {
                        self.scoped.remove(&connection_id);
                    }
                }
                self.leave_channel(connection_id, channel_id);
            }
        }
    }

    fn leave_channel(&mut self, connection_id: Uuid, channel_id: i64) {
        if let Some(members) = self.channels.get_mut(&channel_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.channels.remove(&channel_id);
            }
        }
    }

    /// Resolve the target connections for a scope
    fn targets(&self, scope: &Scope) -> Vec<Uuid> {
        let ids: Vec<Uuid> = if let Some(user_id) = scope.user_id {
            self.users.get(&user_id).cloned().unwrap_or_default()
        } else if let Some(members) = scope.channel_id.and_then(|id| self.channels.get(&id)) {
            members.iter().copied().collect()
        } else {
            // Channel broadcasts without explicit scoping reach the whole workspace
            self.workspaces
                .get(&scope.workspace_id)
                .map(|members| members.iter().copied().collect())
                .unwrap_or_default()
        };

        ids.into_iter()
            .filter(|id| Some(*id) != scope.exclude_connection)
            .collect()
    }

    fn broadcast(&mut self, request: BroadcastRequest) {
        let kind = request.event.kind();
        let targets = self.targets(&request.scope);
        if targets.is_empty() {
            trace!("No recipients for {} in {:?}", kind, request.scope);
            return;
        }

        let envelope = Arc::new(Envelope::stamp(request.event, request.scope));
        let mut delivered = 0usize;
        for connection_id in targets {
            let Some(connection) = self.connections.get(&connection_id) else {
                continue;
            };
            match connection.try_send(Arc::clone(&envelope)) {
                Delivery::Queued => delivered += 1,
                Delivery::Full => {
                    self.dropped += 1;
                    warn!(
                        "Dropped {} for slow connection {} (user {})",
                        kind,
                        connection_id,
                        connection.user_id()
                    );
                }
                Delivery::Closed => {
                    debug!("Connection {} closed before {} could be queued", connection_id, kind);
                }
            }
        }
        self.delivered += delivered as u64;
        debug!("Broadcast {} to {} connections", kind, delivered);
    }

    fn publish_stats(&self) {
        self.stats_tx.send_replace(HubStats {
            connections: self.connections.len(),
            workspaces: self.workspaces.len(),
            users: self.users.len(),
            scoped_channels: self.channels.len(),
            delivered: self.delivered,
            dropped: self.dropped,
            evicted: self.evicted,
        });
    }
}

/// Spawn a hub on the current runtime and return its handle
pub fn spawn_hub(config: HubConfig) -> HubHandle {
    let (hub, handle) = Hub::new(config);
    tokio::spawn(hub.run());
    handle
}
