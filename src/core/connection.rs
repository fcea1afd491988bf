//! WebSocket connection management
//! Handles the identity, outbound queue and lifecycle of one client session

use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::auth::user::UserProfile;
use crate::core::envelope::Envelope;

/// Receiving half of a connection's outbound queue, drained by the writer pump
pub type OutboundQueue = mpsc::Receiver<Arc<Envelope>>;

/// Lifecycle of a connection as tracked by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Registered,
    Unregistered,
}

/// Outcome of offering an envelope to a connection's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Full,
    Closed,
}

struct Outbound {
    state: ConnectionState,
    // The only sender of the queue; dropping it is what ends the writer pump.
    sender: Option<mpsc::Sender<Arc<Envelope>>>,
}

/// Represents the state of a single WebSocket connection
pub struct Connection {
    id: Uuid,
    workspace_id: i64,
    user: Arc<UserProfile>,
    connected_at: Instant,
    outbound: Mutex<Outbound>,
}

impl Connection {
    /// Create a pending connection and the queue its writer pump will drain
    pub fn new(
        user: impl Into<Arc<UserProfile>>,
        workspace_id: i64,
        queue_capacity: usize,
    ) -> (Arc<Self>, OutboundQueue) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let connection = Arc::new(Self {
            id: Uuid::new_v4(),
            workspace_id,
            user: user.into(),
            connected_at: Instant::now(),
            outbound: Mutex::new(Outbound {
                state: ConnectionState::Pending,
                sender: Some(sender),
            }),
        });
        (connection, receiver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn workspace_id(&self) -> i64 {
        self.workspace_id
    }

    pub fn user_id(&self) -> i64 {
        self.user.id
    }

    pub fn user(&self) -> &Arc<UserProfile> {
        &self.user
    }

    fn outbound(&self) -> MutexGuard<'_, Outbound> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.outbound().state
    }

    /// Move from pending to registered; returns false if the connection was
    /// not pending
    pub(crate) fn mark_registered(&self) -> bool {
        let mut outbound = self.outbound();
        if outbound.state != ConnectionState::Pending {
            return false;
        }
        outbound.state = ConnectionState::Registered;
        true
    }

    /// Offer an envelope without waiting for queue space
    pub fn try_send(&self, envelope: Arc<Envelope>) -> Delivery {
        let outbound = self.outbound();
        let Some(sender) = outbound.sender.as_ref() else {
            return Delivery::Closed;
        };
        match sender.try_send(envelope) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Close the outbound queue. Already queued envelopes are still drained by
    /// the writer, which then exits. Safe to call more than once.
    pub fn close(&self) {
        let mut outbound = self.outbound();
        if outbound.sender.take().is_some() {
            debug!("Closed outbound queue of connection {}", self.id);
        }
        outbound.state = ConnectionState::Unregistered;
    }

    pub fn is_closed(&self) -> bool {
        self.outbound().sender.is_none()
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user.id)
            .field("workspace_id", &self.workspace_id)
            .field("state", &self.state())
            .finish()
    }
}
