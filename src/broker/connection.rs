//! Per-connection outbound channel
//!
//! The broker never touches sockets. Each connection gets a channel; the
//! transport that owns the socket drains the receiving half.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::registry::{ClientId, SessionId};

/// A published message routed to one subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: Arc<str>,
    pub payload: Bytes,
}

/// Why a delivery could not be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Bounded channel is at capacity
    Full,
    /// Receiving half was dropped
    Closed,
}

/// Sending half, held in the broker's connection table
#[derive(Debug, Clone)]
pub(crate) enum Outbound {
    Bounded(mpsc::Sender<Delivery>),
    Unbounded(mpsc::UnboundedSender<Delivery>),
}

impl Outbound {
    pub(crate) fn try_send(&self, delivery: Delivery) -> Result<(), DeliveryFailure> {
        match self {
            Outbound::Bounded(tx) => tx.try_send(delivery).map_err(|e| match e {
                TrySendError::Full(_) => DeliveryFailure::Full,
                TrySendError::Closed(_) => DeliveryFailure::Closed,
            }),
            Outbound::Unbounded(tx) => tx.send(delivery).map_err(|_| DeliveryFailure::Closed),
        }
    }
}

#[derive(Debug)]
enum Inbox {
    Bounded(mpsc::Receiver<Delivery>),
    Unbounded(mpsc::UnboundedReceiver<Delivery>),
}

/// Create a channel pair. A capacity of 0 means unbounded.
fn channel(capacity: usize) -> (Outbound, Inbox) {
    if capacity == 0 {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbound::Unbounded(tx), Inbox::Unbounded(rx))
    } else {
        let (tx, rx) = mpsc::channel(capacity);
        (Outbound::Bounded(tx), Inbox::Bounded(rx))
    }
}

/// Entry in the broker's connection table
#[derive(Debug)]
pub(crate) struct ConnectionEntry {
    pub(crate) session: SessionId,
    pub(crate) outbound: Outbound,
}

/// Handle returned to the transport on connect
#[derive(Debug)]
pub struct Connection {
    session: SessionId,
    client: ClientId,
    inbox: Inbox,
}

impl Connection {
    pub(crate) fn new(session: SessionId, client: ClientId, capacity: usize) -> (Self, Outbound) {
        let (outbound, inbox) = channel(capacity);
        (
            Self {
                session,
                client,
                inbox,
            },
            outbound,
        )
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn client(&self) -> &ClientId {
        &self.client
    }

    /// Wait for the next delivery. Returns `None` once the broker drops the
    /// sending half (disconnect, takeover or shutdown).
    pub async fn recv(&mut self) -> Option<Delivery> {
        match &mut self.inbox {
            Inbox::Bounded(rx) => rx.recv().await,
            Inbox::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Take a delivery if one is queued
    pub fn try_recv(&mut self) -> Option<Delivery> {
        match &mut self.inbox {
            Inbox::Bounded(rx) => rx.try_recv().ok(),
            Inbox::Unbounded(rx) => rx.try_recv().ok(),
        }
    }
}
