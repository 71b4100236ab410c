//! Broker Core
//!
//! Drives the registry on behalf of the connection layer:
//! - connect: allocate a session, record it, open an outbound channel
//! - disconnect: drop the channel, release the session's subscriptions
//! - subscribe / unsubscribe: forward topic batches to the registry
//! - publish: snapshot the subscribers of a topic and queue the payload
//!   on each subscriber's channel
//!
//! Wire framing and socket I/O belong to the transport that owns each
//! [`Connection`]; nothing here blocks on I/O.

mod connection;
mod router;

pub use connection::{Connection, Delivery, DeliveryFailure};
pub use router::{MessageRouter, RouteError};

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::Ref;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::registry::{ClientId, Registry, SessionId};
use connection::ConnectionEntry;

#[cfg(test)]
mod tests;

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Per-connection outbound channel capacity (0 = unbounded)
    pub outbound_channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            outbound_channel_capacity: 1024,
        }
    }
}

/// Broker error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Operation requested for a client with no live connection
    UnknownClient(ClientId),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::UnknownClient(client) => write!(f, "Unknown client: {}", client),
        }
    }
}

impl std::error::Error for BrokerError {}

/// Result of a single publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Subscribers whose channel accepted the message
    pub delivered: usize,
    /// Subscribers that were gone or whose channel was full
    pub dropped: usize,
}

/// The pub/sub broker
pub struct Broker {
    config: BrokerConfig,
    registry: Arc<Registry>,
    /// Live connections (client id -> outbound channel)
    connections: Arc<DashMap<ClientId, ConnectionEntry>>,
    router: MessageRouter,
    metrics: Option<Arc<Metrics>>,
}

impl Broker {
    /// Create a broker with its own registry
    pub fn new(config: BrokerConfig) -> Self {
        Self::with_registry(Arc::new(Registry::new()), config)
    }

    /// Create a broker around an existing registry
    pub fn with_registry(registry: Arc<Registry>, config: BrokerConfig) -> Self {
        let connections = Arc::new(DashMap::new());
        Self {
            config,
            registry,
            router: MessageRouter::new(connections.clone()),
            connections,
            metrics: None,
        }
    }

    /// Attach metrics collection
    pub fn set_metrics(&mut self, metrics: Arc<Metrics>) {
        self.metrics = Some(metrics);
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Register a new connection for `client`
    ///
    /// If the client is already connected the old connection is taken over:
    /// its channel is closed and its session forgotten. Subscriptions are
    /// keyed by client and carry over.
    pub fn connect(&self, client: ClientId) -> Connection {
        let session = SessionId::next();
        let (connection, outbound) =
            Connection::new(session, client.clone(), self.config.outbound_channel_capacity);

        self.registry.add_session(session);
        let previous = self
            .connections
            .insert(client.clone(), ConnectionEntry { session, outbound });

        match previous {
            Some(previous) => {
                info!(
                    "Client {} reconnected, taking over {}",
                    client, previous.session
                );
                self.registry.remove_session(previous.session);
            }
            None => {
                if let Some(ref m) = self.metrics {
                    m.client_connected();
                }
            }
        }

        debug!("Client {} connected as {}", client, session);
        connection
    }

    /// Tear down a connection
    ///
    /// A session that was already taken over only loses its registry entry;
    /// the live connection and its subscriptions stay intact.
    ///
    /// The connection entry stays locked until the registry is released, so
    /// a subscribe for this client either lands before the cleanup or sees
    /// the client as gone.
    pub fn disconnect(&self, session: SessionId, client: &ClientId) {
        match self.connections.entry(client.clone()) {
            Entry::Occupied(entry) if entry.get().session == session => {
                let dropped = self.registry.release(session, client);
                entry.remove();
                if let Some(ref m) = self.metrics {
                    m.client_disconnected();
                }
                debug!(
                    "Client {} disconnected ({}, {} subscriptions dropped)",
                    client,
                    session,
                    dropped.len()
                );
            }
            _ => {
                self.registry.remove_session(session);
                debug!("Stale session {} for {} removed", session, client);
            }
        }
    }

    /// Lock the connection entry of `client` for the duration of a registry call
    fn connected(
        &self,
        client: &ClientId,
    ) -> Result<Ref<'_, ClientId, ConnectionEntry>, BrokerError> {
        self.connections
            .get(client)
            .ok_or_else(|| BrokerError::UnknownClient(client.clone()))
    }

    /// Subscribe a connected client to a batch of topics
    pub fn subscribe<I, T>(&self, client: &ClientId, topics: I) -> Result<(), BrokerError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let _conn = self.connected(client)?;
        self.registry.subscribe(topics, client);
        if let Some(ref m) = self.metrics {
            m.subscribe_total.inc();
        }
        Ok(())
    }

    /// Unsubscribe a connected client from a batch of topics
    pub fn unsubscribe<I, T>(&self, client: &ClientId, topics: I) -> Result<(), BrokerError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let _conn = self.connected(client)?;
        self.registry.unsubscribe(topics, client);
        if let Some(ref m) = self.metrics {
            m.unsubscribe_total.inc();
        }
        Ok(())
    }

    /// Fan a payload out to the current subscribers of `topic`
    ///
    /// The subscriber set is a snapshot: a client that unsubscribes
    /// concurrently may still receive this message.
    pub fn publish(&self, topic: &str, payload: Bytes) -> PublishOutcome {
        let subscribers = self.registry.get_subscribers(topic);
        let mut outcome = PublishOutcome::default();

        if subscribers.is_empty() {
            debug!("No subscribers for {}", topic);
        } else {
            let delivery = Delivery {
                topic: Arc::from(topic),
                payload,
            };
            for client in &subscribers {
                match self.router.send_to_client(client, delivery.clone()) {
                    Ok(()) => outcome.delivered += 1,
                    Err(RouteError::NotConnected) => {
                        outcome.dropped += 1;
                        debug!("Subscriber {} of {} has no connection", client, topic);
                    }
                    Err(RouteError::Delivery(reason)) => {
                        outcome.dropped += 1;
                        warn!("Dropped message on {} for {}: {:?}", topic, client, reason);
                    }
                }
            }
        }

        if let Some(ref m) = self.metrics {
            m.published(outcome.delivered, outcome.dropped);
        }
        outcome
    }

    /// Close every connection and clear the registry
    pub fn shutdown(&self) {
        let closed = self.connections.len();
        self.connections.clear();
        self.registry.reset();
        if let Some(ref m) = self.metrics {
            m.connections_current.set(0);
        }
        info!("Broker shut down ({} connections closed)", closed);
    }
}
