//! Message Router
//!
//! Hands a delivery to the outbound channel of one connected client.

use std::sync::Arc;

use dashmap::DashMap;

use super::connection::{ConnectionEntry, Delivery, DeliveryFailure};
use crate::registry::ClientId;

/// Why a subscriber did not receive a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// Subscriber has no live connection
    NotConnected,
    /// Outbound channel refused the message
    Delivery(DeliveryFailure),
}

/// Message router for distributing messages to subscribers
pub struct MessageRouter {
    clients: Arc<DashMap<ClientId, ConnectionEntry>>,
}

impl MessageRouter {
    pub(crate) fn new(clients: Arc<DashMap<ClientId, ConnectionEntry>>) -> Self {
        Self { clients }
    }

    /// Queue a delivery for a specific client
    pub fn send_to_client(&self, client: &ClientId, delivery: Delivery) -> Result<(), RouteError> {
        let entry = self.clients.get(client).ok_or(RouteError::NotConnected)?;
        entry
            .outbound
            .try_send(delivery)
            .map_err(RouteError::Delivery)
    }
}
