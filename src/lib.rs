//! HVLP - Lightweight publish/subscribe broker core
//!
//! The heart of the crate is the [`Registry`]: a thread-safe index of
//! connected sessions and topic subscriptions shared by every connection
//! handler. The [`Broker`] drives it for an in-process connection layer and
//! fans published payloads out to per-connection channels.

pub mod broker;
pub mod config;
pub mod metrics;
pub mod registry;

pub use broker::{Broker, BrokerConfig, BrokerError, Connection, Delivery, PublishOutcome};
pub use config::Config;
pub use metrics::{AdminServer, Metrics};
pub use registry::{ClientId, Registry, RegistrySnapshot, RegistryStats, SessionId};
