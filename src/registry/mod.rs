//! Subscription Registry
//!
//! The single shared index of connected sessions and topic subscriptions.
//! Connection handlers on many threads mutate and query it concurrently:
//! - topic -> subscribers for publish fan-out
//! - client -> topics for cleanup on disconnect (derived by scanning, never stored)
//! - the set of live sessions
//!
//! One reentrant lock guards all state. Every public operation holds it for
//! its whole duration, which makes each call atomic. Sequences of calls are
//! not atomic with respect to each other: a publisher that snapshots the
//! subscribers of a topic may race a concurrent unsubscribe.
//!
//! Invariants after every completed call:
//! - a topic entry exists only while it has at least one subscriber
//! - a client appears at most once per topic
//! - `get_topics(c)` equals the set of topics whose subscribers contain `c`
//!
//! No operation fails. Removing something that is not there is a no-op.

mod id;

pub use id::{ClientId, SessionId};

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::ReentrantMutex;
use tracing::{debug, info, trace};


/// Point-in-time counters for introspection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Connected sessions
    pub sessions: usize,
    /// Topics with at least one subscriber
    pub topics: usize,
    /// Total (topic, client) subscription pairs
    pub subscriptions: usize,
}

/// Copy of the whole registry taken under one lock acquisition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub sessions: AHashSet<SessionId>,
    /// Topic -> subscribers; every set is non-empty
    pub topics: AHashMap<String, AHashSet<ClientId>>,
}

impl RegistrySnapshot {
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            sessions: self.sessions.len(),
            topics: self.topics.len(),
            subscriptions: self.topics.values().map(|subscribers| subscribers.len()).sum(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    topics: AHashMap<Arc<str>, AHashSet<ClientId>>,
    sessions: AHashSet<SessionId>,
}

/// Thread-safe session and subscription registry
///
/// Construct one per broker and share it with `Arc`.
pub struct Registry {
    state: ReentrantMutex<RefCell<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(RegistryState::default())),
        }
    }

    /// Run `f` with exclusive access to the state.
    ///
    /// The lock is reentrant but the `RefCell` borrow is not: `f` must not
    /// call back into the registry.
    fn with_state<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// Clear all sessions and subscriptions
    pub fn reset(&self) {
        self.with_state(|state| {
            state.sessions.clear();
            state.topics.clear();
        });
        info!("Registry reset");
    }

    /// Record a session as connected (idempotent)
    pub fn add_session(&self, session: SessionId) {
        let added = self.with_state(|state| state.sessions.insert(session));
        trace!("add_session {} (new: {})", session, added);
    }

    /// Forget a session (no-op if absent)
    ///
    /// Subscriptions held under the session's client id are left alone; use
    /// [`Registry::release`] or unsubscribe explicitly.
    pub fn remove_session(&self, session: SessionId) {
        let removed = self.with_state(|state| state.sessions.remove(&session));
        trace!("remove_session {} (present: {})", session, removed);
    }

    /// Subscribe `client` to every topic in `topics`
    ///
    /// Topic entries are created on demand. The whole batch is applied under
    /// one lock acquisition.
    pub fn subscribe<I, T>(&self, topics: I, client: &ClientId)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        // Drain the caller's iterator before locking so lazy adapters don't
        // run inside the critical section.
        let topics: Vec<T> = topics.into_iter().collect();
        if topics.is_empty() {
            return;
        }

        self.with_state(|state| {
            for topic in &topics {
                let topic = topic.as_ref();
                match state.topics.get_mut(topic) {
                    Some(subscribers) => {
                        if subscribers.insert(client.clone()) {
                            trace!("{} subscribed to {}", client, topic);
                        }
                    }
                    None => {
                        let mut subscribers = AHashSet::with_capacity(1);
                        subscribers.insert(client.clone());
                        state.topics.insert(Arc::from(topic), subscribers);
                        debug!("Topic {} created by {}", topic, client);
                    }
                }
            }
        });
    }

    /// Unsubscribe `client` from every topic in `topics`
    ///
    /// Unknown topics and non-subscribed clients are skipped. A topic whose
    /// last subscriber leaves is removed.
    pub fn unsubscribe<I, T>(&self, topics: I, client: &ClientId)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let topics: Vec<T> = topics.into_iter().collect();
        if topics.is_empty() {
            return;
        }

        self.with_state(|state| {
            for topic in &topics {
                let topic = topic.as_ref();
                let Some(subscribers) = state.topics.get_mut(topic) else {
                    continue;
                };
                if subscribers.remove(client) {
                    trace!("{} unsubscribed from {}", client, topic);
                }
                if subscribers.is_empty() {
                    state.topics.remove(topic);
                    debug!("Topic {} removed (no subscribers)", topic);
                }
            }
        });
    }

    /// Snapshot of the subscribers of `topic` (empty if the topic is unknown)
    pub fn get_subscribers(&self, topic: &str) -> AHashSet<ClientId> {
        self.with_state(|state| state.topics.get(topic).cloned().unwrap_or_default())
    }

    /// Every topic `client` is currently subscribed to
    pub fn get_topics(&self, client: &ClientId) -> AHashSet<String> {
        self.with_state(|state| {
            state
                .topics
                .iter()
                .filter(|(_, subscribers)| subscribers.contains(client))
                .map(|(topic, _)| topic.to_string())
                .collect()
        })
    }

    /// Snapshot of the connected sessions
    pub fn get_sessions(&self) -> AHashSet<SessionId> {
        self.with_state(|state| state.sessions.clone())
    }

    /// Whether `topic` currently has subscribers
    pub fn has_topic(&self, topic: &str) -> bool {
        self.with_state(|state| state.topics.contains_key(topic))
    }

    /// Whether `session` is connected
    pub fn has_session(&self, session: SessionId) -> bool {
        self.with_state(|state| state.sessions.contains(&session))
    }

    /// Names of all topics with subscribers, sorted
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.with_state(|state| state.topics.keys().map(|t| t.to_string()).collect());
        names.sort_unstable();
        names
    }

    /// Sessions and subscriptions as of a single instant
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.with_state(|state| RegistrySnapshot {
            sessions: state.sessions.clone(),
            topics: state
                .topics
                .iter()
                .map(|(topic, subscribers)| (topic.to_string(), subscribers.clone()))
                .collect(),
        })
    }

    pub fn stats(&self) -> RegistryStats {
        self.with_state(|state| RegistryStats {
            sessions: state.sessions.len(),
            topics: state.topics.len(),
            subscriptions: state.topics.values().map(|subscribers| subscribers.len()).sum(),
        })
    }

    /// Disconnect cleanup in one atomic step
    ///
    /// Drops every subscription held by `client`, then removes `session`.
    /// Returns the topics that were dropped. Other threads observe either
    /// the state before or after the whole sequence.
    pub fn release(&self, session: SessionId, client: &ClientId) -> AHashSet<String> {
        // Held across the nested calls below; they re-enter on this thread.
        let _guard = self.state.lock();

        let topics = self.get_topics(client);
        self.unsubscribe(&topics, client);
        self.remove_session(session);

        debug!(
            "Released {} ({}), dropped {} subscriptions",
            session,
            client,
            topics.len()
        );
        topics
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("Registry")
            .field("sessions", &stats.sessions)
            .field("topics", &stats.topics)
            .field("subscriptions", &stats.subscriptions)
            .finish()
    }
}
