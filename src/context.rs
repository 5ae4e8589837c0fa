//! Process-scoped daemon context.
//!
//! Every component receives this explicitly at startup; there is no other
//! daemon-wide mutable state. Teardown order matters and is driven by the
//! binary: stop accepting commands, drain in-flight commands, tear down
//! consumer handles, then drop the context (and with it the registry).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use crate::config::DaemonConfig;
use crate::consumer::ConsumerHandle;
use crate::domain::TraceDomain;
use crate::error::{CommandError, CommandResult};
use crate::health::HealthRegistry;
use crate::notification::NotificationBridge;
use crate::session::SessionRegistry;
use crate::tracer::TracerBackend;

/// Everything the command layer needs, wired once in `main`.
pub struct DaemonContext {
    pub config: DaemonConfig,
    pub registry: SessionRegistry,
    pub health: Arc<HealthRegistry>,
    pub tracer: Arc<dyn TracerBackend>,
    pub notifications: Arc<dyn NotificationBridge>,
    consumers: HashMap<TraceDomain, Arc<ConsumerHandle>>,
    /// Registered notification triggers, daemon-wide.
    triggers: Mutex<HashSet<String>>,
    /// Next relay socket index handed to consumers for demultiplexing.
    next_net_seq_index: AtomicU64,
    shutdown: broadcast::Sender<()>,
}

impl DaemonContext {
    pub fn new(
        config: DaemonConfig,
        consumers: HashMap<TraceDomain, Arc<ConsumerHandle>>,
        tracer: Arc<dyn TracerBackend>,
        notifications: Arc<dyn NotificationBridge>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(4);
        Self {
            config,
            registry: SessionRegistry::new(),
            health: Arc::new(HealthRegistry::new()),
            tracer,
            notifications,
            consumers,
            triggers: Mutex::new(HashSet::new()),
            next_net_seq_index: AtomicU64::new(1),
            shutdown,
        }
    }

    /// Handle of the consumer serving a domain.
    pub fn consumer(&self, domain: TraceDomain) -> CommandResult<Arc<ConsumerHandle>> {
        self.consumers
            .get(&domain)
            .cloned()
            .ok_or_else(|| CommandError::not_found(format!("consumer for domain '{}'", domain)))
    }

    /// All consumer handles, for teardown and monitoring.
    pub fn consumers(&self) -> impl Iterator<Item = &Arc<ConsumerHandle>> {
        self.consumers.values()
    }

    /// Allocates a relay socket index, unique for the daemon's lifetime.
    pub fn allocate_net_seq_index(&self) -> u64 {
        self.next_net_seq_index.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn register_trigger(&self, name: &str) -> CommandResult<()> {
        let mut triggers = self.triggers.lock().await;
        if !triggers.insert(name.to_string()) {
            return Err(CommandError::AlreadyExists {
                what: format!("trigger '{}'", name),
            });
        }
        Ok(())
    }

    pub async fn unregister_trigger(&self, name: &str) -> CommandResult<()> {
        let mut triggers = self.triggers.lock().await;
        if !triggers.remove(name) {
            return Err(CommandError::not_found(format!("trigger '{}'", name)));
        }
        Ok(())
    }

    /// New receiver on the daemon-wide quit channel.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Signals every long-lived task to unwind.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Drops every consumer connection. Called after in-flight commands have
    /// drained and before the context itself is dropped.
    pub async fn teardown_consumers(&self) {
        for handle in self.consumers.values() {
            handle.disconnect().await;
        }
    }
}
