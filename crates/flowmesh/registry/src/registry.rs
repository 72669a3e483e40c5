//! Peer registry and background health loop.
//!
//! Per-candidate state machine: unknown -> discovered -> (healthy <->
//! suspect) -> evicted. The background loop is the single writer of strike
//! counts; readers take snapshots via [`PeerRegistry::available_machines`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use flowmesh_types::{EngineConfig, Machine, MachineId, MachineInformation};
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::transport::PeerTransport;

/// Consecutive failed liveness probes before a peer is evicted.
pub const STRIKE_LIMIT: u32 = 3;

/// Backoff between connectivity polls while the network is gone.
const NETWORK_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Hook to re-announce this engine on the network after connectivity returns.
#[async_trait]
pub trait SelfAdvertiser: Send + Sync {
    async fn republish(&self);
}

/// Events emitted as the peer set changes.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A peer was admitted after its identity probe succeeded.
    PeerDiscovered(Machine),

    /// A peer was removed: withdrawal, eviction, or network loss.
    PeerRemoved(Machine),
}

/// Live set of known peer machines.
///
/// Lifecycle-owned: create with [`PeerRegistry::new`], start the health loop
/// with [`PeerRegistry::start`], stop it with [`PeerRegistry::shutdown`].
/// Injected by reference wherever peer visibility is needed; there is no
/// ambient singleton.
pub struct PeerRegistry {
    engine: EngineConfig,

    transport: Arc<dyn PeerTransport>,

    introspection: Arc<dyn MachineInformation>,

    /// Admitted peers, keyed by machine id.
    machines: DashMap<MachineId, Machine>,

    /// Consecutive failed health checks, keyed by `ip:port`.
    strikes: DashMap<String, u32>,

    /// Re-announce hook used after network recovery.
    advertiser: Option<Arc<dyn SelfAdvertiser>>,

    event_tx: broadcast::Sender<RegistryEvent>,

    health_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Outcome of one health-check round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthRound {
    /// All peers were probed.
    Completed,

    /// Only virtual interfaces were found; peers were cleared and the loop
    /// should wait for connectivity.
    NetworkDown,
}

impl PeerRegistry {
    pub fn new(
        engine: EngineConfig,
        transport: Arc<dyn PeerTransport>,
        introspection: Arc<dyn MachineInformation>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            engine,
            transport,
            introspection,
            machines: DashMap::new(),
            strikes: DashMap::new(),
            advertiser: None,
            event_tx,
            health_handle: std::sync::Mutex::new(None),
        }
    }

    pub fn with_advertiser(mut self, advertiser: Arc<dyn SelfAdvertiser>) -> Self {
        self.advertiser = Some(advertiser);
        self
    }

    /// Subscribe to peer up/down events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    /// Current best-known snapshot of the peer pool.
    ///
    /// Never fails and never blocks on in-flight probes.
    pub fn available_machines(&self) -> Vec<Machine> {
        self.machines.iter().map(|r| r.value().clone()).collect()
    }

    /// Admit a peer announced by the discovery protocol.
    ///
    /// Identity facts are fetched from the peer before it becomes visible;
    /// a failed identity probe leaves the pool untouched.
    #[instrument(skip(self))]
    pub async fn handle_announcement(
        &self,
        ip: &str,
        port: u16,
        name: Option<String>,
    ) -> RegistryResult<Machine> {
        let identity = self.transport.identity(ip, port).await.map_err(|e| {
            RegistryError::IdentityProbeFailed {
                endpoint: format!("{}:{}", ip, port),
                reason: e.to_string(),
            }
        })?;

        let machine = Machine {
            id: Some(identity.id.clone()),
            ip: ip.to_string(),
            port,
            name: name.or(identity.name),
            hostname: identity.hostname,
            currently_connected_environments: identity.currently_connected_environments,
        };

        info!(machine = %identity.id, endpoint = %machine.endpoint(), "peer discovered");

        self.strikes.remove(&machine.endpoint());
        self.machines.insert(identity.id, machine.clone());
        let _ = self.event_tx.send(RegistryEvent::PeerDiscovered(machine.clone()));

        Ok(machine)
    }

    /// Remove a peer that withdrew its announcement, regardless of strikes.
    #[instrument(skip(self))]
    pub fn handle_withdrawal(&self, ip: &str, port: u16) {
        let withdrawn: Option<MachineId> = self
            .machines
            .iter()
            .find(|r| r.value().ip == ip && r.value().port == port)
            .map(|r| r.key().clone());

        // May already be gone; withdrawal is idempotent.
        if let Some(id) = withdrawn {
            if let Some((_, machine)) = self.machines.remove(&id) {
                info!(machine = %id, "peer withdrew");
                self.strikes.remove(&machine.endpoint());
                let _ = self.event_tx.send(RegistryEvent::PeerRemoved(machine));
            }
        }
    }

    /// Probe every known peer once.
    ///
    /// A reachable peer clears its strike count; an unreachable one gains a
    /// strike and is evicted at the limit. When introspection reports only
    /// virtual network interfaces, all peers are cleared instead.
    pub async fn health_check_round(&self) -> HealthRound {
        if !self.has_network_connection().await {
            warn!("no non-virtual network interface; clearing peer pool");
            self.clear_peers();
            return HealthRound::NetworkDown;
        }

        let peers = self.available_machines();
        let probes = peers.iter().map(|machine| {
            let transport = Arc::clone(&self.transport);
            async move {
                let result = transport.liveness(&machine.ip, machine.port).await;
                (machine.clone(), result)
            }
        });

        for (machine, result) in join_all(probes).await {
            match result {
                Ok(true) => {
                    self.strikes.remove(&machine.endpoint());
                }
                Ok(false) => {
                    // Reachable but the engine is not running: neither a
                    // strike nor a reset.
                    debug!(endpoint = %machine.endpoint(), "peer reachable but not running");
                }
                Err(e) => {
                    debug!(endpoint = %machine.endpoint(), error = %e, "liveness probe failed");
                    self.strike(&machine);
                }
            }
        }

        HealthRound::Completed
    }

    /// Start the background health loop.
    pub fn start(self: &Arc<Self>) -> RegistryResult<()> {
        let mut guard = self.health_handle.lock().expect("health handle lock");
        if guard.is_some() {
            return Err(RegistryError::AlreadyRunning);
        }

        info!(
            interval_ms = self.engine.discovery_interval.as_millis() as u64,
            "starting peer health loop"
        );

        let registry = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            loop {
                if registry.health_check_round().await == HealthRound::NetworkDown {
                    registry.wait_for_network().await;
                }
                tokio::time::sleep(registry.engine.discovery_interval).await;
            }
        }));

        Ok(())
    }

    /// Stop the background health loop.
    pub fn shutdown(&self) {
        if let Some(handle) = self.health_handle.lock().expect("health handle lock").take() {
            handle.abort();
        }
    }

    fn strike(&self, machine: &Machine) {
        let endpoint = machine.endpoint();
        let strikes = {
            let mut entry = self.strikes.entry(endpoint.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        if strikes >= STRIKE_LIMIT {
            info!(endpoint = %endpoint, "peer evicted after repeated failed health checks");
            self.strikes.remove(&endpoint);
            if let Some(id) = machine.id.clone() {
                if let Some((_, evicted)) = self.machines.remove(&id) {
                    let _ = self.event_tx.send(RegistryEvent::PeerRemoved(evicted));
                }
            }
        } else {
            debug!(endpoint = %endpoint, strikes, "peer struck");
        }
    }

    /// Current strike count for an endpoint (zero when clean).
    pub fn strike_count(&self, ip: &str, port: u16) -> u32 {
        self.strikes
            .get(&format!("{}:{}", ip, port))
            .map(|s| *s)
            .unwrap_or(0)
    }

    fn clear_peers(&self) {
        let ids: Vec<MachineId> = self.machines.iter().map(|r| r.key().clone()).collect();
        for id in ids {
            if let Some((_, machine)) = self.machines.remove(&id) {
                let _ = self.event_tx.send(RegistryEvent::PeerRemoved(machine));
            }
        }
        self.strikes.clear();
    }

    async fn has_network_connection(&self) -> bool {
        let info = self
            .introspection
            .machine_information(&["network".to_string()])
            .await;

        match info.get("network") {
            Some(Value::Array(interfaces)) => interfaces.iter().any(|interface| {
                interface
                    .get("type")
                    .and_then(Value::as_str)
                    .map(|t| t != "virtual")
                    .unwrap_or(false)
            }),
            _ => false,
        }
    }

    async fn wait_for_network(&self) {
        loop {
            tokio::time::sleep(NETWORK_RECONNECT_BACKOFF).await;
            if self.has_network_connection().await {
                info!("network connectivity restored");
                if let Some(advertiser) = &self.advertiser {
                    advertiser.republish().await;
                }
                return;
            }
        }
    }
}

impl Drop for PeerRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.health_handle.lock().expect("health handle lock").take() {
            handle.abort();
        }
    }
}
