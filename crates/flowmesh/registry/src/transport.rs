//! Peer transport trait.
//!
//! The wire transport itself lives outside this subsystem; everything here
//! talks to peers through this narrow capability. A single implementation
//! serves the registry (liveness, identity) and the constraint manager
//! (evaluation requests).

use async_trait::async_trait;
use flowmesh_types::{EvaluationRequest, PeerIdentity};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// A peer request failed: unreachable host, timeout, or malformed reply.
/// Callers fold this into "this peer does not qualify".
#[derive(Debug, Clone, Error)]
#[error("peer transport error: {0}")]
pub struct TransportError(pub String);

pub type TransportResult<T> = Result<T, TransportError>;

/// Outbound network capability toward a single peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Liveness probe; maps the peer's `{running: bool}` reply.
    async fn liveness(&self, ip: &str, port: u16) -> TransportResult<bool>;

    /// Identity probe: id, hostname and connected environments (plus a
    /// display name for address-only peers).
    async fn identity(&self, ip: &str, port: u16) -> TransportResult<PeerIdentity>;

    /// Ask a peer to self-evaluate hard constraints and report
    /// soft-constraint values. `Ok(None)` means the peer's hard constraints
    /// were not satisfied or its local configuration forbids execution.
    async fn request_evaluation(
        &self,
        ip: &str,
        port: u16,
        request: &EvaluationRequest,
    ) -> TransportResult<Option<HashMap<String, Value>>>;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! Scriptable in-memory transport for tests.

    use super::*;
    use flowmesh_types::MachineId;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Transport backed by per-endpoint scripted behavior.
    #[derive(Default)]
    pub struct ScriptedTransport {
        identities: Mutex<HashMap<String, PeerIdentity>>,
        evaluations: Mutex<HashMap<String, Option<HashMap<String, Value>>>>,
        evaluation_delays: Mutex<HashMap<String, Duration>>,
        unreachable: Mutex<HashSet<String>>,
        evaluation_requests: AtomicUsize,
        last_request: Mutex<Option<EvaluationRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn key(ip: &str, port: u16) -> String {
            format!("{}:{}", ip, port)
        }

        /// Register an identity answer for an endpoint.
        pub fn with_identity(self, ip: &str, port: u16, id: &str) -> Self {
            self.identities.lock().unwrap().insert(
                Self::key(ip, port),
                PeerIdentity {
                    id: MachineId::new(id),
                    name: Some(format!("peer-{}", id)),
                    hostname: Some(format!("{}.local", id)),
                    currently_connected_environments: Vec::new(),
                },
            );
            self
        }

        /// Register an evaluation answer (`None` = hard constraints failed).
        pub fn with_evaluation(
            self,
            ip: &str,
            port: u16,
            answer: Option<HashMap<String, Value>>,
        ) -> Self {
            self.evaluations
                .lock()
                .unwrap()
                .insert(Self::key(ip, port), answer);
            self
        }

        /// Delay an endpoint's evaluation answer by the given duration.
        pub fn with_evaluation_delay(self, ip: &str, port: u16, delay: Duration) -> Self {
            self.evaluation_delays
                .lock()
                .unwrap()
                .insert(Self::key(ip, port), delay);
            self
        }

        /// Mark an endpoint as unreachable for all request kinds.
        pub fn set_unreachable(&self, ip: &str, port: u16, unreachable: bool) {
            let mut set = self.unreachable.lock().unwrap();
            if unreachable {
                set.insert(Self::key(ip, port));
            } else {
                set.remove(&Self::key(ip, port));
            }
        }

        /// Number of evaluation requests issued so far.
        pub fn evaluation_request_count(&self) -> usize {
            self.evaluation_requests.load(Ordering::SeqCst)
        }

        /// The most recently received evaluation request.
        pub fn last_evaluation_request(&self) -> Option<EvaluationRequest> {
            self.last_request.lock().unwrap().clone()
        }

        fn check_reachable(&self, ip: &str, port: u16) -> TransportResult<()> {
            if self.unreachable.lock().unwrap().contains(&Self::key(ip, port)) {
                Err(TransportError(format!("{}:{} unreachable", ip, port)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PeerTransport for ScriptedTransport {
        async fn liveness(&self, ip: &str, port: u16) -> TransportResult<bool> {
            self.check_reachable(ip, port)?;
            Ok(true)
        }

        async fn identity(&self, ip: &str, port: u16) -> TransportResult<PeerIdentity> {
            self.check_reachable(ip, port)?;
            self.identities
                .lock()
                .unwrap()
                .get(&Self::key(ip, port))
                .cloned()
                .ok_or_else(|| TransportError(format!("no identity scripted for {}:{}", ip, port)))
        }

        async fn request_evaluation(
            &self,
            ip: &str,
            port: u16,
            request: &EvaluationRequest,
        ) -> TransportResult<Option<HashMap<String, Value>>> {
            self.evaluation_requests.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            let delay = self
                .evaluation_delays
                .lock()
                .unwrap()
                .get(&Self::key(ip, port))
                .copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.check_reachable(ip, port)?;
            self.evaluations
                .lock()
                .unwrap()
                .get(&Self::key(ip, port))
                .cloned()
                .ok_or_else(|| TransportError(format!("no evaluation scripted for {}:{}", ip, port)))
        }
    }
}
