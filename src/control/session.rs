//! User-session control channel
//!
//! Per-user service managers are not reachable through the system instance;
//! lifecycle verbs are relayed to a session agent which fans them out to the
//! targeted users and reports per-unit failures alongside an aggregate
//! error. All calls are time-bounded by the caller (see
//! [`ServiceManager`](crate::manager::ServiceManager)).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ServiceStatus;

/// One unit that failed on one user's service manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFailure {
    pub uid: u32,
    pub service: String,
    pub error: String,
}

impl std::fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} for uid {}: {}", self.service, self.uid, self.error)
    }
}

/// Outcome of a start request: units that failed to start, plus units the
/// agent stopped again while unwinding its side of the operation
#[derive(Debug, Clone, Default)]
pub struct StartReply {
    pub start_failures: Vec<ServiceFailure>,
    pub stop_failures: Vec<ServiceFailure>,
}

fn fmt_failures(failures: &[ServiceFailure]) -> String {
    match failures {
        [] => "no user service failures".to_string(),
        [one] => format!("could not act on service {}", one),
        [first, rest @ ..] => {
            format!("could not act on service {} (and {} more)", first, rest.len())
        }
    }
}

/// The user-session channel failed
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("timed out waiting for user session agent")]
    Timeout,
    #[error("user session agent is not available")]
    Unavailable,
    #[error("user session agent: {0}")]
    Transport(String),
    #[error("{}", fmt_failures(.0))]
    Failures(Vec<ServiceFailure>),
}

/// RPC-like channel to the user-session agent, keyed by target uids.
///
/// An empty `uids` slice addresses every active user session.
#[allow(async_fn_in_trait)]
pub trait SessionClient {
    async fn services_start(
        &self,
        uids: &[u32],
        units: &[String],
        enable: bool,
        disabled: &BTreeMap<u32, Vec<String>>,
    ) -> Result<StartReply, SessionError>;

    async fn services_stop(
        &self,
        uids: &[u32],
        units: &[String],
        disable: bool,
    ) -> Result<Vec<ServiceFailure>, SessionError>;

    async fn services_restart(
        &self,
        uids: &[u32],
        units: &[String],
        reload: bool,
    ) -> Result<Vec<ServiceFailure>, SessionError>;

    async fn services_daemon_reload(&self, uids: &[u32]) -> Result<(), SessionError>;

    /// Status of the given user units on each targeted session
    async fn services_status(
        &self,
        uids: &[u32],
        units: &[String],
    ) -> Result<BTreeMap<u32, Vec<ServiceStatus>>, SessionError>;
}

/// Stand-in for hosts without a user-session agent: every call fails with
/// [`SessionError::Unavailable`]. The engine never calls the channel when an
/// operation involves no user services, so system-only workloads work fine
/// with this client.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSessions;

impl SessionClient for UnavailableSessions {
    async fn services_start(
        &self,
        _uids: &[u32],
        _units: &[String],
        _enable: bool,
        _disabled: &BTreeMap<u32, Vec<String>>,
    ) -> Result<StartReply, SessionError> {
        Err(SessionError::Unavailable)
    }

    async fn services_stop(
        &self,
        _uids: &[u32],
        _units: &[String],
        _disable: bool,
    ) -> Result<Vec<ServiceFailure>, SessionError> {
        Err(SessionError::Unavailable)
    }

    async fn services_restart(
        &self,
        _uids: &[u32],
        _units: &[String],
        _reload: bool,
    ) -> Result<Vec<ServiceFailure>, SessionError> {
        Err(SessionError::Unavailable)
    }

    async fn services_daemon_reload(&self, _uids: &[u32]) -> Result<(), SessionError> {
        Err(SessionError::Unavailable)
    }

    async fn services_status(
        &self,
        _uids: &[u32],
        _units: &[String],
    ) -> Result<BTreeMap<u32, Vec<ServiceStatus>>, SessionError> {
        Err(SessionError::Unavailable)
    }
}
