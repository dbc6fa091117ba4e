//! Consumed control surfaces
//!
//! The engine never talks to an init system directly; everything goes
//! through the [`InitSystem`] trait (implemented for the real world by
//! [`SystemctlManager`]) and, for per-user service managers, the
//! [`SessionClient`] channel to the user-session agent.

mod session;
mod systemctl;

pub use session::{ServiceFailure, SessionClient, SessionError, StartReply, UnavailableSessions};
pub use systemctl::{SystemctlManager, SystemctlMode};


use serde::{Deserialize, Serialize};

use crate::units::DaemonScope;

/// Queried state of one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub name: String,
    pub active: bool,
    pub enabled: bool,
}

/// Queried state of one service: its primary unit plus the activator units
/// (sockets, timers) that gate it, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Full service name ("pkg.svc")
    pub name: String,
    pub scope: DaemonScope,
    pub service: UnitStatus,
    #[serde(default)]
    pub activators: Vec<UnitStatus>,
}

impl ServiceStatus {
    /// Whether the service counts as enabled.
    ///
    /// An activated service is considered enabled when all of its activator
    /// units are enabled; the primary unit of an activated service is static
    /// and its own enabled flag carries no signal.
    pub fn is_enabled(&self) -> bool {
        if self.activators.is_empty() {
            self.service.enabled
        } else {
            self.activators.iter().all(|a| a.enabled)
        }
    }
}

/// A control-surface call failed
#[derive(Debug, thiserror::Error)]
pub enum InitSystemError {
    #[error("systemctl {verb} failed: {stderr}")]
    CommandFailed { verb: String, stderr: String },
    #[error("failed to run systemctl: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("unexpected status output: {0}")]
    BadStatus(String),
    #[error("{verb} is not supported in global user mode")]
    UnsupportedMode { verb: String },
}

/// Control surface of one init-system instance.
///
/// Two instances are in play: the system-wide manager and the global
/// per-user template manager (used for enable/disable of user units shared
/// by all users).
#[allow(async_fn_in_trait)]
pub trait InitSystem {
    async fn start(&self, units: &[String]) -> Result<(), InitSystemError>;
    async fn stop(&self, units: &[String]) -> Result<(), InitSystemError>;
    async fn restart(&self, units: &[String]) -> Result<(), InitSystemError>;
    async fn reload_or_restart(&self, units: &[String]) -> Result<(), InitSystemError>;
    /// Mark units for boot start without reloading the daemon
    async fn enable_no_reload(&self, units: &[String]) -> Result<(), InitSystemError>;
    async fn disable_no_reload(&self, units: &[String]) -> Result<(), InitSystemError>;
    async fn daemon_reload(&self) -> Result<(), InitSystemError>;
    /// One status per queried unit, in query order
    async fn status(&self, units: &[String]) -> Result<Vec<UnitStatus>, InitSystemError>;
}

/// Narrow sink for user-facing notices about secondary failures
/// (compensation steps that could not complete, best-effort cleanups).
/// The engine only ever supplies the message body.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Default notifier routing notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        log::warn!("{}", message);
    }
}
