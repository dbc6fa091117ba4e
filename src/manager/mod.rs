//! Service lifecycle manager
//!
//! Reconciles generated unit files with disk and drives start/stop/restart
//! and enable/disable across the system service manager and per-user
//! service managers.

mod ensure;
mod remove;
mod restart;
mod start;
mod status;
mod stop;

pub use ensure::{ChangeSource, EnsureOptions, UnitChange};
pub use restart::RestartServicesOptions;
pub use start::StartServicesOptions;
pub use stop::StopServicesOptions;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::{
    InitSystem, InitSystemError, LogNotifier, Notifier, SessionClient, SessionError,
};
use crate::units::quota::CycleError;
use crate::units::{
    DaemonScope, ServiceDescriptor, StopReason, SystemdGenerator, UnitDirs, UnitGenerator,
};

/// Upper bound on any single user-session channel call
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from reconciliation and lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    InitSystem(#[from] InitSystemError),
    #[error(transparent)]
    UserSession(#[from] SessionError),
    #[error("expected status for {expected} unit(s), got {got}")]
    StatusMismatch { expected: usize, got: usize },
    #[error("unknown user: {0}")]
    UnknownUser(String),
}

/// Which service domain an operation applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceScope {
    /// Both system and user services
    #[default]
    All,
    /// Only system services
    System,
    /// Only user services
    User,
}

impl ServiceScope {
    pub fn matches(&self, scope: DaemonScope) -> bool {
        match self {
            ServiceScope::All => true,
            ServiceScope::System => scope == DaemonScope::System,
            ServiceScope::User => scope == DaemonScope::User,
        }
    }
}

/// Restricts a lifecycle operation to a service domain and, for user
/// services, an explicit set of users
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeOptions {
    #[serde(default)]
    pub scope: ServiceScope,
    /// For user scope: only these users; empty means all active users
    #[serde(default)]
    pub users: Vec<String>,
}

/// Snapshot of which services are individually disabled, used to keep bulk
/// enable operations from flipping a choice a user made per service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisabledServices {
    /// Full names of disabled system services
    #[serde(default)]
    pub system: Vec<String>,
    /// Full names of disabled user services, per uid
    #[serde(default)]
    pub by_user: BTreeMap<u32, Vec<String>>,
}

impl DisabledServices {
    fn system_contains(&self, full_name: &str) -> bool {
        self.system.iter().any(|n| n == full_name)
    }

    fn any_user_contains(&self, full_name: &str) -> bool {
        self.by_user.values().flatten().any(|n| n == full_name)
    }
}

/// Orchestrates unit-file reconciliation and service lifecycle for package
/// services.
///
/// Holds the two init-system instances (system manager and global per-user
/// configuration), the user-session channel, and all configuration that
/// would otherwise be process-global, so independent instances never
/// interfere.
pub struct ServiceManager<S, C> {
    system: S,
    user_global: S,
    session: C,
    generator: Box<dyn UnitGenerator>,
    notifier: Box<dyn Notifier>,
    dirs: UnitDirs,
    session_timeout: Duration,
}

impl<S: InitSystem, C: SessionClient> ServiceManager<S, C> {
    pub fn new(system: S, user_global: S, session: C) -> Self {
        Self {
            system,
            user_global,
            session,
            generator: Box::new(SystemdGenerator),
            notifier: Box::new(LogNotifier),
            dirs: UnitDirs::default(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    pub fn with_dirs(mut self, dirs: UnitDirs) -> Self {
        self.dirs = dirs;
        self
    }

    pub fn with_generator(mut self, generator: Box<dyn UnitGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn dirs(&self) -> &UnitDirs {
        &self.dirs
    }

    /// Run a session-channel call under the configured time bound
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, SessionError>>,
    ) -> Result<T, SessionError> {
        match tokio::time::timeout(self.session_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout),
        }
    }

    /// Resolve the uids targeted by `scope`; empty means all active users
    fn target_uids(&self, scope: &ScopeOptions) -> Result<Vec<u32>, ServiceError> {
        usernames_to_uids(&scope.users)
    }
}

/// Resolve usernames to uids via the passwd database
fn usernames_to_uids(users: &[String]) -> Result<Vec<u32>, ServiceError> {
    let mut uids = Vec::with_capacity(users.len());
    for name in users {
        match nix::unistd::User::from_name(name) {
            Ok(Some(user)) => uids.push(user.uid.as_raw()),
            Ok(None) => return Err(ServiceError::UnknownUser(name.clone())),
            Err(e) => {
                return Err(ServiceError::Internal(format!(
                    "cannot look up user {:?}: {}",
                    name, e
                )))
            }
        }
    }
    Ok(uids)
}

/// Unit names for a set of services in start order: every service's
/// activator units first, then the primary service units, both in caller
/// order. Units are brought up one at a time by the callers, never batched,
/// so this order is what the init system actually sees.
fn ordered_service_units(services: &[&ServiceDescriptor]) -> Vec<String> {
    let mut units = Vec::new();
    for svc in services {
        units.extend(svc.activator_units());
    }
    for svc in services {
        units.push(svc.service_unit());
    }
    units
}

/// Split services for a start operation: scope filtering plus exclusion of
/// individually disabled system services. User services stay; their
/// per-user disabled state is enforced by the session agent.
fn filter_for_start<'a>(
    services: &'a [ServiceDescriptor],
    disabled: Option<&DisabledServices>,
    scope: &ScopeOptions,
) -> (Vec<&'a ServiceDescriptor>, Vec<&'a ServiceDescriptor>) {
    let mut sys = Vec::new();
    let mut user = Vec::new();
    for svc in services {
        if !scope.scope.matches(svc.scope) {
            continue;
        }
        match svc.scope {
            DaemonScope::System => {
                if disabled.is_some_and(|d| d.system_contains(&svc.full_name())) {
                    continue;
                }
                sys.push(svc);
            }
            DaemonScope::User => user.push(svc),
        }
    }
    (sys, user)
}

/// User services eligible for a global (all-users) enable: anything disabled
/// for even one user keeps its state
fn filter_user_not_disabled<'a>(
    user_services: &[&'a ServiceDescriptor],
    disabled: Option<&DisabledServices>,
) -> Vec<&'a ServiceDescriptor> {
    let Some(disabled) = disabled else {
        return user_services.to_vec();
    };
    user_services
        .iter()
        .filter(|svc| !disabled.any_user_contains(&svc.full_name()))
        .copied()
        .collect()
}

/// Split services for a stop operation
fn filter_for_stop<'a>(
    services: &'a [ServiceDescriptor],
    reason: StopReason,
    scope: &ScopeOptions,
    disable: bool,
    notifier: &dyn Notifier,
) -> (Vec<&'a ServiceDescriptor>, Vec<&'a ServiceDescriptor>) {
    let mut sys = Vec::new();
    let mut user = Vec::new();
    for svc in services {
        // a unit file can be legitimately absent, e.g. a service added to a
        // package that was never reconciled; there is nothing to stop then
        if !svc.service_path().exists() {
            continue;
        }
        if reason == StopReason::Refresh
            && svc.refresh_mode == crate::units::RefreshMode::Endure
        {
            log::debug!("{} endures refreshes, not stopping", svc.full_name());
            continue;
        }
        if !scope.scope.matches(svc.scope) {
            continue;
        }
        if disable && svc.is_externally_activated() {
            notifier.notify(&format!(
                "Disabling {} may not have the intended effect as the service is activated externally",
                svc.full_name()
            ));
        }
        match svc.scope {
            DaemonScope::System => sys.push(svc),
            DaemonScope::User => user.push(svc),
        }
    }
    (sys, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{RefreshMode, SocketDescriptor, TimerDescriptor};
    use std::path::PathBuf;

    fn svc(package: &str, name: &str, scope: DaemonScope) -> ServiceDescriptor {
        ServiceDescriptor {
            package: package.into(),
            name: name.into(),
            scope,
            kind: Default::default(),
            exec_start: "/bin/true".into(),
            exec_stop: None,
            working_directory: None,
            restart: Default::default(),
            sockets: vec![],
            timer: None,
            activates_on: vec![],
            refresh_mode: RefreshMode::Restart,
            unit_dir: PathBuf::from("/nonexistent"),
        }
    }

    #[test]
    fn test_scope_matches() {
        assert!(ServiceScope::All.matches(DaemonScope::System));
        assert!(ServiceScope::All.matches(DaemonScope::User));
        assert!(ServiceScope::System.matches(DaemonScope::System));
        assert!(!ServiceScope::System.matches(DaemonScope::User));
        assert!(ServiceScope::User.matches(DaemonScope::User));
        assert!(!ServiceScope::User.matches(DaemonScope::System));
    }

    #[test]
    fn test_ordered_units_activators_before_services() {
        let mut web = svc("acme", "web", DaemonScope::System);
        web.sockets.push(SocketDescriptor {
            name: "http".into(),
            listen_stream: "0.0.0.0:80".into(),
            socket_mode: None,
        });
        web.timer = Some(TimerDescriptor {
            on_calendar: vec!["daily".into()],
        });
        let worker = svc("acme", "worker", DaemonScope::System);

        let units = ordered_service_units(&[&web, &worker]);
        assert_eq!(
            units,
            vec![
                "pkg.acme.web.http.socket",
                "pkg.acme.web.timer",
                "pkg.acme.web.service",
                "pkg.acme.worker.service",
            ]
        );
    }

    #[test]
    fn test_filter_for_start_excludes_disabled_system_services() {
        let services = vec![
            svc("acme", "web", DaemonScope::System),
            svc("acme", "worker", DaemonScope::System),
            svc("acme", "agent", DaemonScope::User),
        ];
        let disabled = DisabledServices {
            system: vec!["acme.worker".into()],
            by_user: BTreeMap::new(),
        };

        let (sys, user) = filter_for_start(&services, Some(&disabled), &ScopeOptions::default());
        let sys_names: Vec<String> = sys.iter().map(|s| s.full_name()).collect();
        assert_eq!(sys_names, vec!["acme.web"]);
        assert_eq!(user.len(), 1);
    }

    #[test]
    fn test_filter_for_start_scope_restriction() {
        let services = vec![
            svc("acme", "web", DaemonScope::System),
            svc("acme", "agent", DaemonScope::User),
        ];
        let scope = ScopeOptions {
            scope: ServiceScope::User,
            users: vec![],
        };
        let (sys, user) = filter_for_start(&services, None, &scope);
        assert!(sys.is_empty());
        assert_eq!(user.len(), 1);
    }

    #[test]
    fn test_filter_user_not_disabled_checks_every_uid() {
        let agent = svc("acme", "agent", DaemonScope::User);
        let helper = svc("acme", "helper", DaemonScope::User);
        let user_services = vec![&agent, &helper];

        let mut by_user = BTreeMap::new();
        by_user.insert(1000u32, vec!["acme.agent".to_string()]);
        let disabled = DisabledServices {
            system: vec![],
            by_user,
        };

        let kept = filter_user_not_disabled(&user_services, Some(&disabled));
        let names: Vec<String> = kept.iter().map(|s| s.full_name()).collect();
        assert_eq!(names, vec!["acme.helper"]);
    }

    #[test]
    fn test_usernames_to_uids_resolves_root() {
        let uids = usernames_to_uids(&["root".to_string()]).unwrap();
        assert_eq!(uids, vec![0]);
    }

    #[test]
    fn test_usernames_to_uids_unknown_user() {
        let err = usernames_to_uids(&["no-such-user-unitsync".to_string()]).unwrap_err();
        assert!(matches!(err, ServiceError::UnknownUser(_)));
    }
}
