//! Service descriptor types and unit naming
//!
//! Descriptors are the in-memory representation of the services a package
//! declares. They are immutable once built for a package revision and carry
//! everything needed to name, place, and generate the systemd units that
//! back them.

mod generate;
pub mod quota;

pub use generate::{GenerateOptions, SystemdGenerator, UnitGenerator, TOOLING_MOUNT_UNIT};
pub use quota::{CycleError, JournalQuota, QuotaGroup, QuotaGroupSet};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Prefix shared by every generated unit file name
pub const UNIT_PREFIX: &str = "pkg";

/// Which service manager a service runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonScope {
    /// The system-wide service manager
    System,
    /// A per-user service manager instance
    User,
}

/// Service type determines startup notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[default]
    Simple,
    Forking,
    Oneshot,
    Notify,
    Dbus,
}

impl ServiceKind {
    /// systemd Type= value
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Simple => "simple",
            ServiceKind::Forking => "forking",
            ServiceKind::Oneshot => "oneshot",
            ServiceKind::Notify => "notify",
            ServiceKind::Dbus => "dbus",
        }
    }
}

/// Restart policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    #[default]
    OnFailure,
    Always,
}

impl RestartPolicy {
    /// systemd Restart= value
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::Always => "always",
        }
    }
}

/// How a service behaves when its package is refreshed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMode {
    /// Stop and restart across the refresh (default)
    #[default]
    Restart,
    /// Keep running through the refresh
    Endure,
}

/// Why services are being stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// An automatic package refresh is in progress
    Refresh,
    /// The package is being removed
    Remove,
    /// Any other caller-initiated stop
    Other,
}

/// A socket unit that activates its owning service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketDescriptor {
    /// Socket name within the service (e.g. "control")
    pub name: String,
    /// ListenStream= address (path or host:port)
    pub listen_stream: String,
    /// SocketMode= for path sockets
    #[serde(default)]
    pub socket_mode: Option<u32>,
}

/// A timer unit that activates its owning service on a schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerDescriptor {
    /// OnCalendar= expressions, one per entry
    pub on_calendar: Vec<String>,
}

/// One service declared by a package
///
/// `unit_dir` is the resolved directory the generated unit files live in;
/// callers fill it in from [`UnitDirs`] for the service's scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Owning package instance name
    pub package: String,
    /// Service name within the package
    pub name: String,
    pub scope: DaemonScope,
    #[serde(default)]
    pub kind: ServiceKind,
    pub exec_start: String,
    #[serde(default)]
    pub exec_stop: Option<String>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub restart: RestartPolicy,
    #[serde(default)]
    pub sockets: Vec<SocketDescriptor>,
    #[serde(default)]
    pub timer: Option<TimerDescriptor>,
    /// Activation units declared outside the package (e.g. D-Bus services)
    #[serde(default)]
    pub activates_on: Vec<String>,
    #[serde(default)]
    pub refresh_mode: RefreshMode,
    /// Directory the unit files for this service are written to
    pub unit_dir: PathBuf,
}

impl ServiceDescriptor {
    /// Full service name, unique across packages ("pkg-instance.service-name")
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }

    /// Name of the service unit file
    pub fn service_unit(&self) -> String {
        format!("{}.{}.{}.service", UNIT_PREFIX, self.package, self.name)
    }

    /// Name of the socket unit file for one of this service's sockets
    pub fn socket_unit(&self, socket_name: &str) -> String {
        format!(
            "{}.{}.{}.{}.socket",
            UNIT_PREFIX, self.package, self.name, socket_name
        )
    }

    /// Name of the timer unit file
    pub fn timer_unit(&self) -> String {
        format!("{}.{}.{}.timer", UNIT_PREFIX, self.package, self.name)
    }

    pub fn service_path(&self) -> PathBuf {
        self.unit_dir.join(self.service_unit())
    }

    pub fn socket_path(&self, socket_name: &str) -> PathBuf {
        self.unit_dir.join(self.socket_unit(socket_name))
    }

    pub fn timer_path(&self) -> PathBuf {
        self.unit_dir.join(self.timer_unit())
    }

    /// Whether the service is started on demand by an activator unit
    pub fn is_activated(&self) -> bool {
        !self.sockets.is_empty() || self.timer.is_some() || !self.activates_on.is_empty()
    }

    /// Whether the service is activated by externally declared units only
    pub fn is_externally_activated(&self) -> bool {
        !self.activates_on.is_empty()
    }

    /// Activator unit names in start order: sockets, then timer, then
    /// externally declared activation units
    pub fn activator_units(&self) -> Vec<String> {
        let mut units: Vec<String> = self
            .sockets
            .iter()
            .map(|s| self.socket_unit(&s.name))
            .collect();
        if self.timer.is_some() {
            units.push(self.timer_unit());
        }
        units.extend(self.activates_on.iter().cloned());
        units
    }
}

/// Kind of package owning a set of services
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    #[default]
    App,
    /// The package shipping this tooling itself; its services are managed by
    /// the distribution, never through this engine
    Tooling,
}

/// An installed package instance and the services it declares
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    pub instance_name: String,
    #[serde(default)]
    pub kind: PackageKind,
    pub services: Vec<ServiceDescriptor>,
}

/// Per-package options for a reconciliation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceOptions {
    /// Importance rank used to bias the OOM killer away from the package's
    /// services; 0 means no bias
    #[serde(default)]
    pub vitality_rank: u32,
    /// Resource-limit group the package's services belong to
    #[serde(default)]
    pub quota_group: Option<Arc<QuotaGroup>>,
}

/// One entry in the batch handed to a reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageServices {
    pub package: PackageInfo,
    #[serde(default)]
    pub options: ServiceOptions,
}

/// Where generated files live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDirs {
    /// System-scope unit files (systemd system search path)
    pub system_units: PathBuf,
    /// User-scope unit files, shared by all user instances
    pub user_units: PathBuf,
    /// systemd configuration root, for journald config files
    pub systemd_conf: PathBuf,
}

impl Default for UnitDirs {
    fn default() -> Self {
        Self {
            system_units: PathBuf::from("/etc/systemd/system"),
            user_units: PathBuf::from("/etc/systemd/user"),
            systemd_conf: PathBuf::from("/etc/systemd"),
        }
    }
}

impl UnitDirs {
    /// Rooted under `base`, for tests and preseeding chroots
    pub fn under(base: &Path) -> Self {
        Self {
            system_units: base.join("etc/systemd/system"),
            user_units: base.join("etc/systemd/user"),
            systemd_conf: base.join("etc/systemd"),
        }
    }

    /// Unit directory for a daemon scope
    pub fn unit_dir(&self, scope: DaemonScope) -> &Path {
        match scope {
            DaemonScope::System => &self.system_units,
            DaemonScope::User => &self.user_units,
        }
    }
}

/// Kind of generated unit file, as reported to change observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Service,
    Socket,
    Timer,
    Slice,
    Journald,
    JournalDropIn,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Service => "service",
            UnitKind::Socket => "socket",
            UnitKind::Timer => "timer",
            UnitKind::Slice => "slice",
            UnitKind::Journald => "journald",
            UnitKind::JournalDropIn => "journal-dropin",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
