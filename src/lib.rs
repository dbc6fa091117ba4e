//! unitsync - Declarative service-unit reconciliation for package-managed services
//!
//! Given the desired set of services declared by installed packages, unitsync:
//! - Generates systemd unit files (service, socket, timer, slice, journald)
//! - Synchronizes them with what is on disk, rolling back on any failure
//! - Drives start/stop/restart/enable/disable across the system manager and
//!   per-user service managers with strict ordering and failure recovery
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   ServiceManager                      │
//! ├────────────────┬──────────────────┬──────────────────┤
//! │  Reconciliation │    Lifecycle     │  Status queries  │
//! ├────────────────┴──────────────────┴──────────────────┤
//! │  UnitGenerator  │  File sync + tx  │  Quota resolver  │
//! ├────────────────┴──────────────────┴──────────────────┤
//! │   InitSystem (systemctl)  │  SessionClient (agent)    │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod control;
pub mod manager;
pub mod sync;
pub mod units;

// Re-exports for the common call surface
pub use control::{InitSystem, InitSystemError, LogNotifier, Notifier, ServiceStatus, UnitStatus};
pub use manager::{
    DisabledServices, EnsureOptions, ScopeOptions, ServiceError, ServiceManager, ServiceScope,
};
pub use units::{
    DaemonScope, PackageInfo, PackageServices, QuotaGroup, ServiceDescriptor, ServiceOptions,
    UnitDirs,
};
