//! Unit file content generation
//!
//! Pure functions from descriptors to systemd unit-file text. The trait is
//! the seam callers can replace to ship their own unit dialect; the engine
//! itself only ever diffs and writes the returned bytes.

use std::fmt::Write as _;
use std::sync::Arc;

use super::quota::QuotaGroup;
use super::{DaemonScope, ServiceDescriptor, SocketDescriptor};

/// Mount unit the generated services depend on when the caller requires the
/// base tooling to be mounted first
pub const TOOLING_MOUNT_UNIT: &str = "usr-lib-pkgtool.mount";

/// Per-service knobs threaded into service unit generation
#[derive(Debug, Default)]
pub struct GenerateOptions<'a> {
    /// OOM-kill bias rank; 0 means none
    pub vitality_rank: u32,
    /// Resolved quota group for this service
    pub quota_group: Option<&'a Arc<QuotaGroup>>,
    /// Add a dependency on [`TOOLING_MOUNT_UNIT`]
    pub require_mounted_tooling: bool,
}

/// Generates unit-file text for every unit kind the engine writes
pub trait UnitGenerator: Send + Sync {
    fn service_unit(&self, svc: &ServiceDescriptor, opts: &GenerateOptions<'_>) -> String;
    fn socket_unit(&self, svc: &ServiceDescriptor, socket: &SocketDescriptor) -> String;
    fn timer_unit(&self, svc: &ServiceDescriptor) -> String;
    fn slice_unit(&self, grp: &QuotaGroup) -> String;
    /// Journald namespace configuration; empty when the group carries no
    /// journal quota
    fn journald_conf(&self, grp: &QuotaGroup) -> String;
    fn journal_dropin(&self, grp: &QuotaGroup) -> String;
}

/// Default generator emitting plain systemd syntax
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemdGenerator;

fn wanted_by(scope: DaemonScope) -> &'static str {
    match scope {
        DaemonScope::System => "multi-user.target",
        DaemonScope::User => "default.target",
    }
}

impl UnitGenerator for SystemdGenerator {
    fn service_unit(&self, svc: &ServiceDescriptor, opts: &GenerateOptions<'_>) -> String {
        let mut out = String::new();
        out.push_str("[Unit]\n");
        let _ = writeln!(
            out,
            "Description=Service {} for package {}",
            svc.name, svc.package
        );
        if opts.require_mounted_tooling {
            let _ = writeln!(out, "Wants={}", TOOLING_MOUNT_UNIT);
            let _ = writeln!(out, "After={}", TOOLING_MOUNT_UNIT);
        }

        out.push_str("\n[Service]\n");
        let _ = writeln!(out, "Type={}", svc.kind.as_str());
        let _ = writeln!(out, "ExecStart={}", svc.exec_start);
        if let Some(stop) = &svc.exec_stop {
            let _ = writeln!(out, "ExecStop={}", stop);
        }
        if let Some(dir) = &svc.working_directory {
            let _ = writeln!(out, "WorkingDirectory={}", dir.display());
        }
        let _ = writeln!(out, "Restart={}", svc.restart.as_str());
        if opts.vitality_rank > 0 {
            // rank 1 is the most important service on the system
            let _ = writeln!(out, "OOMScoreAdjust={}", -899 + (opts.vitality_rank as i32 - 1));
        }
        if let Some(grp) = opts.quota_group {
            let _ = writeln!(out, "Slice={}", grp.slice_unit());
            if grp.journal.is_some() {
                let _ = writeln!(out, "LogNamespace={}", grp.journal_namespace());
            }
        }

        out.push_str("\n[Install]\n");
        let _ = writeln!(out, "WantedBy={}", wanted_by(svc.scope));
        out
    }

    fn socket_unit(&self, svc: &ServiceDescriptor, socket: &SocketDescriptor) -> String {
        let mut out = String::new();
        out.push_str("[Unit]\n");
        let _ = writeln!(
            out,
            "Description=Socket {} for service {}",
            socket.name,
            svc.full_name()
        );

        out.push_str("\n[Socket]\n");
        let _ = writeln!(out, "Service={}", svc.service_unit());
        let _ = writeln!(out, "ListenStream={}", socket.listen_stream);
        if let Some(mode) = socket.socket_mode {
            let _ = writeln!(out, "SocketMode={:04o}", mode);
        }

        out.push_str("\n[Install]\n");
        out.push_str("WantedBy=sockets.target\n");
        out
    }

    fn timer_unit(&self, svc: &ServiceDescriptor) -> String {
        let mut out = String::new();
        out.push_str("[Unit]\n");
        let _ = writeln!(out, "Description=Timer for service {}", svc.full_name());

        out.push_str("\n[Timer]\n");
        let _ = writeln!(out, "Unit={}", svc.service_unit());
        if let Some(timer) = &svc.timer {
            for expr in &timer.on_calendar {
                let _ = writeln!(out, "OnCalendar={}", expr);
            }
        }

        out.push_str("\n[Install]\n");
        out.push_str("WantedBy=timers.target\n");
        out
    }

    fn slice_unit(&self, grp: &QuotaGroup) -> String {
        let mut out = String::new();
        out.push_str("[Unit]\n");
        let _ = writeln!(out, "Description=Slice for quota group {}", grp.name);
        out.push_str("Before=slices.target\n");

        out.push_str("\n[Slice]\n");
        if let Some(mem) = grp.memory_max {
            let _ = writeln!(out, "MemoryMax={}", mem);
        }
        if let Some(cpu) = grp.cpu_quota {
            let _ = writeln!(out, "CPUQuota={}%", cpu);
        }
        if let Some(tasks) = grp.tasks_max {
            let _ = writeln!(out, "TasksMax={}", tasks);
        }
        out
    }

    fn journald_conf(&self, grp: &QuotaGroup) -> String {
        let Some(journal) = &grp.journal else {
            return String::new();
        };

        let mut out = String::new();
        out.push_str("[Journal]\n");
        if let Some(size) = journal.max_size {
            let _ = writeln!(out, "SystemMaxUse={}", size);
            let _ = writeln!(out, "RuntimeMaxUse={}", size);
        }
        if let Some(period) = journal.rate_period {
            let _ = writeln!(out, "RateLimitIntervalSec={}us", period.as_micros());
        }
        if let Some(count) = journal.rate_count {
            let _ = writeln!(out, "RateLimitBurst={}", count);
        }
        out
    }

    fn journal_dropin(&self, _grp: &QuotaGroup) -> String {
        // the namespaced journald instance must not create the default logs
        // directory inside the quota namespace
        "[Service]\nLogsDirectory=\n".to_string()
    }
}
