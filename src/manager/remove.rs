//! Removing services and quota groups

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::control::{InitSystem, SessionClient};
use crate::units::quota::QuotaGroup;
use crate::units::{DaemonScope, PackageInfo, PackageKind};

use super::{ServiceError, ServiceManager};

impl<S: InitSystem, C: SessionClient> ServiceManager<S, C> {
    /// Disable and delete the unit files for all of a package's services.
    ///
    /// Services whose unit file is already gone are skipped. Unit files are
    /// deleted after everything was disabled so nothing re-activates midway;
    /// deletion failures are logged and do not abort the remaining
    /// removals. Each affected daemon scope is reloaded once at the end.
    pub async fn remove_services(&self, package: &PackageInfo) -> Result<(), ServiceError> {
        if package.kind == PackageKind::Tooling {
            return Err(ServiceError::Internal(
                "removing explicit services for the tooling package is unexpected".into(),
            ));
        }

        let mut system_units = Vec::new();
        let mut user_units = Vec::new();
        let mut unit_files: Vec<PathBuf> = Vec::new();
        let mut removed_system = false;
        let mut removed_user = false;

        for svc in &package.services {
            if !svc.service_path().exists() {
                continue;
            }
            let units = match svc.scope {
                DaemonScope::System => {
                    removed_system = true;
                    &mut system_units
                }
                DaemonScope::User => {
                    removed_user = true;
                    &mut user_units
                }
            };

            for socket in &svc.sockets {
                units.push(svc.socket_unit(&socket.name));
                unit_files.push(svc.socket_path(&socket.name));
            }
            if svc.timer.is_some() {
                units.push(svc.timer_unit());
                unit_files.push(svc.timer_path());
            }
            units.push(svc.service_unit());
            unit_files.push(svc.service_path());
        }

        if !system_units.is_empty() {
            self.system.disable_no_reload(&system_units).await?;
        }
        if !user_units.is_empty() {
            self.user_global.disable_no_reload(&user_units).await?;
        }

        for file in &unit_files {
            if let Err(e) = fs::remove_file(file) {
                if e.kind() != io::ErrorKind::NotFound {
                    log::warn!("failed to remove unit file {}: {}", file.display(), e);
                }
            }
        }

        if removed_system {
            self.system.daemon_reload().await?;
        }
        if removed_user {
            self.bounded(self.session.services_daemon_reload(&[])).await?;
        }
        Ok(())
    }

    /// Remove the slice file backing a quota group.
    ///
    /// The group must not have sub-groups anymore; remove those first.
    /// Idempotent: a slice file that is already gone is not an error, and
    /// only an actual deletion triggers a daemon reload.
    pub async fn remove_quota_group(&self, group: &QuotaGroup) -> Result<(), ServiceError> {
        if !group.sub_groups.is_empty() {
            return Err(ServiceError::Internal(format!(
                "cannot remove quota group {:?} with sub-groups",
                group.name
            )));
        }

        let path = self.dirs.system_units.join(group.slice_unit());
        match fs::remove_file(&path) {
            Ok(()) => self.system.daemon_reload().await?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
