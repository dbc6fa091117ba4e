//! Stopping services
//!
//! User services are stopped first through the session channel, then system
//! units one at a time in caller order. Hosts can report spurious stop
//! failures for units that were never really running; a failed stop is
//! therefore forgiven when a follow-up status query shows the unit
//! inactive.

use crate::control::{InitSystem, SessionClient};
use crate::units::{ServiceDescriptor, StopReason};

use super::{filter_for_stop, ordered_service_units, ScopeOptions, ServiceError, ServiceManager};

/// Options for [`ServiceManager::stop_services`]
#[derive(Debug, Clone, Default)]
pub struct StopServicesOptions {
    /// Also unmark the services for boot start after stopping them
    pub disable: bool,
    pub scope: ScopeOptions,
}

impl<S: InitSystem, C: SessionClient> ServiceManager<S, C> {
    /// Stop the service units for `services`.
    ///
    /// Services without a unit file on disk are skipped, and a refresh stop
    /// skips services marked to endure refreshes. With `disable` set, the
    /// stopped system units are disabled as one batch followed by a reload;
    /// user units get a best-effort global disable, since the per-user
    /// session may already be gone.
    pub async fn stop_services(
        &self,
        services: &[ServiceDescriptor],
        reason: StopReason,
        opts: &StopServicesOptions,
    ) -> Result<(), ServiceError> {
        log::debug!(
            "stopping {} service(s), reason: {:?}",
            services.len(),
            reason
        );

        let (sys, user) = filter_for_stop(
            services,
            reason,
            &opts.scope,
            opts.disable,
            self.notifier.as_ref(),
        );

        // include activated units: their activators must stop too, or they
        // would just start the service again
        let system_units = ordered_service_units(&sys);
        let user_units = ordered_service_units(&user);

        if !user_units.is_empty() {
            let uids = self.target_uids(&opts.scope)?;
            let failures = self
                .bounded(self.session.services_stop(&uids, &user_units, opts.disable))
                .await?;
            for failure in &failures {
                self.notifier
                    .notify(&format!("could not stop user service {}", failure));
            }
        }

        for unit in &system_units {
            if let Err(stop_err) = self.system.stop(std::slice::from_ref(unit)).await {
                let statuses = self.system.status(std::slice::from_ref(unit)).await;
                match statuses {
                    Ok(sts) if sts.len() == 1 && !sts[0].active => {
                        // not running anyway; the host lied about the stop
                        log::warn!("cannot stop service {:?}: {}", unit, stop_err);
                    }
                    _ => return Err(stop_err.into()),
                }
            }
        }

        if opts.disable {
            if !system_units.is_empty() {
                self.system.disable_no_reload(&system_units).await?;
                self.system.daemon_reload().await?;
            }

            if !user_units.is_empty() && opts.scope.users.is_empty() {
                if let Err(e) = self.user_global.disable_no_reload(&user_units).await {
                    self.notifier.notify(&format!(
                        "while trying to disable previously enabled user services {:?}: {}",
                        user_units, e
                    ));
                }
            }
        }
        Ok(())
    }
}
