//! Restarting services
//!
//! Restart works off live status: the full unit set is queried up front
//! (batched), then each service is restarted only if the decision rule says
//! so. There is no compensating action; a failed restart is returned
//! immediately.

use crate::control::{InitSystem, ServiceStatus, SessionClient, SessionError};
use crate::units::ServiceDescriptor;

use super::{ScopeOptions, ServiceError, ServiceManager, ServiceScope};

/// Options for [`ServiceManager::restart_services`]
#[derive(Debug, Clone, Default)]
pub struct RestartServicesOptions {
    /// Ask the units to reload their definitions instead of restarting,
    /// where supported
    pub reload: bool,
    /// Also restart units that are enabled but currently inactive
    pub also_enabled_non_active: bool,
    pub scope: ScopeOptions,
}

/// The restart decision for one unit.
///
/// Explicitly named units restart regardless of state; otherwise only
/// active units are touched, plus enabled-but-inactive ones when the caller
/// opted in.
fn should_restart(
    active: bool,
    enabled: bool,
    unit_name: &str,
    explicit_units: &[String],
    opts: &RestartServicesOptions,
) -> bool {
    if !active && !explicit_units.iter().any(|u| u == unit_name) {
        if !opts.also_enabled_non_active {
            log::info!("not restarting inactive unit {}", unit_name);
            return false;
        } else if !enabled {
            log::info!("not restarting disabled and inactive unit {}", unit_name);
            return false;
        }
    }
    true
}

/// Which units a restart of this service must actually touch
fn units_to_restart(
    st: &ServiceStatus,
    explicit_units: &[String],
    opts: &RestartServicesOptions,
) -> Vec<String> {
    let mut units = Vec::new();

    // activated units do not support reload; under a reload request they
    // are treated like plain services
    if !st.activators.is_empty() && !opts.reload {
        for act in &st.activators {
            // decided against the primary unit's name: callers never refer
            // to the activator sub-units directly
            if should_restart(act.active, act.enabled, &st.service.name, explicit_units, opts) {
                units.push(act.name.clone());
            }
        }
        // the primary unit of an activated service is static; restart it
        // only if it is actually running
        if st.service.active {
            units.push(st.service.name.clone());
        }
    } else if should_restart(
        st.service.active,
        st.service.enabled,
        &st.service.name,
        explicit_units,
        opts,
    ) {
        units.push(st.service.name.clone());
    }
    units
}

impl<S: InitSystem, C: SessionClient> ServiceManager<S, C> {
    /// Restart (or reload) the services in `services` that the decision
    /// rule selects. Units named in `explicit_units` restart no matter
    /// their current state; the names are systemd unit names.
    ///
    /// The system and user passes are independent; the first hard failure
    /// in either is returned without compensation.
    pub async fn restart_services(
        &self,
        services: &[ServiceDescriptor],
        explicit_units: &[String],
        opts: &RestartServicesOptions,
    ) -> Result<(), ServiceError> {
        if opts.scope.scope != ServiceScope::User {
            let statuses = self.query_system_statuses(services).await?;
            for st in &statuses {
                let units = units_to_restart(st, explicit_units, opts);
                if units.is_empty() {
                    continue;
                }
                if opts.reload {
                    self.system.reload_or_restart(&units).await?;
                } else {
                    self.system.restart(&units).await?;
                }
            }
        }

        if opts.scope.scope != ServiceScope::System {
            let uids = self.target_uids(&opts.scope)?;
            let by_user = self.query_user_statuses(services, &uids).await?;
            for (uid, statuses) in &by_user {
                for st in statuses {
                    let units = units_to_restart(st, explicit_units, opts);
                    if units.is_empty() {
                        continue;
                    }
                    let failures = self
                        .bounded(self.session.services_restart(&[*uid], &units, opts.reload))
                        .await?;
                    for failure in &failures {
                        self.notifier
                            .notify(&format!("could not restart user service {}", failure));
                    }
                    if !failures.is_empty() {
                        return Err(SessionError::Failures(failures).into());
                    }
                }
            }
        }
        Ok(())
    }
}
