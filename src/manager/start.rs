//! Starting services
//!
//! Units are brought up strictly in caller order, activators before their
//! services, one `start` call per unit. A batched start would spawn one
//! concurrent job per unit inside systemd and the caller-specified order
//! would be lost. A failure anywhere unwinds the system side: everything
//! started by this call is stopped again in reverse order and any
//! enablement is reverted; the user-session agent owns recovery for its own
//! side.

use crate::control::{InitSystem, SessionClient, SessionError};
use crate::units::ServiceDescriptor;

use super::{
    filter_for_start, filter_user_not_disabled, ordered_service_units, DisabledServices,
    ScopeOptions, ServiceError, ServiceManager,
};

/// Options for [`ServiceManager::start_services`]
#[derive(Debug, Clone, Default)]
pub struct StartServicesOptions {
    /// Also mark the services for boot start before starting them
    pub enable: bool,
    pub scope: ScopeOptions,
}

impl<S: InitSystem, C: SessionClient> ServiceManager<S, C> {
    /// Start the service units for `services`, in the order provided.
    ///
    /// System services listed in `disabled` are skipped entirely; user
    /// services disabled for individual users are skipped by the session
    /// agent on those users only. With `enable` set, system units are
    /// enabled as one batch (followed by a reload so the enablement is
    /// durable) before any unit is started, and user units get a global
    /// enable unless an explicit user subset was requested.
    pub async fn start_services(
        &self,
        services: &[ServiceDescriptor],
        disabled: Option<&DisabledServices>,
        opts: &StartServicesOptions,
    ) -> Result<(), ServiceError> {
        let (sys, user) = filter_for_start(services, disabled, &opts.scope);

        let system_services: Vec<String> = sys.iter().map(|s| s.service_unit()).collect();
        let start_units = ordered_service_units(&sys);
        let user_units = ordered_service_units(&user);
        let user_for_enable = filter_user_not_disabled(&user, disabled);
        let user_enable_units: Vec<String> =
            user_for_enable.iter().map(|s| s.service_unit()).collect();

        let mut undo_start = false;
        let result = self
            .run_start(
                &system_services,
                &start_units,
                &user_units,
                &user_enable_units,
                disabled,
                opts,
                &mut undo_start,
            )
            .await;

        if let Err(err) = result {
            self.unwind_start(&sys, &system_services, &user_enable_units, opts, undo_start)
                .await;
            return Err(err);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_start(
        &self,
        system_services: &[String],
        start_units: &[String],
        user_units: &[String],
        user_enable_units: &[String],
        disabled: Option<&DisabledServices>,
        opts: &StartServicesOptions,
        undo_start: &mut bool,
    ) -> Result<(), ServiceError> {
        if opts.enable {
            if !system_services.is_empty() {
                self.system.enable_no_reload(system_services).await?;
                self.system.daemon_reload().await?;
                *undo_start = true;
            }

            // global enable only when no explicit user subset was requested;
            // a per-user enable is the session agent's responsibility
            if !user_enable_units.is_empty() && opts.scope.users.is_empty() {
                self.user_global.enable_no_reload(user_enable_units).await?;
                *undo_start = true;
            }
        }

        for unit in start_units {
            // from here on some unit may be running, so any failure must
            // unwind
            *undo_start = true;
            self.system.start(std::slice::from_ref(unit)).await?;
        }

        if !user_units.is_empty() {
            let uids = self.target_uids(&opts.scope)?;
            let disabled_by_user = disabled.map(|d| d.by_user.clone()).unwrap_or_default();
            let reply = self
                .bounded(self.session.services_start(
                    &uids,
                    user_units,
                    opts.enable,
                    &disabled_by_user,
                ))
                .await?;

            for failure in &reply.start_failures {
                self.notifier
                    .notify(&format!("could not start user service {}", failure));
            }
            for failure in &reply.stop_failures {
                self.notifier.notify(&format!(
                    "while trying to stop previously started user service {}",
                    failure
                ));
            }
            if !reply.start_failures.is_empty() {
                return Err(SessionError::Failures(reply.start_failures).into());
            }
        }
        Ok(())
    }

    /// Compensate for a failed start. Secondary failures are reported
    /// through the notifier; the caller propagates the original error.
    async fn unwind_start(
        &self,
        sys: &[&ServiceDescriptor],
        system_services: &[String],
        user_enable_units: &[String],
        opts: &StartServicesOptions,
        undo_start: bool,
    ) {
        if undo_start {
            // reverse order, one stop call per service; the unit list is
            // re-collected with activators included since those may have
            // fired and started the service in the meantime
            for svc in sys.iter().rev() {
                let mut units = svc.activator_units();
                units.push(svc.service_unit());
                if let Err(e) = self.system.stop(&units).await {
                    self.notifier.notify(&format!(
                        "while trying to stop previously started service {:?}: {}",
                        svc.service_unit(),
                        e
                    ));
                }
            }
        }

        // always revert enablement if it was requested, as it happens
        // pre-start
        if opts.enable {
            if !system_services.is_empty() {
                if let Err(e) = self.system.disable_no_reload(system_services).await {
                    self.notifier.notify(&format!(
                        "while trying to disable previously enabled services {:?}: {}",
                        system_services, e
                    ));
                }
                if let Err(e) = self.system.daemon_reload().await {
                    self.notifier
                        .notify(&format!("while trying to do daemon-reload: {}", e));
                }
            }

            if !user_enable_units.is_empty() && opts.scope.users.is_empty() {
                if let Err(e) = self.user_global.disable_no_reload(user_enable_units).await {
                    self.notifier.notify(&format!(
                        "while trying to disable previously enabled user services {:?}: {}",
                        user_enable_units, e
                    ));
                }
            }
        }
    }
}
