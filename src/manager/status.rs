//! Batched service status queries
//!
//! Status for system services comes from the system manager in one query
//! covering every involved unit (primary and activators); user-service
//! status is relayed per uid by the session agent. Both paths verify the
//! returned counts, since a miscounted reply would otherwise silently
//! misattribute statuses.

use std::collections::BTreeMap;

use crate::control::{InitSystem, ServiceStatus, SessionClient};
use crate::units::{DaemonScope, ServiceDescriptor};

use super::{DisabledServices, ServiceError, ServiceManager};

impl<S: InitSystem, C: SessionClient> ServiceManager<S, C> {
    /// Status of the system-scoped services in `services`, in input order
    pub(super) async fn query_system_statuses(
        &self,
        services: &[ServiceDescriptor],
    ) -> Result<Vec<ServiceStatus>, ServiceError> {
        let sys: Vec<&ServiceDescriptor> = services
            .iter()
            .filter(|s| s.scope == DaemonScope::System)
            .collect();
        if sys.is_empty() {
            return Ok(Vec::new());
        }

        let mut units = Vec::new();
        let mut spans = Vec::with_capacity(sys.len());
        for svc in &sys {
            let start = units.len();
            units.push(svc.service_unit());
            units.extend(svc.activator_units());
            spans.push((svc, start, units.len() - start));
        }

        let statuses = self.system.status(&units).await?;
        if statuses.len() != units.len() {
            return Err(ServiceError::StatusMismatch {
                expected: units.len(),
                got: statuses.len(),
            });
        }

        let mut result = Vec::with_capacity(sys.len());
        for (svc, start, len) in spans {
            result.push(ServiceStatus {
                name: svc.full_name(),
                scope: DaemonScope::System,
                service: statuses[start].clone(),
                activators: statuses[start + 1..start + len].to_vec(),
            });
        }
        Ok(result)
    }

    /// Status of the user-scoped services in `services`, per targeted uid.
    /// Empty `uids` targets every active user session.
    pub(super) async fn query_user_statuses(
        &self,
        services: &[ServiceDescriptor],
        uids: &[u32],
    ) -> Result<BTreeMap<u32, Vec<ServiceStatus>>, ServiceError> {
        let user: Vec<&ServiceDescriptor> = services
            .iter()
            .filter(|s| s.scope == DaemonScope::User)
            .collect();
        if user.is_empty() {
            return Ok(BTreeMap::new());
        }

        let units: Vec<String> = user.iter().map(|s| s.service_unit()).collect();
        let by_user = self
            .bounded(self.session.services_status(uids, &units))
            .await?;
        for statuses in by_user.values() {
            if statuses.len() != user.len() {
                return Err(ServiceError::StatusMismatch {
                    expected: user.len(),
                    got: statuses.len(),
                });
            }
        }
        Ok(by_user)
    }

    /// Snapshot of which of `services` are currently disabled.
    ///
    /// Callers consult the snapshot before a bulk enable so a service a
    /// user explicitly turned off is not flipped back on by a package
    /// operation that happens to cover it.
    pub async fn query_disabled_services(
        &self,
        services: &[ServiceDescriptor],
    ) -> Result<DisabledServices, ServiceError> {
        let system = disabled_names(&self.query_system_statuses(services).await?);

        let mut by_user = BTreeMap::new();
        if services.iter().any(|s| s.scope == DaemonScope::User) {
            for (uid, statuses) in self.query_user_statuses(services, &[]).await? {
                by_user.insert(uid, disabled_names(&statuses));
            }
        }

        Ok(DisabledServices { system, by_user })
    }
}

fn disabled_names(statuses: &[ServiceStatus]) -> Vec<String> {
    let mut names: Vec<String> = statuses
        .iter()
        .filter(|st| !st.is_enabled())
        .map(|st| st.name.clone())
        .collect();
    names.sort();
    names
}
