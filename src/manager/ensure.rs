//! Unit-file reconciliation
//!
//! One pass generates and synchronizes every unit file for a batch of
//! packages: service, socket and timer units first, then slice units for
//! the resolved quota groups, then journald namespace configuration, then
//! journald service drop-ins. The pass is transactional: any failure rolls
//! every touched file back to its prior state and the daemons are reloaded
//! only when something in their scope actually changed. Running the same
//! pass twice performs zero writes and zero reloads.

use std::path::PathBuf;

use crate::control::{InitSystem, SessionClient};
use crate::sync::{sync_unit_file, UnitTransaction};
use crate::units::quota::{QuotaGroup, QuotaGroupSet};
use crate::units::{
    DaemonScope, GenerateOptions, PackageKind, PackageServices, ServiceDescriptor, UnitKind,
};

use super::{ServiceError, ServiceManager};

/// Options applying to a whole reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct EnsureOptions {
    /// The image is being preseeded: unit files are written, but there is no
    /// live daemon to reload
    pub preseeding: bool,
    /// Generated service units gain a dependency on the base tooling mount
    pub require_mounted_tooling: bool,
    /// Restrict the pass to these services ("pkg.svc"); empty means all
    pub include_services: Vec<String>,
}

/// What a modified unit file belongs to
#[derive(Debug, Clone, Copy)]
pub enum ChangeSource<'a> {
    Service(&'a ServiceDescriptor),
    Quota(&'a QuotaGroup),
}

/// One kept modification, as passed to the change observer while the pass
/// is still in flight. Observers must not produce side effects that are
/// visible before the pass succeeds.
#[derive(Debug)]
pub struct UnitChange<'a> {
    pub source: ChangeSource<'a>,
    pub kind: UnitKind,
    /// Sub-name within the source: service name, socket name, or quota
    /// group name; empty for timers
    pub name: &'a str,
    pub old: &'a str,
    pub new: &'a str,
}

/// Reload is needed once anything in a scope changed; setting a flag twice
/// is the same as setting it once
#[derive(Debug, Default, Clone, Copy)]
struct ReloadFlags {
    system: bool,
    user: bool,
}

impl ReloadFlags {
    fn mark(&mut self, scope: DaemonScope) {
        match scope {
            DaemonScope::System => self.system = true,
            DaemonScope::User => self.user = true,
        }
    }
}

/// Per-pass bookkeeping: the rollback transaction, the reload flags, and
/// the caller's change observer
struct EnsureContext<'o> {
    tx: UnitTransaction,
    flags: ReloadFlags,
    observe: Option<&'o mut dyn FnMut(&UnitChange<'_>)>,
}

impl EnsureContext<'_> {
    fn handle_modification(
        &mut self,
        source: ChangeSource<'_>,
        kind: UnitKind,
        name: &str,
        path: PathBuf,
        content: &str,
        reload_scope: Option<DaemonScope>,
        suppress_empty: bool,
    ) -> Result<(), ServiceError> {
        let (prior, changed) = sync_unit_file(&path, content.as_bytes(), None)?;
        if !changed {
            return Ok(());
        }

        // a file that did not exist and still has no content is not a real
        // change; without this, passes over quota groups with no journal
        // limit would always look dirty
        if suppress_empty
            && content.is_empty()
            && prior.as_ref().map_or(true, |p| p.content.is_empty())
        {
            return Ok(());
        }

        if let Some(observe) = self.observe.as_mut() {
            let old = prior
                .as_ref()
                .map(|p| String::from_utf8_lossy(&p.content).into_owned())
                .unwrap_or_default();
            observe(&UnitChange {
                source,
                kind,
                name,
                old: &old,
                new: content,
            });
        }

        self.tx.record(path, prior);
        if let Some(scope) = reload_scope {
            self.flags.mark(scope);
        }
        Ok(())
    }
}

impl<S: InitSystem, C: SessionClient> ServiceManager<S, C> {
    /// Bring the unit files for `packages` up to date.
    ///
    /// New services gain unit files, changed descriptors rewrite them, and
    /// unchanged ones are left untouched; files of services no longer
    /// declared are not removed here (see
    /// [`remove_services`](Self::remove_services)). On any failure every
    /// file touched by this pass is restored or deleted and the original
    /// error is returned. The observer is invoked once per kept
    /// modification, while the pass is running.
    pub async fn ensure_services(
        &self,
        packages: &[PackageServices],
        opts: &EnsureOptions,
        observe: Option<&mut dyn FnMut(&UnitChange<'_>)>,
    ) -> Result<(), ServiceError> {
        let mut ctx = EnsureContext {
            tx: UnitTransaction::new(),
            flags: ReloadFlags::default(),
            observe,
        };

        let result = match self.ensure_all_units(packages, opts, &mut ctx) {
            Ok(()) => self.reload_modified(ctx.flags, opts).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                ctx.tx.commit();
                Ok(())
            }
            Err(err) => {
                self.restore(ctx, opts).await;
                Err(err)
            }
        }
    }

    fn ensure_all_units(
        &self,
        packages: &[PackageServices],
        opts: &EnsureOptions,
        ctx: &mut EnsureContext<'_>,
    ) -> Result<(), ServiceError> {
        for entry in packages {
            if entry.package.kind == PackageKind::Tooling {
                return Err(ServiceError::Internal(
                    "adding explicit services for the tooling package is unexpected".into(),
                ));
            }
        }

        // dictionary-shaped inputs carry no order; sort so file generation
        // order is deterministic and testable
        let mut sorted: Vec<&PackageServices> = packages.iter().collect();
        sorted.sort_by(|a, b| a.package.instance_name.cmp(&b.package.instance_name));

        let mut quota_groups = QuotaGroupSet::new();
        for entry in &sorted {
            if let Some(grp) = &entry.options.quota_group {
                // covers the whole declared tree, including any sub-group a
                // single service is pinned to; fails on malformed cycles
                // before this package writes anything
                quota_groups.add_all_necessary_groups(grp)?;
            }
            self.ensure_package_units(entry, opts, ctx)?;
        }

        for grp in quota_groups.all() {
            let content = self.generator.slice_unit(grp);
            let path = self.dirs.system_units.join(grp.slice_unit());
            ctx.handle_modification(
                ChangeSource::Quota(grp.as_ref()),
                UnitKind::Slice,
                &grp.name,
                path,
                &content,
                Some(DaemonScope::System),
                false,
            )?;
        }

        for grp in quota_groups.all() {
            // only groups with no services of their own carry a journal
            // namespace; the rest log into their parent's
            if !grp.services.is_empty() {
                continue;
            }
            let content = self.generator.journald_conf(grp);
            let path = self.dirs.systemd_conf.join(grp.journal_conf_file());
            ctx.handle_modification(
                ChangeSource::Quota(grp.as_ref()),
                UnitKind::Journald,
                &grp.name,
                path,
                &content,
                None,
                true,
            )?;
        }

        for grp in quota_groups.all() {
            if grp.journal.is_none() {
                continue;
            }
            let content = self.generator.journal_dropin(grp);
            let path = self
                .dirs
                .system_units
                .join(grp.journal_dropin_dir())
                .join(grp.journal_dropin_file());
            ctx.handle_modification(
                ChangeSource::Quota(grp.as_ref()),
                UnitKind::JournalDropIn,
                &grp.name,
                path,
                &content,
                None,
                false,
            )?;
        }

        Ok(())
    }

    fn ensure_package_units(
        &self,
        entry: &PackageServices,
        opts: &EnsureOptions,
        ctx: &mut EnsureContext<'_>,
    ) -> Result<(), ServiceError> {
        let mut services: Vec<&ServiceDescriptor> = entry.package.services.iter().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));

        let svc_quota_map = entry
            .options
            .quota_group
            .as_ref()
            .map(|grp| grp.service_map());

        for svc in services {
            let full_name = svc.full_name();
            if !opts.include_services.is_empty() && !opts.include_services.contains(&full_name) {
                continue;
            }

            // a service pinned to a sub-group overrides the package group
            let quota_group = svc_quota_map
                .as_ref()
                .and_then(|map| map.get(&full_name))
                .or(entry.options.quota_group.as_ref());

            let gen_opts = GenerateOptions {
                vitality_rank: entry.options.vitality_rank,
                quota_group,
                require_mounted_tooling: opts.require_mounted_tooling,
            };

            let content = self.generator.service_unit(svc, &gen_opts);
            ctx.handle_modification(
                ChangeSource::Service(svc),
                UnitKind::Service,
                &svc.name,
                svc.service_path(),
                &content,
                Some(svc.scope),
                false,
            )?;

            let mut sockets: Vec<_> = svc.sockets.iter().collect();
            sockets.sort_by(|a, b| a.name.cmp(&b.name));
            for socket in sockets {
                let content = self.generator.socket_unit(svc, socket);
                ctx.handle_modification(
                    ChangeSource::Service(svc),
                    UnitKind::Socket,
                    &socket.name,
                    svc.socket_path(&socket.name),
                    &content,
                    Some(svc.scope),
                    false,
                )?;
            }

            if svc.timer.is_some() {
                let content = self.generator.timer_unit(svc);
                ctx.handle_modification(
                    ChangeSource::Service(svc),
                    UnitKind::Timer,
                    "",
                    svc.timer_path(),
                    &content,
                    Some(svc.scope),
                    false,
                )?;
            }
        }
        Ok(())
    }

    async fn reload_modified(
        &self,
        flags: ReloadFlags,
        opts: &EnsureOptions,
    ) -> Result<(), ServiceError> {
        if opts.preseeding {
            return Ok(());
        }
        if flags.system {
            self.system.daemon_reload().await?;
        }
        if flags.user {
            self.bounded(self.session.services_daemon_reload(&[])).await?;
        }
        Ok(())
    }

    /// Best-effort unwind after a failed pass: restore every touched file,
    /// then reload whichever daemons already saw changes. Failures here are
    /// reported through the notifier, never propagated; re-running the pass
    /// is the recovery path for an interrupted rollback.
    async fn restore(&self, ctx: EnsureContext<'_>, opts: &EnsureOptions) {
        let flags = ctx.flags;
        for (path, err) in ctx.tx.rollback() {
            self.notifier.notify(&format!(
                "while trying to restore {} due to previous failure: {}",
                path.display(),
                err
            ));
        }

        if !opts.preseeding {
            if flags.system {
                if let Err(e) = self.system.daemon_reload().await {
                    self.notifier.notify(&format!(
                        "while trying to perform daemon-reload due to previous failure: {}",
                        e
                    ));
                }
            }
            if flags.user {
                if let Err(e) = self.bounded(self.session.services_daemon_reload(&[])).await {
                    self.notifier.notify(&format!(
                        "while trying to perform user daemon-reload due to previous failure: {}",
                        e
                    ));
                }
            }
        }
    }
}
