//! Resource quota groups
//!
//! A quota group is a named resource-limit grouping applied to one or more
//! services through a generated slice unit. Groups form a tree; a group may
//! carry a journal quota, which additionally maps to a bespoke journald
//! namespace (config file plus a journald service drop-in).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::UNIT_PREFIX;

/// Journal size/rate limits for a quota group's log namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalQuota {
    /// Upper bound on persisted journal size, in bytes
    #[serde(default)]
    pub max_size: Option<u64>,
    /// Messages allowed per rate period
    #[serde(default)]
    pub rate_count: Option<u32>,
    /// Rate-limiting window
    #[serde(default)]
    pub rate_period: Option<Duration>,
}

/// A named resource-limit group
///
/// The tree is built leaves-first; sub-groups are shared `Arc`s so a group
/// can be referenced both from its parent and from per-package options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaGroup {
    pub name: String,
    #[serde(default)]
    pub sub_groups: Vec<Arc<QuotaGroup>>,
    /// Full service names ("pkg.svc") assigned directly to this group
    #[serde(default)]
    pub services: Vec<String>,
    /// MemoryMax= in bytes
    #[serde(default)]
    pub memory_max: Option<u64>,
    /// CPUQuota= in percent (100 = one full CPU)
    #[serde(default)]
    pub cpu_quota: Option<u32>,
    /// TasksMax=
    #[serde(default)]
    pub tasks_max: Option<u32>,
    #[serde(default)]
    pub journal: Option<JournalQuota>,
}

impl QuotaGroup {
    /// Name of the slice unit backing this group
    pub fn slice_unit(&self) -> String {
        format!("{}.{}.slice", UNIT_PREFIX, self.name)
    }

    /// Journal namespace identifier for this group
    pub fn journal_namespace(&self) -> String {
        format!("{}-{}", UNIT_PREFIX, self.name)
    }

    /// File name of the journald configuration for this group's namespace
    pub fn journal_conf_file(&self) -> String {
        format!("journald@{}.conf", self.journal_namespace())
    }

    /// Directory name of the journald service drop-in for this namespace
    pub fn journal_dropin_dir(&self) -> String {
        format!("systemd-journald@{}.service.d", self.journal_namespace())
    }

    /// File name of the journald service drop-in
    pub fn journal_dropin_file(&self) -> String {
        "00-pkg.conf".to_string()
    }

    /// Map from full service name to the group it is directly assigned to,
    /// covering this group and all sub-groups.
    ///
    /// Callers must have validated the tree with
    /// [`QuotaGroupSet::add_all_necessary_groups`] first; the walk assumes
    /// an acyclic tree.
    pub fn service_map(self: &Arc<Self>) -> BTreeMap<String, Arc<QuotaGroup>> {
        let mut map = BTreeMap::new();
        fn walk(grp: &Arc<QuotaGroup>, map: &mut BTreeMap<String, Arc<QuotaGroup>>) {
            for svc in &grp.services {
                map.insert(svc.clone(), Arc::clone(grp));
            }
            for sub in &grp.sub_groups {
                walk(sub, map);
            }
        }
        walk(self, &mut map);
        map
    }
}

/// A quota-group tree is malformed: a group recurs on its own path
#[derive(Debug, Clone, thiserror::Error)]
#[error("quota group cycle detected: {}", .path.join(" -> "))]
pub struct CycleError {
    pub path: Vec<String>,
}

/// The working set of quota groups touched by a reconciliation pass
///
/// Groups are keyed by name, so a group reachable through several packages
/// is only processed once. Iteration is name-ordered for deterministic file
/// generation.
#[derive(Debug, Default)]
pub struct QuotaGroupSet {
    groups: BTreeMap<String, Arc<QuotaGroup>>,
}

impl QuotaGroupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `root` and, recursively, every declared sub-group.
    ///
    /// Correctly constructed group trees are acyclic; the cycle check exists
    /// as a safety net against malformed state and reports the offending
    /// path.
    pub fn add_all_necessary_groups(&mut self, root: &Arc<QuotaGroup>) -> Result<(), CycleError> {
        let mut path = Vec::new();
        self.visit(root, &mut path)
    }

    fn visit(&mut self, grp: &Arc<QuotaGroup>, path: &mut Vec<String>) -> Result<(), CycleError> {
        if path.iter().any(|n| *n == grp.name) {
            let mut cycle = path.clone();
            cycle.push(grp.name.clone());
            return Err(CycleError { path: cycle });
        }

        self.groups
            .entry(grp.name.clone())
            .or_insert_with(|| Arc::clone(grp));

        path.push(grp.name.clone());
        for sub in &grp.sub_groups {
            self.visit(sub, path)?;
        }
        path.pop();
        Ok(())
    }

    /// All groups in the set, ordered by name
    pub fn all(&self) -> impl Iterator<Item = &Arc<QuotaGroup>> {
        self.groups.values()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }
}
