//! Catalog collaborator: where candidates come from.
//!
//! A [`Catalog`] is any source of candidates and action capabilities. The
//! engine never talks to sources directly; it goes through [`CatalogIndex`],
//! which
//!
//! - enumerates every source into one snapshot and swaps it in atomically
//!   (`Arc` replace under a short write lock), so readers never see a
//!   half-built index;
//! - routes capability queries to the source owning the candidate;
//! - isolates every call: an error or panic in one source is logged and that
//!   source's contribution becomes empty for the cycle.

pub mod file;

use std::collections::hash_map::Entry;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::CatalogError;
use crate::model::types::{Candidate, KindSet};

pub use file::{ActionSpec, CatalogFile, EntrySpec, FileCatalog};

/// Interface every candidate source implements.
///
/// Only [`Catalog::name`] and [`Catalog::all_candidates`] are mandatory; the
/// capability methods default to "supports nothing".
pub trait Catalog: Send + Sync {
    fn name(&self) -> &str;

    fn all_candidates(&self) -> anyhow::Result<Vec<Candidate>>;

    fn children_of(&self, _parent: &Candidate) -> anyhow::Result<Vec<Candidate>> {
        Ok(Vec::new())
    }

    /// Kinds of items `action` can be applied to.
    fn types_accepted(&self, _action: &Candidate) -> anyhow::Result<KindSet> {
        Ok(KindSet::EMPTY)
    }

    fn supports_item(&self, _action: &Candidate, _item: &Candidate) -> anyhow::Result<bool> {
        Ok(false)
    }

    /// Kinds of modifier items `action` takes; empty means no third pane.
    fn modifier_types(&self, _action: &Candidate) -> anyhow::Result<KindSet> {
        Ok(KindSet::EMPTY)
    }

    fn supports_modifier(
        &self,
        _action: &Candidate,
        _items: &[Candidate],
        _modifier: &Candidate,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Modifier items the action synthesizes for these items.
    fn dynamic_modifier_items(
        &self,
        _action: &Candidate,
        _items: &[Candidate],
    ) -> anyhow::Result<Vec<Candidate>> {
        Ok(Vec::new())
    }

    /// Run `action`. Returned candidates are results the action produced.
    fn perform(
        &self,
        _action: &Candidate,
        _items: &[Candidate],
        _modifiers: &[Candidate],
    ) -> anyhow::Result<Vec<Candidate>> {
        Ok(Vec::new())
    }
}

/// Immutable enumeration of every source at one point in time.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub candidates: Vec<Candidate>,
    owners: FxHashMap<String, usize>,
    pub generation: u64,
}

impl CatalogSnapshot {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.is_action())
    }
}

/// Live, copy-on-write view over a set of catalog sources.
pub struct CatalogIndex {
    sources: Vec<Arc<dyn Catalog>>,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    /// Owners of candidates discovered by drilling, which the snapshot lacks.
    discovered: RwLock<FxHashMap<String, usize>>,
}

impl CatalogIndex {
    pub fn new(sources: Vec<Arc<dyn Catalog>>) -> Self {
        Self {
            sources,
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::default())),
            discovered: RwLock::new(FxHashMap::default()),
        }
    }

    /// Build an index and enumerate it once.
    pub fn build(sources: Vec<Arc<dyn Catalog>>) -> Self {
        let index = Self::new(sources);
        index.rebuild();
        index
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.read().clone()
    }

    /// Re-enumerate all sources and swap the result in. Returns the candidate count.
    pub fn rebuild(&self) -> usize {
        let generation = self.snapshot.read().generation + 1;
        let mut candidates = Vec::new();
        let mut owners = FxHashMap::default();
        for (idx, source) in self.sources.iter().enumerate() {
            let found = guarded(source.as_ref(), "all_candidates", || source.all_candidates())
                .unwrap_or_default();
            debug!(source = source.name(), count = found.len(), "enumerated source");
            for candidate in found {
                match owners.entry(candidate.uid.clone()) {
                    Entry::Occupied(_) => {
                        debug!(uid = %candidate.uid, "duplicate uid; first source keeps ownership");
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(idx);
                        candidates.push(candidate);
                    }
                }
            }
        }
        let count = candidates.len();
        let snapshot = Arc::new(CatalogSnapshot {
            candidates,
            owners,
            generation,
        });
        *self.snapshot.write() = snapshot;
        self.discovered.write().clear();
        info!(count, generation, "catalog snapshot installed");
        count
    }

    fn owner(&self, uid: &str) -> Option<&Arc<dyn Catalog>> {
        let idx = self
            .snapshot
            .read()
            .owners
            .get(uid)
            .copied()
            .or_else(|| self.discovered.read().get(uid).copied())?;
        self.sources.get(idx)
    }

    /// Children of `parent`; empty when it has none or its source fails.
    pub fn children_of(&self, parent: &Candidate) -> Vec<Candidate> {
        let Some(source) = self.owner(&parent.uid) else {
            return Vec::new();
        };
        let Some(idx) = self.sources.iter().position(|s| Arc::ptr_eq(s, source)) else {
            return Vec::new();
        };
        let children =
            guarded(source.as_ref(), "children_of", || source.children_of(parent)).unwrap_or_default();
        if !children.is_empty() {
            let mut discovered = self.discovered.write();
            for child in &children {
                discovered.entry(child.uid.clone()).or_insert(idx);
            }
        }
        children
    }

    pub fn types_accepted(&self, action: &Candidate) -> KindSet {
        self.with_owner(action, "types_accepted", KindSet::EMPTY, |s| {
            s.types_accepted(action)
        })
    }

    pub fn supports_item(&self, action: &Candidate, item: &Candidate) -> bool {
        self.with_owner(action, "supports_item", false, |s| s.supports_item(action, item))
    }

    /// Whether `action` applies to every one of `items`.
    pub fn supports_items(&self, action: &Candidate, items: &[Candidate]) -> bool {
        !items.is_empty() && items.iter().all(|item| self.supports_item(action, item))
    }

    pub fn modifier_types(&self, action: &Candidate) -> KindSet {
        self.with_owner(action, "modifier_types", KindSet::EMPTY, |s| {
            s.modifier_types(action)
        })
    }

    pub fn supports_modifier(&self, action: &Candidate, items: &[Candidate], modifier: &Candidate) -> bool {
        self.with_owner(action, "supports_modifier", false, |s| {
            s.supports_modifier(action, items, modifier)
        })
    }

    pub fn dynamic_modifier_items(&self, action: &Candidate, items: &[Candidate]) -> Vec<Candidate> {
        self.with_owner(action, "dynamic_modifier_items", Vec::new(), |s| {
            s.dynamic_modifier_items(action, items)
        })
    }

    /// Run `action`; failures come back as [`CatalogError`] for the caller to report.
    pub fn perform(
        &self,
        action: &Candidate,
        items: &[Candidate],
        modifiers: &[Candidate],
    ) -> Result<Vec<Candidate>, CatalogError> {
        let Some(source) = self.owner(&action.uid) else {
            return Err(CatalogError::Failed {
                source_name: "<unknown>".into(),
                operation: "perform",
                message: format!("no source owns action {}", action.uid),
            });
        };
        guarded(source.as_ref(), "perform", || {
            source.perform(action, items, modifiers)
        })
    }

    fn with_owner<T>(
        &self,
        action: &Candidate,
        operation: &'static str,
        fallback: T,
        f: impl FnOnce(&dyn Catalog) -> anyhow::Result<T>,
    ) -> T {
        match self.owner(&action.uid) {
            Some(source) => guarded(source.as_ref(), operation, || f(source.as_ref()))
                .unwrap_or(fallback),
            None => fallback,
        }
    }
}

/// Run one call into external code, converting errors and panics into a
/// logged [`CatalogError`].
fn guarded<T>(
    source: &dyn Catalog,
    operation: &'static str,
    f: impl FnOnce() -> anyhow::Result<T>,
) -> Result<T, CatalogError> {
    let name = source.name().to_string();
    let err = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => CatalogError::Failed {
            source_name: name,
            operation,
            message: format!("{e:#}"),
        },
        Err(_) => CatalogError::Panicked {
            source_name: name,
            operation,
        },
    };
    warn!(error = %err, "catalog call isolated");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::CandidateKind;
    use anyhow::bail;

    struct Fixed(&'static str, Vec<Candidate>);

    impl Catalog for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn all_candidates(&self) -> anyhow::Result<Vec<Candidate>> {
            Ok(self.1.clone())
        }
        fn children_of(&self, parent: &Candidate) -> anyhow::Result<Vec<Candidate>> {
            if parent.is_source() {
                Ok(vec![Candidate::item(format!("{}/child", parent.uid), "Child")])
            } else {
                Ok(Vec::new())
            }
        }
        fn types_accepted(&self, _action: &Candidate) -> anyhow::Result<KindSet> {
            Ok(KindSet::of(&[CandidateKind::Item]))
        }
    }

    struct Broken;

    impl Catalog for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn all_candidates(&self) -> anyhow::Result<Vec<Candidate>> {
            bail!("disk on fire")
        }
    }

    struct Panicky;

    impl Catalog for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        fn all_candidates(&self) -> anyhow::Result<Vec<Candidate>> {
            panic!("source bug")
        }
    }

    #[test]
    fn failing_sources_contribute_nothing() {
        let good: Arc<dyn Catalog> = Arc::new(Fixed("good", vec![Candidate::item("a", "Alpha")]));
        let index = CatalogIndex::build(vec![Arc::new(Broken), good, Arc::new(Panicky)]);
        let snapshot = index.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.candidates[0].uid, "a");
    }

    #[test]
    fn rebuild_swaps_snapshot_without_disturbing_readers() {
        let index = CatalogIndex::build(vec![Arc::new(Fixed("one", vec![Candidate::item("a", "A")]))]);
        let before = index.snapshot();
        index.rebuild();
        let after = index.snapshot();
        assert_eq!(before.generation + 1, after.generation);
        // The old Arc is still intact for whoever held it.
        assert_eq!(before.len(), 1);
    }

    #[test]
    fn duplicate_uids_keep_first_source() {
        let first: Arc<dyn Catalog> = Arc::new(Fixed("first", vec![Candidate::item("dup", "One")]));
        let second: Arc<dyn Catalog> = Arc::new(Fixed("second", vec![Candidate::item("dup", "Two")]));
        let index = CatalogIndex::build(vec![first, second]);
        let snapshot = index.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.candidates[0].name, "One");
        assert_eq!(snapshot.owners.get("dup"), Some(&0));
    }

    #[test]
    fn children_are_routed_and_remembered() {
        let src = Candidate::source("docs", "Documents");
        let index = CatalogIndex::build(vec![Arc::new(Fixed("fs", vec![src.clone()]))]);
        let children = index.children_of(&src);
        assert_eq!(children.len(), 1);
        assert!(index.owner("docs/child").is_some());
        assert!(index.children_of(&Candidate::source("ghost", "Ghost")).is_empty());
    }

    #[test]
    fn unknown_action_supports_nothing() {
        let index = CatalogIndex::build(vec![Arc::new(Fixed("fs", Vec::new()))]);
        let ghost = Candidate::action("ghost", "Ghost");
        assert!(index.types_accepted(&ghost).is_empty());
        assert!(!index.supports_item(&ghost, &Candidate::item("a", "A")));
        assert!(index.perform(&ghost, &[], &[]).is_err());
    }
}
