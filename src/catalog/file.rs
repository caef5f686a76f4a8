//! Catalog read from a JSON document.
//!
//! ```json
//! {
//!   "name": "desktop",
//!   "entries": [
//!     { "uid": "dir.docs", "name": "Documents", "kind": "source",
//!       "children": [ { "uid": "doc.cv", "name": "cv.pdf", "kind": "item" } ] }
//!   ],
//!   "actions": [
//!     { "uid": "action.open", "name": "Open", "accepts": ["item", "source"] },
//!     { "uid": "action.move", "name": "Move To...", "accepts": ["item"],
//!       "modifiers": ["source"], "modifiers_required": true }
//!   ]
//! }
//! ```
//!
//! Actions do nothing when performed beyond echoing their inputs; the file
//! catalog exists to drive the engine headlessly.

use std::path::Path;

use anyhow::Context;
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::model::types::{Candidate, CandidateKind, KindSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub entries: Vec<EntrySpec>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

fn default_name() -> String {
    "file".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySpec {
    #[serde(flatten)]
    pub candidate: Candidate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<EntrySpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    /// Kinds of direct objects the action takes.
    #[serde(default)]
    pub accepts: KindSet,
    #[serde(default)]
    pub accepts_text: bool,
    /// Restrict direct objects to UIDs starting with one of these prefixes.
    #[serde(default)]
    pub only: Vec<String>,
    #[serde(default)]
    pub modifiers: KindSet,
    #[serde(default)]
    pub modifiers_required: bool,
    /// Modifier items offered in addition to catalog candidates.
    #[serde(default)]
    pub dynamic_modifiers: Vec<Candidate>,
}

impl ActionSpec {
    pub fn new(uid: impl Into<String>, name: impl Into<String>, accepts: KindSet) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            description: String::new(),
            icon: String::new(),
            accepts,
            accepts_text: false,
            only: Vec::new(),
            modifiers: KindSet::EMPTY,
            modifiers_required: false,
            dynamic_modifiers: Vec::new(),
        }
    }

    pub fn accepting_text(mut self) -> Self {
        self.accepts_text = true;
        self
    }

    pub fn only(mut self, prefix: impl Into<String>) -> Self {
        self.only.push(prefix.into());
        self
    }

    pub fn with_modifiers(mut self, kinds: KindSet, required: bool) -> Self {
        self.modifiers = kinds;
        self.modifiers_required = required;
        self
    }

    pub fn with_dynamic_modifier(mut self, candidate: Candidate) -> Self {
        self.dynamic_modifiers.push(candidate);
        self
    }

    fn candidate(&self) -> Candidate {
        let mut candidate = Candidate::action(&self.uid, &self.name)
            .with_description(&self.description)
            .with_icon(&self.icon);
        candidate.modifiers_required = self.modifiers_required;
        candidate
    }

    fn accepts_item(&self, item: &Candidate) -> bool {
        if item.is_text {
            return self.accepts_text;
        }
        self.accepts.contains(item.kind)
            && (self.only.is_empty() || self.only.iter().any(|p| item.uid.starts_with(p.as_str())))
    }
}

impl CatalogFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn entry(mut self, candidate: Candidate) -> Self {
        self.entries.push(EntrySpec {
            candidate,
            children: Vec::new(),
        });
        self
    }

    pub fn entry_with_children(mut self, candidate: Candidate, children: Vec<Candidate>) -> Self {
        self.entries.push(EntrySpec {
            candidate,
            children: children
                .into_iter()
                .map(|candidate| EntrySpec {
                    candidate,
                    children: Vec::new(),
                })
                .collect(),
        });
        self
    }

    pub fn action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }
}

/// [`Catalog`] over a parsed [`CatalogFile`].
#[derive(Debug, Clone)]
pub struct FileCatalog {
    name: String,
    top_level: Vec<Candidate>,
    children: FxHashMap<String, Vec<Candidate>>,
    actions: FxHashMap<String, ActionSpec>,
}

impl FileCatalog {
    pub fn from_file(file: CatalogFile) -> Self {
        let mut children = FxHashMap::default();
        let mut top_level = Vec::with_capacity(file.entries.len() + file.actions.len());
        for entry in file.entries {
            top_level.push(entry.candidate.clone());
            collect_children(&entry, &mut children);
        }
        let mut actions = FxHashMap::default();
        for action in file.actions {
            top_level.push(action.candidate());
            actions.insert(action.uid.clone(), action);
        }
        Self {
            name: file.name,
            top_level,
            children,
            actions,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let file: CatalogFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing catalog {}", path.display()))?;
        Ok(Self::from_file(file))
    }

    fn action(&self, action: &Candidate) -> anyhow::Result<&ActionSpec> {
        self.actions
            .get(&action.uid)
            .with_context(|| format!("unknown action {}", action.uid))
    }
}

fn collect_children(entry: &EntrySpec, out: &mut FxHashMap<String, Vec<Candidate>>) {
    if entry.children.is_empty() {
        return;
    }
    out.insert(
        entry.candidate.uid.clone(),
        entry.children.iter().map(|c| c.candidate.clone()).collect(),
    );
    for child in &entry.children {
        collect_children(child, out);
    }
}

impl Catalog for FileCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn all_candidates(&self) -> anyhow::Result<Vec<Candidate>> {
        Ok(self.top_level.clone())
    }

    fn children_of(&self, parent: &Candidate) -> anyhow::Result<Vec<Candidate>> {
        Ok(self.children.get(&parent.uid).cloned().unwrap_or_default())
    }

    fn types_accepted(&self, action: &Candidate) -> anyhow::Result<KindSet> {
        let spec = self.action(action)?;
        let mut kinds = spec.accepts;
        if spec.accepts_text {
            kinds.insert(CandidateKind::Item);
        }
        Ok(kinds)
    }

    fn supports_item(&self, action: &Candidate, item: &Candidate) -> anyhow::Result<bool> {
        Ok(self.action(action)?.accepts_item(item))
    }

    fn modifier_types(&self, action: &Candidate) -> anyhow::Result<KindSet> {
        Ok(self.action(action)?.modifiers)
    }

    fn supports_modifier(
        &self,
        action: &Candidate,
        items: &[Candidate],
        modifier: &Candidate,
    ) -> anyhow::Result<bool> {
        let spec = self.action(action)?;
        if modifier.is_text {
            return Ok(false);
        }
        Ok(spec.modifiers.contains(modifier.kind) && !items.iter().any(|i| i.uid == modifier.uid))
    }

    fn dynamic_modifier_items(
        &self,
        action: &Candidate,
        _items: &[Candidate],
    ) -> anyhow::Result<Vec<Candidate>> {
        Ok(self.action(action)?.dynamic_modifiers.clone())
    }

    fn perform(
        &self,
        action: &Candidate,
        items: &[Candidate],
        modifiers: &[Candidate],
    ) -> anyhow::Result<Vec<Candidate>> {
        let spec = self.action(action)?;
        if let Some(bad) = items.iter().find(|item| !spec.accepts_item(item)) {
            anyhow::bail!("{} does not accept {}", spec.uid, bad.uid);
        }
        if spec.modifiers_required && modifiers.is_empty() {
            anyhow::bail!("{} requires a modifier item", spec.uid);
        }
        Ok(items.to_vec())
    }
}
