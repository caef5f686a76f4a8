//! Normalized candidate structs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a rankable entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Item,
    Action,
    /// A candidate that is itself a catalog; drilling in lists its children.
    Source,
}

impl CandidateKind {
    pub const ALL: [CandidateKind; 3] = [
        CandidateKind::Item,
        CandidateKind::Action,
        CandidateKind::Source,
    ];

    fn bit(self) -> u8 {
        match self {
            CandidateKind::Item => 0b001,
            CandidateKind::Action => 0b010,
            CandidateKind::Source => 0b100,
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CandidateKind::Item => "item",
            CandidateKind::Action => "action",
            CandidateKind::Source => "source",
        };
        f.write_str(label)
    }
}

/// Small set of [`CandidateKind`]s, used for type filters and accepted types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<CandidateKind>", into = "Vec<CandidateKind>")]
pub struct KindSet(u8);

impl KindSet {
    pub const EMPTY: KindSet = KindSet(0);
    pub const ALL: KindSet = KindSet(0b111);

    pub fn of(kinds: &[CandidateKind]) -> Self {
        kinds.iter().copied().collect()
    }

    pub fn contains(self, kind: CandidateKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: CandidateKind) {
        self.0 |= kind.bit();
    }

    pub fn union(self, other: KindSet) -> KindSet {
        KindSet(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = CandidateKind> {
        CandidateKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<CandidateKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = CandidateKind>>(iter: I) -> Self {
        let mut set = KindSet::EMPTY;
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl From<Vec<CandidateKind>> for KindSet {
    fn from(kinds: Vec<CandidateKind>) -> Self {
        kinds.into_iter().collect()
    }
}

impl From<KindSet> for Vec<CandidateKind> {
    fn from(set: KindSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Prefix used for candidates synthesized from free text.
pub const TEXT_UID_PREFIX: &str = "text:";

/// Any rankable entity owned by the external catalog.
///
/// `uid` is the stable identity used as the relevance key; `relevance` and
/// `score` are transient and recomputed for every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub kind: CandidateKind,
    /// Candidate carries free text rather than a catalog entity.
    #[serde(default)]
    pub is_text: bool,
    /// Actions only: modifier items must be supplied before the action runs.
    #[serde(default)]
    pub modifiers_required: bool,
    #[serde(skip)]
    pub relevance: f32,
    #[serde(skip)]
    pub score: f32,
}

impl Candidate {
    pub fn new(uid: impl Into<String>, name: impl Into<String>, kind: CandidateKind) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            description: String::new(),
            icon: String::new(),
            kind,
            is_text: false,
            modifiers_required: false,
            relevance: 0.0,
            score: 0.0,
        }
    }

    pub fn item(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(uid, name, CandidateKind::Item)
    }

    pub fn action(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(uid, name, CandidateKind::Action)
    }

    pub fn source(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(uid, name, CandidateKind::Source)
    }

    /// Text item standing for whatever the user typed.
    pub fn text(text: &str) -> Self {
        let mut candidate = Self::item(format!("{TEXT_UID_PREFIX}{text}"), text);
        candidate.is_text = true;
        candidate
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_required_modifiers(mut self) -> Self {
        self.modifiers_required = true;
        self
    }

    pub fn is_action(&self) -> bool {
        self.kind == CandidateKind::Action
    }

    pub fn is_source(&self) -> bool {
        self.kind == CandidateKind::Source
    }
}

/// One of the three dependent search slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Pane {
    First,
    Second,
    Third,
}

impl Pane {
    pub const ALL: [Pane; 3] = [Pane::First, Pane::Second, Pane::Third];

    pub fn index(self) -> usize {
        match self {
            Pane::First => 0,
            Pane::Second => 1,
            Pane::Third => 2,
        }
    }

    /// Pane whose selection this pane depends on.
    pub fn upstream(self) -> Option<Pane> {
        match self {
            Pane::First => None,
            Pane::Second => Some(Pane::First),
            Pane::Third => Some(Pane::Second),
        }
    }

    pub fn downstream(self) -> Option<Pane> {
        match self {
            Pane::First => Some(Pane::Second),
            Pane::Second => Some(Pane::Third),
            Pane::Third => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_set_membership() {
        let set = KindSet::of(&[CandidateKind::Item, CandidateKind::Source]);
        assert!(set.contains(CandidateKind::Item));
        assert!(!set.contains(CandidateKind::Action));
        assert_eq!(set.iter().count(), 2);
        assert!(KindSet::EMPTY.is_empty());
        assert_eq!(set.union(KindSet::of(&[CandidateKind::Action])), KindSet::ALL);
    }

    #[test]
    fn kind_set_serializes_as_list() {
        let set = KindSet::of(&[CandidateKind::Action]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["action"]"#);
        let back: KindSet = serde_json::from_str(r#"["item","source"]"#).unwrap();
        assert!(back.contains(CandidateKind::Source));
    }

    #[test]
    fn text_candidate_is_marked() {
        let c = Candidate::text("hello world");
        assert!(c.is_text);
        assert_eq!(c.uid, "text:hello world");
        assert_eq!(c.kind, CandidateKind::Item);
    }

    #[test]
    fn pane_chain_links() {
        assert_eq!(Pane::First.upstream(), None);
        assert_eq!(Pane::Second.upstream(), Some(Pane::First));
        assert_eq!(Pane::Third.downstream(), None);
        assert_eq!(Pane::Third.index(), 2);
    }
}
