//! Learned relevance: a per-candidate usage histogram with time decay.
//!
//! Every time the user picks a candidate for a typed abbreviation the store
//! records a hit, remembering which leading characters led there. Lookups
//! blend that learned popularity with the memoryless abbreviation score:
//!
//! ```text
//! relevance = learned * 0.30 + abbrev::score(name, query) * 0.70
//! ```
//!
//! Learned popularity is gated on the first typed character, decays with the
//! age of the last hit (never below half), and is penalized for actions that
//! are rarely chosen first or that demand modifier items, and for candidates
//! that are themselves sources.

use std::sync::Arc;

use chrono::Utc;
use fxhash::{FxHashMap, FxHashSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::types::Candidate;
use crate::search::abbrev;

/// Weight of learned usage in the final blend.
pub const RELEVANCE_WEIGHT: f32 = 0.30;
/// Weight of the abbreviation score in the final blend.
pub const SCORE_WEIGHT: f32 = 0.70;

/// Numerator of the baseline relevance for unknown candidates.
const UNKNOWN_BASELINE: f32 = 0.01;
/// Actions picked directly in the first pane fewer times than this are penalized.
const MIN_FIRST_PANE_HITS: u32 = 3;
const ACTION_PENALTY: f32 = 0.8;
const SOURCE_PENALTY: f32 = 0.4;

/// Candidates that start out at full learned relevance before any usage.
pub const DEFAULT_POPULAR: &[&str] = &[
    "action.open",
    "action.run",
    "action.open-url",
    "action.open-folder",
    "action.run-in-terminal",
];

/// Store handle shared between the engine and the periodic saver.
pub type SharedRelevance = Arc<RwLock<RelevanceStore>>;

/// Persisted usage record for one candidate UID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceRecord {
    pub hits: u32,
    /// Hits recorded without an upstream context (chosen in the first pane).
    pub first_pane_hits: u32,
    /// Unix millis of the most recent hit.
    pub last_hit: i64,
    /// Lowercased leading characters of the queries that led to this candidate.
    pub first_chars: SmallVec<[char; 8]>,
}

impl RelevanceRecord {
    fn new(now: i64) -> Self {
        Self {
            hits: 0,
            first_pane_hits: 0,
            last_hit: now,
            first_chars: SmallVec::new(),
        }
    }

    /// Whether this record's popularity applies to `query`.
    pub fn is_relevant_for(&self, query: &str) -> bool {
        match leading_char(query) {
            None => true,
            Some(ch) => self.first_chars.contains(&ch),
        }
    }

    fn register_first_char(&mut self, query: &str) {
        if let Some(ch) = leading_char(query)
            && !self.first_chars.contains(&ch)
        {
            self.first_chars.push(ch);
        }
    }
}

/// Everything the store persists, as one serializable blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelevanceSnapshot {
    pub max_item_hits: u32,
    pub max_action_hits: u32,
    pub newest_hit: i64,
    pub oldest_hit: i64,
    pub records: FxHashMap<String, RelevanceRecord>,
}

/// Summary numbers for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelevanceStats {
    pub records: usize,
    pub total_hits: u64,
    pub max_item_hits: u32,
    pub max_action_hits: u32,
    pub newest_hit: i64,
    pub oldest_hit: i64,
}

#[derive(Debug, Clone)]
pub struct RelevanceStore {
    state: RelevanceSnapshot,
    popular: FxHashSet<String>,
    generation: u64,
}

impl Default for RelevanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RelevanceStore {
    pub fn new() -> Self {
        Self::from_snapshot(RelevanceSnapshot::default())
    }

    pub fn from_snapshot(state: RelevanceSnapshot) -> Self {
        Self {
            state,
            popular: DEFAULT_POPULAR.iter().map(|uid| (*uid).to_string()).collect(),
            generation: 0,
        }
    }

    /// Replace the allow-list of naturally popular candidate UIDs.
    pub fn with_popular<I, S>(mut self, uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.popular = uids.into_iter().map(Into::into).collect();
        self
    }

    pub fn into_shared(self) -> SharedRelevance {
        Arc::new(RwLock::new(self))
    }

    pub fn snapshot(&self) -> RelevanceSnapshot {
        self.state.clone()
    }

    /// Bumped on every mutation; the saver skips writes when it is unchanged.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, uid: &str) -> Option<&RelevanceRecord> {
        self.state.records.get(uid)
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &RelevanceRecord)> {
        self.state.records.iter()
    }

    pub fn len(&self) -> usize {
        self.state.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.records.is_empty()
    }

    pub fn stats(&self) -> RelevanceStats {
        RelevanceStats {
            records: self.state.records.len(),
            total_hits: self.state.records.values().map(|r| u64::from(r.hits)).sum(),
            max_item_hits: self.state.max_item_hits,
            max_action_hits: self.state.max_action_hits,
            newest_hit: self.state.newest_hit,
            oldest_hit: self.state.oldest_hit,
        }
    }

    /// Record that `candidate` was chosen after typing `query`.
    ///
    /// `context` is the UID of the upstream selection; `None` means the
    /// candidate was picked in the first pane.
    pub fn increase(&mut self, candidate: &Candidate, query: &str, context: Option<&str>) {
        self.increase_at(candidate, query, context, Utc::now().timestamp_millis());
    }

    pub fn increase_at(
        &mut self,
        candidate: &Candidate,
        query: &str,
        context: Option<&str>,
        now: i64,
    ) {
        let state = &mut self.state;
        if state.records.is_empty() && state.oldest_hit == 0 {
            state.oldest_hit = now;
        }
        state.newest_hit = state.newest_hit.max(now);

        let record = state
            .records
            .entry(candidate.uid.clone())
            .or_insert_with(|| RelevanceRecord::new(now));
        record.hits = record.hits.saturating_add(1);
        if context.is_none() {
            record.first_pane_hits = record.first_pane_hits.saturating_add(1);
        }
        record.last_hit = now;
        record.register_first_char(query);

        let hits = record.hits;
        if candidate.is_action() {
            state.max_action_hits = state.max_action_hits.max(hits);
        } else {
            state.max_item_hits = state.max_item_hits.max(hits);
        }
        self.generation += 1;
        tracing::debug!(uid = %candidate.uid, hits, query, "relevance increased");
    }

    /// Undo one hit; the record is dropped once it has no hits left.
    pub fn decrease(&mut self, candidate: &Candidate, query: &str, context: Option<&str>) {
        let Some(record) = self.state.records.get_mut(&candidate.uid) else {
            return;
        };
        record.hits = record.hits.saturating_sub(1);
        if context.is_none() {
            record.first_pane_hits = record.first_pane_hits.saturating_sub(1);
        }
        let hits = record.hits;
        if hits == 0 {
            self.state.records.remove(&candidate.uid);
        }
        self.generation += 1;
        tracing::debug!(uid = %candidate.uid, hits, query, "relevance decreased");
    }

    /// Remove every trace of `uid`. Returns whether a record existed.
    pub fn forget(&mut self, uid: &str) -> bool {
        let removed = self.state.records.remove(uid).is_some();
        if removed {
            self.generation += 1;
        }
        removed
    }

    /// Blend of learned usage and abbreviation score for `candidate` under `query`.
    ///
    /// Never resurrects a candidate whose abbreviation score is zero.
    pub fn relevance(&self, candidate: &Candidate, query: &str) -> f32 {
        self.blend(candidate, query, abbrev::score(&candidate.name, query))
    }

    /// [`Self::relevance`] with the abbreviation score already computed.
    pub fn blend(&self, candidate: &Candidate, query: &str, score: f32) -> f32 {
        if score == 0.0 {
            return 0.0;
        }

        let record = self.state.records.get(&candidate.uid);
        let usable = record.filter(|r| r.hits > 0 && r.is_relevant_for(query));

        let mut learned = match usable {
            Some(record) => {
                let age = self.age_of(record);
                let max_hits = if candidate.is_action() {
                    self.state.max_action_hits
                } else {
                    self.state.max_item_hits
                };
                let learned = record.hits as f32 / max_hits.max(1) as f32;
                learned * (1.0 - age / 2.0)
            }
            None if self.popular.contains(&candidate.uid) => 1.0,
            None => UNKNOWN_BASELINE / candidate.name.chars().count().max(1) as f32,
        };

        if candidate.is_action() {
            let first_pane_hits = record.map_or(0, |r| r.first_pane_hits);
            if first_pane_hits < MIN_FIRST_PANE_HITS {
                learned *= ACTION_PENALTY;
            }
            if candidate.modifiers_required {
                learned *= ACTION_PENALTY;
            }
        }
        if candidate.is_source() {
            learned *= SOURCE_PENALTY;
        }

        learned * RELEVANCE_WEIGHT + score * SCORE_WEIGHT
    }

    /// Age of the record's last hit relative to the store's hit span, in `[0, 1]`.
    fn age_of(&self, record: &RelevanceRecord) -> f32 {
        let span = self.state.newest_hit - self.state.oldest_hit;
        if span <= 0 {
            return 0.0;
        }
        let age = (self.state.newest_hit - record.last_hit) as f32 / span as f32;
        age.clamp(0.0, 1.0)
    }
}

fn leading_char(query: &str) -> Option<char> {
    query.chars().next().and_then(|c| c.to_lowercase().next())
}
