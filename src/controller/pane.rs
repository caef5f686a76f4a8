//! Per-pane search controller.
//!
//! A [`PaneController`] owns one pane's [`ContextChain`] and the universe of
//! candidates the pane searches. It runs searches synchronously; deciding
//! *when* to search (debounce, budget, upstream changes) is the engine's job.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::catalog::CatalogIndex;
use crate::controller::timer::Timer;
use crate::model::types::{Candidate, KindSet, Pane};
use crate::search::abbrev;
use crate::search::context::{ContextChain, ContextView, DrillFrame, SearchContext};
use crate::search::rank;
use crate::search::relevance::RelevanceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchState {
    #[default]
    Idle,
    Searching,
    Finished,
}

/// What the last `SearchFinished` told the UI, for change detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Reported {
    pub selection: Vec<String>,
    pub query: String,
}

/// Which children of a drilled candidate a pane may show.
#[derive(Debug, Clone, PartialEq)]
pub enum DrillScope {
    /// Children whose kind is in the set.
    Kinds(KindSet),
    /// Direct objects `action` accepts.
    DirectObjects { action: Candidate, kinds: KindSet },
    /// Actions able to run on `items`.
    ActionsFor { items: Vec<Candidate> },
    /// Modifier items for `action` applied to `items`.
    Modifiers {
        action: Candidate,
        items: Vec<Candidate>,
        kinds: KindSet,
    },
}

impl Default for DrillScope {
    fn default() -> Self {
        Self::Kinds(KindSet::ALL)
    }
}

impl DrillScope {
    pub fn admits(&self, catalog: &CatalogIndex, child: &Candidate) -> bool {
        match self {
            Self::Kinds(kinds) => kinds.contains(child.kind),
            Self::DirectObjects { action, kinds } => {
                !child.is_action() && kinds.contains(child.kind) && catalog.supports_item(action, child)
            }
            Self::ActionsFor { items } => child.is_action() && catalog.supports_items(child, items),
            Self::Modifiers { action, items, kinds } => {
                !child.is_action()
                    && kinds.contains(child.kind)
                    && catalog.supports_modifier(action, items, child)
            }
        }
    }
}

/// Everything a pane is rebuilt from.
#[derive(Debug, Clone, Default)]
pub struct PaneUniverse {
    pub candidates: Vec<Candidate>,
    /// Upstream selection the universe was derived from.
    pub context_uid: Option<String>,
    pub enabled: bool,
    /// Prepend a text item for the typed query.
    pub text_item: bool,
    pub drill_scope: DrillScope,
}

impl PaneUniverse {
    /// An enabled, context-free universe over `candidates`.
    pub fn open(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            enabled: true,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub struct PaneController {
    pane: Pane,
    chain: ContextChain,
    universe: Arc<Vec<Candidate>>,
    /// Upstream selection this pane was built for; relevance context for picks here.
    context_uid: Option<String>,
    /// Prepend a text item for the typed query.
    text_item: bool,
    drill_scope: DrillScope,
    enabled: bool,
    state: SearchState,
    rebuilds: u64,
    pub(crate) debounce: Option<Timer>,
    pub(crate) budget: Option<Timer>,
    pub(crate) debounce_started: Option<Instant>,
    pub(crate) reported: Reported,
}

impl PaneController {
    pub fn new(pane: Pane) -> Self {
        Self {
            pane,
            chain: ContextChain::new(),
            universe: Arc::new(Vec::new()),
            context_uid: None,
            text_item: false,
            drill_scope: DrillScope::default(),
            enabled: pane == Pane::First,
            state: SearchState::Idle,
            rebuilds: 0,
            debounce: None,
            budget: None,
            debounce_started: None,
            reported: Reported::default(),
        }
    }

    pub fn pane(&self) -> Pane {
        self.pane
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SearchState) {
        self.state = state;
    }

    /// Whether the pane currently takes part in a command.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of universe rebuilds performed so far.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn context_uid(&self) -> Option<&str> {
        self.context_uid.as_deref()
    }

    pub fn current(&self) -> &SearchContext {
        self.chain.current()
    }

    pub fn chain(&self) -> &ContextChain {
        &self.chain
    }

    pub fn view(&self) -> ContextView {
        self.chain.current().view()
    }

    pub fn query(&self) -> &str {
        &self.chain.current().query
    }

    pub fn selection(&self) -> Option<&Candidate> {
        self.chain.current().selection()
    }

    pub fn selected_items(&self) -> Vec<Candidate> {
        self.chain.current().selected_items()
    }

    pub fn selection_key(&self) -> Vec<String> {
        self.chain.current().selection_key()
    }

    pub fn is_drilled(&self) -> bool {
        self.chain.current().drill.is_some()
    }

    pub fn universe_len(&self) -> usize {
        self.universe.len()
    }

    /// Drop every context and the universe; the pane shows nothing.
    pub fn invalidate(&mut self) {
        self.chain.reset();
        self.universe = Arc::new(Vec::new());
        self.context_uid = None;
        self.state = SearchState::Idle;
    }

    /// Install a freshly built universe and search it with an empty query.
    pub fn rebuild(&mut self, universe: PaneUniverse, store: &RelevanceStore, max_results: usize) {
        self.chain.reset();
        self.universe = Arc::new(universe.candidates);
        self.context_uid = universe.context_uid;
        self.enabled = universe.enabled;
        self.text_item = universe.text_item;
        self.drill_scope = universe.drill_scope;
        self.rebuilds += 1;
        let (results, truncated) = self.search(&self.universe, "", store, max_results);
        let root = self.chain.current_mut();
        root.truncated = truncated;
        root.set_results(results);
        debug!(
            pane = ?self.pane,
            universe = self.universe.len(),
            results = self.chain.current().results().len(),
            "pane universe rebuilt"
        );
    }

    /// Re-run the current query after the catalog or relevance changed,
    /// keeping the cursor on the same candidate where possible.
    pub fn refresh(&mut self, universe: Vec<Candidate>, store: &RelevanceStore, max_results: usize) {
        self.universe = Arc::new(universe);
        let query = self.query().to_string();
        let source = self.active_universe();
        let (results, truncated) = self.search(&source, &query, store, max_results);
        let current = self.chain.current_mut();
        current.truncated = truncated;
        current.refresh_results(results);
    }

    fn active_universe(&self) -> Arc<Vec<Candidate>> {
        match &self.chain.current().drill {
            Some(frame) => frame.universe.clone(),
            None => self.universe.clone(),
        }
    }

    /// Score, blend and rank `universe` against `query`.
    ///
    /// Returns the ranked list and whether it was cut at `max_results`.
    fn search(
        &self,
        universe: &[Candidate],
        query: &str,
        store: &RelevanceStore,
        max_results: usize,
    ) -> (Vec<Candidate>, bool) {
        let started = Instant::now();
        let mut matched: Vec<Candidate> = universe
            .iter()
            .filter(|c| !c.is_text)
            .filter_map(|c| {
                let score = abbrev::score(&c.name, query);
                if score == 0.0 {
                    return None;
                }
                let mut hit = c.clone();
                hit.score = score;
                hit.relevance = store.blend(c, query, score);
                Some(hit)
            })
            .collect();
        let truncated = matched.len() > max_results;
        matched = rank::sort_and_truncate(matched, max_results);
        if self.text_item && !query.is_empty() {
            let mut text = Candidate::text(query);
            text.score = 1.0;
            text.relevance = 1.0;
            matched.insert(0, text);
            matched.truncate(max_results.max(1));
        }
        debug!(
            pane = ?self.pane,
            query,
            scanned = universe.len(),
            results = matched.len(),
            truncated,
            elapsed_us = started.elapsed().as_micros() as u64,
            "pane search"
        );
        (matched, truncated)
    }

    /// Append `ch` to the query, narrowing from the previous results when
    /// they were complete.
    pub fn add_char(&mut self, ch: char, store: &RelevanceStore, max_results: usize, compact_threshold: usize) {
        let current = self.chain.current();
        let mut query = current.query.clone();
        query.push(ch);
        let (results, truncated) = if current.truncated || current.query.is_empty() {
            let source = self.active_universe();
            self.search(&source, &query, store, max_results)
        } else {
            self.search(current.results(), &query, store, max_results)
        };
        self.chain.push_char(ch, results, truncated);
        if self.chain.len() > compact_threshold {
            let dropped = self.chain.compact();
            debug!(pane = ?self.pane, dropped, kept = self.chain.len(), "compacted context arena");
        }
    }

    /// Step back one character. Returns false on an empty query.
    pub fn delete_char(&mut self) -> bool {
        self.chain.pop_char()
    }

    /// Replace the query, one node per character.
    pub fn set_string(&mut self, text: &str, store: &RelevanceStore, max_results: usize, compact_threshold: usize) {
        self.chain.unwind_typing();
        for ch in text.chars() {
            self.add_char(ch, store, max_results, compact_threshold);
        }
    }

    pub fn set_cursor(&mut self, index: usize) {
        self.chain.current_mut().set_cursor(index);
    }

    pub fn move_cursor(&mut self, delta: isize) {
        self.chain.current_mut().move_cursor(delta);
    }

    pub fn toggle_secondary(&mut self, index: usize) -> bool {
        self.chain.current_mut().toggle_secondary(index)
    }

    /// Step into the selection's children. Returns the entered frame, or
    /// `None` when nothing is selected or the selection has no children
    /// passing `type_filter`.
    /// Step into the selection's children, keeping those the pane's
    /// [`DrillScope`] admits.
    pub fn drill_in(
        &mut self,
        catalog: &CatalogIndex,
        store: &RelevanceStore,
        max_results: usize,
    ) -> Option<Arc<DrillFrame>> {
        let origin = self.selection()?.clone();
        let children: Vec<Candidate> = catalog
            .children_of(&origin)
            .into_iter()
            .filter(|c| self.drill_scope.admits(catalog, c))
            .collect();
        if children.is_empty() {
            debug!(pane = ?self.pane, uid = %origin.uid, "nothing to drill into");
            return None;
        }
        let frame = DrillFrame {
            origin,
            query: self.query().to_string(),
            universe: Arc::new(children),
        };
        let (results, truncated) = self.search(&frame.universe, "", store, max_results);
        self.chain.drill_in(frame, results, truncated);
        self.chain.current().drill.clone()
    }

    pub fn drill_out(&mut self) -> Option<Arc<DrillFrame>> {
        self.chain.drill_out()
    }
}
