//! UI-facing engine: three chained pane controllers driven from one thread.
//!
//! All state transitions happen inside `&mut self` calls, so nothing here
//! locks except the shared relevance store. Timers are not real sleeps: the
//! owner asks for [`Engine::next_deadline`], waits, then calls
//! [`Engine::poll_timers`]. Events accumulate in an outbox drained with
//! [`Engine::drain_events`].
//!
//! Pane dependencies flow one way. When a pane reports a changed selection,
//! everything downstream is dropped and the next pane is rebuilt after the
//! debounce. A pending debounce is cancelled by any further upstream change,
//! so only the last selection in a burst is ever searched.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::CatalogIndex;
use crate::config::EngineConfig;
use crate::controller::pane::{DrillScope, PaneController, PaneUniverse, Reported, SearchState};
use crate::controller::timer::{Clock, SystemClock, Timer, TimerKind, TimerQueue};
use crate::model::types::{Candidate, CandidateKind, KindSet, Pane};
use crate::search::context::ContextView;
use crate::search::relevance::SharedRelevance;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    SearchStarted {
        pane: Pane,
        upstream_triggered: bool,
    },
    SearchFinished {
        pane: Pane,
        selection_changed: bool,
        query_changed: bool,
        selection: Option<Candidate>,
        query: String,
    },
}

impl EngineEvent {
    pub fn pane(&self) -> Pane {
        match self {
            EngineEvent::SearchStarted { pane, .. } | EngineEvent::SearchFinished { pane, .. } => *pane,
        }
    }
}

/// Outcome of [`Engine::commit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub action: Candidate,
    pub items: Vec<Candidate>,
    pub modifiers: Vec<Candidate>,
    /// Candidates the action returned.
    pub produced: Vec<Candidate>,
    pub error: Option<String>,
}

pub struct Engine {
    catalog: Arc<CatalogIndex>,
    store: SharedRelevance,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    panes: [PaneController; 3],
    timers: TimerQueue,
    events: Vec<EngineEvent>,
    text_mode: bool,
    type_filter: KindSet,
    focus: Pane,
}

impl Engine {
    pub fn new(catalog: Arc<CatalogIndex>, store: SharedRelevance, config: EngineConfig) -> Self {
        Self::with_clock(catalog, store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        catalog: Arc<CatalogIndex>,
        store: SharedRelevance,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut engine = Self {
            catalog,
            store,
            clock,
            config,
            panes: Pane::ALL.map(PaneController::new),
            timers: TimerQueue::new(),
            events: Vec::new(),
            text_mode: false,
            type_filter: KindSet::ALL,
            focus: Pane::First,
        };
        engine.rebuild_pane(Pane::First);
        engine.finish(Pane::First);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<CatalogIndex> {
        &self.catalog
    }

    pub fn store(&self) -> &SharedRelevance {
        &self.store
    }

    pub fn controller(&self, pane: Pane) -> &PaneController {
        &self.panes[pane.index()]
    }

    pub fn focused(&self) -> Pane {
        self.focus
    }

    pub fn text_mode(&self) -> bool {
        self.text_mode
    }

    pub fn type_filter(&self) -> KindSet {
        self.type_filter
    }

    pub fn current_context(&self, pane: Pane) -> ContextView {
        self.panes[pane.index()].view()
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Fire every timer that is due. Returns how many fired.
    pub fn poll_timers(&mut self) -> usize {
        let mut fired = 0;
        while let Some(timer) = self.timers.pop_due(self.clock.now()) {
            self.on_timer(timer);
            fired += 1;
        }
        fired
    }

    /// Settle every pending timer right away, without budget padding.
    pub fn flush_all(&mut self) {
        self.settle_through(Pane::Third);
    }

    // ---- user operations ------------------------------------------------

    pub fn add_char(&mut self, pane: Pane, ch: char) {
        if !self.begin(pane, true) {
            return;
        }
        let store = self.store.read();
        self.panes[pane.index()].add_char(
            ch,
            &store,
            self.config.max_results,
            self.config.compact_threshold,
        );
        drop(store);
        self.finish(pane);
    }

    pub fn delete_char(&mut self, pane: Pane) {
        if !self.begin(pane, false) {
            return;
        }
        if self.panes[pane.index()].delete_char() {
            self.finish(pane);
        }
    }

    /// Replace the pane's query as if it had been typed character by character.
    pub fn set_string(&mut self, pane: Pane, text: &str) {
        if !self.begin(pane, true) {
            return;
        }
        let store = self.store.read();
        self.panes[pane.index()].set_string(
            text,
            &store,
            self.config.max_results,
            self.config.compact_threshold,
        );
        drop(store);
        self.finish(pane);
    }

    pub fn set_cursor(&mut self, pane: Pane, index: usize) {
        if self.begin(pane, false) {
            self.panes[pane.index()].set_cursor(index);
            self.finish(pane);
        }
    }

    pub fn move_cursor(&mut self, pane: Pane, delta: isize) {
        if self.begin(pane, false) {
            self.panes[pane.index()].move_cursor(delta);
            self.finish(pane);
        }
    }

    pub fn toggle_secondary_cursor(&mut self, pane: Pane, index: usize) {
        if self.begin(pane, false) && self.panes[pane.index()].toggle_secondary(index) {
            self.finish(pane);
        }
    }

    /// Step into the selection's children. The stepped-over candidate gains
    /// relevance for the query that led to it.
    pub fn drill_in(&mut self, pane: Pane) -> bool {
        if !self.begin(pane, true) {
            return false;
        }
        let frame = {
            let store = self.store.read();
            self.panes[pane.index()].drill_in(&self.catalog, &store, self.config.max_results)
        };
        let Some(frame) = frame else {
            self.finish(pane);
            return false;
        };
        let context = self.panes[pane.index()].context_uid().map(String::from);
        self.store
            .write()
            .increase(&frame.origin, &frame.query, context.as_deref());
        self.finish(pane);
        true
    }

    /// Leave the current drill; the candidate it went through loses the
    /// relevance it gained on the way in.
    pub fn drill_out(&mut self, pane: Pane) -> bool {
        if !self.begin(pane, false) {
            return false;
        }
        let Some(frame) = self.panes[pane.index()].drill_out() else {
            return false;
        };
        let context = self.panes[pane.index()].context_uid().map(String::from);
        self.store
            .write()
            .decrease(&frame.origin, &frame.query, context.as_deref());
        self.finish(pane);
        true
    }

    /// Drop `pane`'s whole chain (and everything downstream) and search its
    /// universe afresh.
    pub fn reset(&mut self, pane: Pane) {
        self.settle_through(pane.upstream().unwrap_or(Pane::First));
        self.invalidate_from(pane);
        self.rebuild_pane(pane);
        self.finish(pane);
    }

    pub fn reset_all(&mut self) {
        self.reset(Pane::First);
    }

    /// Move focus; a pane with a pending rebuild is rebuilt immediately.
    pub fn focus(&mut self, pane: Pane) {
        self.focus = pane;
        self.settle_through(pane);
    }

    pub fn set_text_mode(&mut self, enabled: bool) {
        if self.text_mode != enabled {
            self.text_mode = enabled;
            self.reset_all();
        }
    }

    pub fn set_type_filter(&mut self, filter: KindSet) {
        if self.type_filter != filter {
            self.type_filter = filter;
            self.reset_all();
        }
    }

    /// Run the command the panes currently spell out.
    ///
    /// Returns `None` when no action is selected or a required modifier is
    /// missing. Every pane is reset afterwards.
    pub fn commit(&mut self) -> Option<Execution> {
        self.flush_all();
        let first = self.panes[0].selection()?.clone();
        let second = self.panes[1].selection().cloned();
        let third = self.panes[2]
            .is_enabled()
            .then(|| self.panes[2].selection().cloned())
            .flatten();

        let (action, items) = if first.is_action() {
            (first.clone(), self.panes[1].selected_items())
        } else {
            match &second {
                Some(action) if action.is_action() => (action.clone(), self.panes[0].selected_items()),
                _ => {
                    debug!(uid = %first.uid, "commit without an action");
                    return None;
                }
            }
        };
        let modifiers = if third.is_some() {
            self.panes[2].selected_items()
        } else {
            Vec::new()
        };
        if action.modifiers_required && modifiers.is_empty() {
            warn!(action = %action.uid, "action needs modifier items; nothing executed");
            return None;
        }

        {
            let mut store = self.store.write();
            let q1 = self.panes[0].query();
            if !first.is_text {
                store.increase(&first, q1, None);
            }
            if let Some(second) = second.as_ref().filter(|c| !c.is_text) {
                store.increase(second, self.panes[1].query(), Some(&first.uid));
            }
            if let Some(third) = third.as_ref().filter(|c| !c.is_text) {
                store.increase(third, self.panes[2].query(), Some(&action.uid));
            }
        }

        let (produced, error) = match self.catalog.perform(&action, &items, &modifiers) {
            Ok(produced) => (produced, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        info!(
            action = %action.uid,
            items = items.len(),
            modifiers = modifiers.len(),
            ok = error.is_none(),
            "command executed"
        );
        self.reset_all();
        Some(Execution {
            action,
            items,
            modifiers,
            produced,
            error,
        })
    }

    /// The catalog snapshot was replaced; re-run pane 1 in place and rebuild
    /// the rest.
    pub fn catalog_refreshed(&mut self) {
        self.settle_through(Pane::Third);
        let universe = self.universe_for(Pane::First);
        {
            let store = self.store.read();
            self.panes[0].refresh(universe.candidates, &store, self.config.max_results);
        }
        if !self.finish(Pane::First) {
            self.invalidate_from(Pane::Second);
            self.schedule_debounce(Pane::Second);
        }
    }

    // ---- internals ------------------------------------------------------

    /// Common prologue of a user operation on `pane`. Returns whether the
    /// pane accepts input.
    fn begin(&mut self, pane: Pane, searching: bool) -> bool {
        self.settle_through(pane);
        let ctrl = &mut self.panes[pane.index()];
        if !ctrl.is_enabled() {
            debug!(pane = ?pane, "ignoring input for disabled pane");
            return false;
        }
        if searching {
            ctrl.set_state(SearchState::Searching);
            self.events.push(EngineEvent::SearchStarted {
                pane,
                upstream_triggered: false,
            });
        }
        true
    }

    /// Resolve pending timers of every pane up to and including `last`, in
    /// dependency order.
    fn settle_through(&mut self, last: Pane) {
        for pane in Pane::ALL.into_iter().filter(|p| *p <= last) {
            let ctrl = &mut self.panes[pane.index()];
            let debounce = ctrl.debounce.take();
            let budget = ctrl.budget.take();
            ctrl.debounce_started = None;
            if let Some(timer) = &budget {
                self.timers.cancel(timer);
            }
            if let Some(timer) = debounce {
                self.timers.cancel(&timer);
                debug!(pane = ?pane, "pending rebuild flushed");
                self.rebuild_pane(pane);
                self.finish(pane);
            } else if budget.is_some() {
                self.finish(pane);
            }
        }
    }

    fn on_timer(&mut self, timer: Timer) {
        let pane = timer.pane;
        let ctrl = &mut self.panes[pane.index()];
        match timer.kind {
            TimerKind::Debounce => {
                if ctrl.debounce.as_ref() != Some(&timer) {
                    return;
                }
                ctrl.debounce = None;
                let started = ctrl.debounce_started.take().unwrap_or(timer.deadline);
                self.rebuild_pane(pane);
                let release = started + self.config.search_budget;
                let now = self.clock.now();
                if now < release {
                    let budget = self.timers.schedule(pane, TimerKind::Budget, release);
                    self.panes[pane.index()].budget = Some(budget);
                    debug!(
                        pane = ?pane,
                        wait_ms = (release - now).as_millis() as u64,
                        "rebuild finished early; holding results until budget"
                    );
                } else {
                    debug!(
                        pane = ?pane,
                        overrun_ms = (now - release).as_millis() as u64,
                        "rebuild overran budget"
                    );
                    self.finish(pane);
                }
            }
            TimerKind::Budget => {
                if ctrl.budget.as_ref() != Some(&timer) {
                    return;
                }
                ctrl.budget = None;
                self.finish(pane);
            }
        }
    }

    /// Publish `SearchFinished` for `pane` and push the consequences
    /// downstream. Returns whether the selection changed.
    fn finish(&mut self, pane: Pane) -> bool {
        let ctrl = &mut self.panes[pane.index()];
        ctrl.set_state(SearchState::Finished);
        let reported = Reported {
            selection: ctrl.selection_key(),
            query: ctrl.query().to_string(),
        };
        let selection_changed = reported.selection != ctrl.reported.selection;
        let query_changed = reported.query != ctrl.reported.query;
        let selection = ctrl.selection().cloned();
        let query = reported.query.clone();
        ctrl.reported = reported;
        self.events.push(EngineEvent::SearchFinished {
            pane,
            selection_changed,
            query_changed,
            selection,
            query,
        });

        if let Some(down) = pane.downstream() {
            if selection_changed {
                self.invalidate_from(down);
                self.schedule_debounce(down);
            } else if let Some(timer) = self.panes[down.index()].debounce.take() {
                // Still settling upstream; restart the quiet period.
                self.timers.cancel(&timer);
                self.schedule_debounce(down);
            }
        }
        selection_changed
    }

    fn schedule_debounce(&mut self, pane: Pane) {
        let now = self.clock.now();
        let timer = self
            .timers
            .schedule(pane, TimerKind::Debounce, now + self.config.debounce);
        let ctrl = &mut self.panes[pane.index()];
        ctrl.debounce = Some(timer);
        ctrl.debounce_started = Some(now);
        ctrl.set_state(SearchState::Searching);
        self.events.push(EngineEvent::SearchStarted {
            pane,
            upstream_triggered: true,
        });
        debug!(pane = ?pane, debounce_ms = self.config.debounce.as_millis() as u64, "rebuild scheduled");
    }

    /// Drop `from` and every later pane, cancelling their timers.
    fn invalidate_from(&mut self, from: Pane) {
        for pane in Pane::ALL.into_iter().filter(|p| *p >= from) {
            let ctrl = &mut self.panes[pane.index()];
            for timer in [ctrl.debounce.take(), ctrl.budget.take()].into_iter().flatten() {
                self.timers.cancel(&timer);
            }
            let ctrl = &mut self.panes[pane.index()];
            ctrl.debounce_started = None;
            let was_showing = !ctrl.reported.selection.is_empty();
            ctrl.invalidate();
            ctrl.reported = Reported::default();
            if pane != from && was_showing {
                self.events.push(EngineEvent::SearchFinished {
                    pane,
                    selection_changed: true,
                    query_changed: false,
                    selection: None,
                    query: String::new(),
                });
            }
        }
    }

    fn rebuild_pane(&mut self, pane: Pane) {
        let universe = self.universe_for(pane);
        let store = self.store.read();
        self.panes[pane.index()].rebuild(universe, &store, self.config.max_results);
    }

    fn universe_for(&self, pane: Pane) -> PaneUniverse {
        match pane {
            Pane::First => self.first_universe(),
            Pane::Second => self.second_universe(),
            Pane::Third => self.third_universe(),
        }
    }

    fn first_universe(&self) -> PaneUniverse {
        let snapshot = self.catalog.snapshot();
        let candidates = if self.text_mode {
            let probe = Candidate::text("");
            snapshot
                .candidates
                .iter()
                .filter(|c| c.is_text || (c.is_action() && self.catalog.supports_item(c, &probe)))
                .cloned()
                .collect()
        } else {
            snapshot
                .candidates
                .iter()
                .filter(|c| self.type_filter.contains(c.kind))
                .cloned()
                .collect()
        };
        PaneUniverse {
            candidates,
            context_uid: None,
            enabled: true,
            text_item: self.text_mode,
            drill_scope: DrillScope::Kinds(self.type_filter),
        }
    }

    fn second_universe(&self) -> PaneUniverse {
        let Some(upstream) = self.panes[0].selection() else {
            return PaneUniverse::disabled();
        };
        let snapshot = self.catalog.snapshot();
        let (candidates, text_item, drill_scope) = if upstream.is_action() {
            let accepted = self.catalog.types_accepted(upstream);
            let candidates = snapshot
                .candidates
                .iter()
                .filter(|c| !c.is_action() && accepted.contains(c.kind))
                .filter(|c| self.catalog.supports_item(upstream, c))
                .cloned()
                .collect();
            let text_item = accepted.contains(CandidateKind::Item)
                && self.catalog.supports_item(upstream, &Candidate::text(""));
            let scope = DrillScope::DirectObjects {
                action: upstream.clone(),
                kinds: accepted,
            };
            (candidates, text_item, scope)
        } else {
            let items = self.panes[0].selected_items();
            let candidates = snapshot
                .actions()
                .filter(|action| self.catalog.supports_items(action, &items))
                .cloned()
                .collect();
            (candidates, false, DrillScope::ActionsFor { items })
        };
        PaneUniverse {
            candidates,
            context_uid: Some(upstream.uid.clone()),
            enabled: true,
            text_item,
            drill_scope,
        }
    }

    fn third_universe(&self) -> PaneUniverse {
        let first = self.panes[0].selection();
        let second = self.panes[1].selection();
        let (action, items) = match (first, second) {
            (Some(a), Some(_)) if a.is_action() => (a, self.panes[1].selected_items()),
            (Some(_), Some(a)) if a.is_action() => (a, self.panes[0].selected_items()),
            _ => return PaneUniverse::disabled(),
        };
        let modifier_types = self.catalog.modifier_types(action);
        if modifier_types.is_empty() {
            return PaneUniverse::disabled();
        }
        let snapshot = self.catalog.snapshot();
        let mut candidates: Vec<Candidate> = snapshot
            .candidates
            .iter()
            .filter(|c| !c.is_action() && modifier_types.contains(c.kind))
            .filter(|c| self.catalog.supports_modifier(action, &items, c))
            .cloned()
            .collect();
        for dynamic in self.catalog.dynamic_modifier_items(action, &items) {
            if !candidates.iter().any(|c| c.uid == dynamic.uid) {
                candidates.push(dynamic);
            }
        }
        let text_item = modifier_types.contains(CandidateKind::Item)
            && self
                .catalog
                .supports_modifier(action, &items, &Candidate::text(""));
        PaneUniverse {
            candidates,
            context_uid: Some(action.uid.clone()),
            enabled: true,
            text_item,
            drill_scope: DrillScope::Modifiers {
                action: action.clone(),
                items,
                kinds: modifier_types,
            },
        }
    }
}
