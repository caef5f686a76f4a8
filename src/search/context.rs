//! Search contexts and the chains linking them.
//!
//! A pane's search history is kept in a [`ContextChain`]: an arena of
//! [`SearchContext`] nodes referencing each other by [`ContextId`].
//!
//! ```text
//!   root("") <-prev- "f" <-prev- "fi" <-prev- "fir"      typing chain
//!                     ^
//!                     | parent
//!   drill("") <-prev- "d" <-prev- "do"                   chain inside "f"'s pick
//! ```
//!
//! - **Typing**: every appended character pushes a node whose `previous` is
//!   the node before the keystroke. Backspace just moves back along
//!   `previous`; each node caches its own results so nothing is recomputed.
//! - **Drilling**: stepping into a candidate pushes a node whose `parent` is
//!   the pre-drill node; every node typed inside the drill inherits that
//!   parent, so stepping out from any depth lands on the pre-drill node.

use std::collections::BTreeSet;
use std::sync::Arc;

use fxhash::FxHashMap;
use serde::Serialize;

use crate::model::types::Candidate;

/// Index of a node inside a [`ContextChain`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(usize);

/// The candidate a drilled chain was entered through.
#[derive(Debug, Clone, PartialEq)]
pub struct DrillFrame {
    pub origin: Candidate,
    /// Query typed when the drill happened; used to undo the relevance bump.
    pub query: String,
    /// Children of `origin` that passed the pane's type filter.
    pub universe: Arc<Vec<Candidate>>,
}

/// One snapshot of a pane's search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchContext {
    pub query: String,
    results: Vec<Candidate>,
    cursor: Option<usize>,
    secondary: BTreeSet<usize>,
    /// Node for the query one character shorter.
    pub previous: Option<ContextId>,
    /// Node that was current before drilling into this chain.
    pub parent: Option<ContextId>,
    pub drill: Option<Arc<DrillFrame>>,
    /// Results were cut at the result limit, so they cannot seed narrowing.
    pub truncated: bool,
}

/// What the UI sees of a context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextView {
    pub query: String,
    pub results: Vec<Candidate>,
    pub cursor: Option<usize>,
    pub secondary_cursors: Vec<usize>,
}

impl SearchContext {
    fn empty() -> Self {
        Self {
            query: String::new(),
            results: Vec::new(),
            cursor: None,
            secondary: BTreeSet::new(),
            previous: None,
            parent: None,
            drill: None,
            truncated: false,
        }
    }

    pub fn results(&self) -> &[Candidate] {
        &self.results
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn secondary_cursors(&self) -> impl Iterator<Item = usize> + '_ {
        self.secondary.iter().copied()
    }

    pub fn selection(&self) -> Option<&Candidate> {
        self.cursor.and_then(|i| self.results.get(i))
    }

    /// Secondary selection when there is one, else the cursor candidate.
    pub fn selected_items(&self) -> Vec<Candidate> {
        if self.secondary.is_empty() {
            return self.selection().cloned().into_iter().collect();
        }
        self.secondary
            .iter()
            .filter_map(|i| self.results.get(*i))
            .cloned()
            .collect()
    }

    /// UIDs of [`Self::selected_items`], cheap enough to diff after every mutation.
    pub fn selection_key(&self) -> Vec<String> {
        if self.secondary.is_empty() {
            return self.selection().map(|c| c.uid.clone()).into_iter().collect();
        }
        self.secondary
            .iter()
            .filter_map(|i| self.results.get(*i))
            .map(|c| c.uid.clone())
            .collect()
    }

    /// Move the cursor, clamped into the result bounds.
    pub fn set_cursor(&mut self, index: usize) {
        self.cursor = match self.results.len() {
            0 => None,
            len => Some(index.min(len - 1)),
        };
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let current = self.cursor.unwrap_or(0);
        self.set_cursor(current.saturating_add_signed(delta));
    }

    /// Toggle `index` in the secondary selection. Out-of-range indices are ignored.
    pub fn toggle_secondary(&mut self, index: usize) -> bool {
        if index >= self.results.len() {
            return false;
        }
        if !self.secondary.remove(&index) {
            self.secondary.insert(index);
        }
        true
    }

    /// Install a fresh result list with the cursor on the top entry.
    ///
    /// Secondary cursors follow their candidates by UID; entries missing from
    /// the new list are dropped.
    pub fn set_results(&mut self, results: Vec<Candidate>) {
        self.remap_secondary(&results);
        self.results = results;
        self.set_cursor(0);
    }

    /// Install a recomputed list for the same query, keeping the cursor on
    /// the same candidate when it survived.
    pub fn refresh_results(&mut self, results: Vec<Candidate>) {
        let selected = self.selection().map(|c| c.uid.clone());
        let old_cursor = self.cursor.unwrap_or(0);
        self.remap_secondary(&results);
        self.results = results;
        let position = selected.and_then(|uid| self.results.iter().position(|c| c.uid == uid));
        self.set_cursor(position.unwrap_or(old_cursor));
    }

    fn remap_secondary(&mut self, results: &[Candidate]) {
        if self.secondary.is_empty() {
            return;
        }
        let positions: FxHashMap<&str, usize> = results
            .iter()
            .enumerate()
            .map(|(i, c)| (c.uid.as_str(), i))
            .collect();
        self.secondary = self
            .secondary
            .iter()
            .filter_map(|i| self.results.get(*i))
            .filter_map(|c| positions.get(c.uid.as_str()).copied())
            .collect();
    }

    pub fn view(&self) -> ContextView {
        ContextView {
            query: self.query.clone(),
            results: self.results.clone(),
            cursor: self.cursor,
            secondary_cursors: self.secondary.iter().copied().collect(),
        }
    }
}

/// Arena of contexts plus the pointer to the current one.
#[derive(Debug, Clone)]
pub struct ContextChain {
    nodes: Vec<SearchContext>,
    current: ContextId,
}

impl Default for ContextChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextChain {
    pub fn new() -> Self {
        Self {
            nodes: vec![SearchContext::empty()],
            current: ContextId(0),
        }
    }

    pub fn current(&self) -> &SearchContext {
        &self.nodes[self.current.0]
    }

    pub fn current_mut(&mut self) -> &mut SearchContext {
        &mut self.nodes[self.current.0]
    }

    pub fn current_id(&self) -> ContextId {
        self.current
    }

    pub fn get(&self, id: ContextId) -> Option<&SearchContext> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node and start over from an empty root.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.nodes.push(SearchContext::empty());
        self.current = ContextId(0);
    }

    /// Push the node for `current.query + ch` and make it current.
    pub fn push_char(&mut self, ch: char, results: Vec<Candidate>, truncated: bool) -> ContextId {
        let mut next = self.current().clone();
        next.query.push(ch);
        next.previous = Some(self.current);
        next.truncated = truncated;
        next.set_results(results);
        self.push(next)
    }

    /// Step back to the previous (one character shorter) node.
    pub fn pop_char(&mut self) -> bool {
        match self.current().previous {
            Some(previous) => {
                self.current = previous;
                true
            }
            None => false,
        }
    }

    /// Walk back to the start of the current typing chain.
    pub fn unwind_typing(&mut self) {
        while self.pop_char() {}
    }

    /// Enter `frame`'s children with a fresh, empty query.
    pub fn drill_in(&mut self, frame: DrillFrame, results: Vec<Candidate>, truncated: bool) -> ContextId {
        let mut node = SearchContext::empty();
        node.parent = Some(self.current);
        node.drill = Some(Arc::new(frame));
        node.truncated = truncated;
        node.set_results(results);
        self.push(node)
    }

    /// Leave the current drill, returning the frame that was left.
    pub fn drill_out(&mut self) -> Option<Arc<DrillFrame>> {
        let parent = self.current().parent?;
        let frame = self.current().drill.clone();
        self.current = parent;
        frame
    }

    fn push(&mut self, node: SearchContext) -> ContextId {
        let id = ContextId(self.nodes.len());
        self.nodes.push(node);
        self.current = id;
        id
    }

    /// Rebuild the arena keeping only nodes reachable from the current one.
    ///
    /// Returns the number of nodes dropped. Abandoned branches (typed, then
    /// backspaced over and retyped differently) are what gets collected.
    pub fn compact(&mut self) -> usize {
        let mut reachable = BTreeSet::new();
        let mut stack = vec![self.current];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            let node = &self.nodes[id.0];
            stack.extend(node.previous);
            stack.extend(node.parent);
        }
        let dropped = self.nodes.len() - reachable.len();
        if dropped == 0 {
            return 0;
        }

        let remap: FxHashMap<ContextId, ContextId> = reachable
            .iter()
            .enumerate()
            .map(|(new, old)| (*old, ContextId(new)))
            .collect();
        let old_nodes = std::mem::take(&mut self.nodes);
        self.nodes = old_nodes
            .into_iter()
            .enumerate()
            .filter(|(i, _)| reachable.contains(&ContextId(*i)))
            .map(|(_, mut node)| {
                node.previous = node.previous.and_then(|p| remap.get(&p).copied());
                node.parent = node.parent.and_then(|p| remap.get(&p).copied());
                node
            })
            .collect();
        self.current = remap[&self.current];
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(uids: &[&str]) -> Vec<Candidate> {
        uids.iter().map(|u| Candidate::item(*u, *u)).collect()
    }

    #[test]
    fn empty_context_has_no_cursor() {
        let chain = ContextChain::new();
        assert_eq!(chain.current().cursor(), None);
        assert!(chain.current().selection().is_none());
    }

    #[test]
    fn backspace_restores_structurally_equal_context() {
        let mut chain = ContextChain::new();
        chain.current_mut().set_results(list(&["a", "b", "c"]));
        let before = chain.current().clone();
        chain.push_char('a', list(&["a", "b"]), false);
        chain.push_char('b', list(&["b"]), false);
        chain.push_char('c', Vec::new(), false);
        assert_eq!(chain.current().query, "abc");
        for _ in 0..3 {
            assert!(chain.pop_char());
        }
        assert_eq!(chain.current(), &before);
        assert!(!chain.pop_char());
    }

    #[test]
    fn cursor_is_clamped() {
        let mut ctx = SearchContext::empty();
        ctx.set_results(list(&["a", "b"]));
        ctx.set_cursor(10);
        assert_eq!(ctx.cursor(), Some(1));
        ctx.move_cursor(-5);
        assert_eq!(ctx.cursor(), Some(0));
        ctx.set_results(Vec::new());
        assert_eq!(ctx.cursor(), None);
    }

    #[test]
    fn secondary_cursors_follow_identity() {
        let mut ctx = SearchContext::empty();
        ctx.set_results(list(&["a", "b", "c"]));
        assert!(ctx.toggle_secondary(1));
        assert!(ctx.toggle_secondary(2));
        assert!(!ctx.toggle_secondary(9));
        ctx.set_results(list(&["c", "x", "a"]));
        // "b" vanished, "c" moved to the front.
        assert_eq!(ctx.secondary_cursors().collect::<Vec<_>>(), vec![0]);
        assert_eq!(ctx.selection_key(), vec!["c".to_string()]);
    }

    #[test]
    fn refresh_keeps_cursor_on_same_candidate() {
        let mut ctx = SearchContext::empty();
        ctx.set_results(list(&["a", "b", "c"]));
        ctx.set_cursor(2);
        ctx.refresh_results(list(&["c", "a"]));
        assert_eq!(ctx.selection().map(|c| c.uid.as_str()), Some("c"));
    }

    #[test]
    fn drill_out_returns_to_pre_drill_node_from_any_depth() {
        let mut chain = ContextChain::new();
        chain.push_char('f', list(&["folder"]), false);
        let pre_drill = chain.current_id();
        let frame = DrillFrame {
            origin: Candidate::source("folder", "folder"),
            query: "f".into(),
            universe: Arc::new(list(&["doc", "dot"])),
        };
        chain.drill_in(frame, list(&["doc", "dot"]), false);
        chain.push_char('d', list(&["doc", "dot"]), false);
        chain.push_char('o', list(&["doc", "dot"]), false);
        let left = chain.drill_out().expect("inside a drill");
        assert_eq!(left.origin.uid, "folder");
        assert_eq!(chain.current_id(), pre_drill);
        assert!(chain.drill_out().is_none());
    }

    #[test]
    fn compact_drops_abandoned_branches() {
        let mut chain = ContextChain::new();
        chain.push_char('a', list(&["a"]), false);
        chain.push_char('b', list(&["ab"]), false);
        chain.pop_char();
        chain.pop_char();
        chain.push_char('x', list(&["x"]), false);
        assert_eq!(chain.len(), 4);
        let view = chain.current().view();
        assert_eq!(chain.compact(), 2);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.current().view(), view);
        assert!(chain.pop_char());
        assert_eq!(chain.current().query, "");
    }
}
