use std::sync::Arc;
use std::time::Duration;

use quicklaunch::catalog::{ActionSpec, Catalog, CatalogFile, CatalogIndex, FileCatalog};
use quicklaunch::config::EngineConfig;
use quicklaunch::controller::ManualClock;
use quicklaunch::engine::{Engine, EngineEvent};
use quicklaunch::model::types::{Candidate, CandidateKind, KindSet, Pane};
use quicklaunch::search::relevance::{RelevanceStore, SharedRelevance};

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A small desktop: three apps, a report, two folders, five actions.
#[allow(dead_code)]
pub fn desktop_file() -> CatalogFile {
    let item = KindSet::of(&[CandidateKind::Item]);
    let item_or_source = KindSet::of(&[CandidateKind::Item, CandidateKind::Source]);
    CatalogFile::new("desktop")
        .entry(Candidate::item("app.firefox", "Firefox"))
        .entry(Candidate::item("app.files", "Files"))
        .entry(Candidate::item("app.gimp", "GIMP"))
        .entry(Candidate::item("doc.report", "Quarterly Report"))
        .entry_with_children(
            Candidate::source("dir.docs", "Documents"),
            vec![
                Candidate::item("doc.cv", "cv.pdf"),
                Candidate::item("doc.notes", "notes.txt"),
                Candidate::source("dir.docs.old", "archive"),
            ],
        )
        .entry(Candidate::source("dir.downloads", "Downloads"))
        .action(ActionSpec::new("action.open", "Open", item_or_source))
        .action(
            ActionSpec::new("action.move", "Move To...", item)
                .only("doc.")
                .with_modifiers(KindSet::of(&[CandidateKind::Source]), true),
        )
        .action(
            ActionSpec::new("action.compress", "Compress", item)
                .with_modifiers(item, false)
                .with_dynamic_modifier(Candidate::item("fmt.zip", "zip"))
                .with_dynamic_modifier(Candidate::item("fmt.tar", "tar.gz")),
        )
        .action(ActionSpec::new("action.search", "Search Web", KindSet::EMPTY).accepting_text())
}

#[allow(dead_code)]
pub fn desktop_index(extra: Vec<Arc<dyn Catalog>>) -> Arc<CatalogIndex> {
    let mut sources: Vec<Arc<dyn Catalog>> = vec![Arc::new(FileCatalog::from_file(desktop_file()))];
    sources.extend(extra);
    Arc::new(CatalogIndex::build(sources))
}

#[allow(dead_code)]
pub fn test_config() -> EngineConfig {
    EngineConfig {
        debounce: Duration::from_millis(200),
        search_budget: Duration::from_millis(300),
        ..EngineConfig::default()
    }
}

/// Engine over `catalog` with a manual clock and an empty store.
#[allow(dead_code)]
pub fn manual_engine(catalog: Arc<CatalogIndex>, clock: &ManualClock) -> (Engine, SharedRelevance) {
    let store = RelevanceStore::new().into_shared();
    let engine = Engine::with_clock(catalog, store.clone(), test_config(), Arc::new(clock.clone()));
    (engine, store)
}

#[allow(dead_code)]
pub fn finished_for(events: &[EngineEvent], pane: Pane) -> Vec<&EngineEvent> {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::SearchFinished { .. }) && e.pane() == pane)
        .collect()
}

#[allow(dead_code)]
pub fn selected_uid(engine: &Engine, pane: Pane) -> Option<String> {
    engine.controller(pane).selection().map(|c| c.uid.clone())
}
