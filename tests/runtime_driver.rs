mod util;

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use quicklaunch::catalog::{Catalog, CatalogIndex};
use quicklaunch::config::EngineConfig;
use quicklaunch::engine::{Engine, EngineEvent};
use quicklaunch::model::types::{Candidate, Pane};
use quicklaunch::runtime::{self, Command};
use quicklaunch::search::relevance::RelevanceStore;
use util::desktop_index;

fn fast_config() -> EngineConfig {
    EngineConfig {
        debounce: Duration::from_millis(20),
        search_budget: Duration::from_millis(40),
        ..EngineConfig::default()
    }
}

/// Block until a `SearchFinished` for `pane` whose selection satisfies `pred`.
fn wait_finished(
    events: &Receiver<EngineEvent>,
    pane: Pane,
    pred: impl Fn(Option<&Candidate>) -> bool,
) -> EngineEvent {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let left = deadline.saturating_duration_since(std::time::Instant::now());
        let event = events.recv_timeout(left).expect("engine event before timeout");
        if let EngineEvent::SearchFinished { selection, .. } = &event
            && event.pane() == pane
            && pred(selection.as_ref())
        {
            return event;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dependent_pane_settles_on_its_own() {
    let store = RelevanceStore::new().into_shared();
    let engine = Engine::new(desktop_index(vec![]), store.clone(), fast_config());
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let (handle, task) = runtime::spawn(engine, events_tx);

    assert!(handle.send(Command::SetString(Pane::First, "fir".into())));
    wait_finished(&events_rx, Pane::Second, |sel| {
        sel.is_some_and(|c| c.uid == "action.open")
    });

    let second = handle.context(Pane::Second).await.unwrap();
    assert_eq!(second.results.len(), 2);

    let execution = handle.commit().await.expect("open firefox");
    assert_eq!(execution.action.uid, "action.open");
    assert_eq!(store.read().get("app.firefox").map(|r| r.hits), Some(1));

    handle.shutdown();
    let engine = task.await.unwrap();
    assert_eq!(engine.current_context(Pane::First).query, "");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flush_settles_without_waiting() {
    let config = EngineConfig {
        debounce: Duration::from_secs(60),
        ..fast_config()
    };
    let engine = Engine::new(desktop_index(vec![]), RelevanceStore::new().into_shared(), config);
    let (events_tx, _events_rx) = crossbeam_channel::unbounded();
    let (handle, task) = runtime::spawn(engine, events_tx);

    handle.send(Command::SetString(Pane::First, "quarterly".into()));
    assert!(handle.flush().await);
    let second = handle.context(Pane::Second).await.unwrap();
    assert!(second.results.iter().any(|c| c.uid == "action.move"));

    drop(handle);
    task.await.unwrap();
}

struct Growing(Arc<Mutex<Vec<Candidate>>>);

impl Catalog for Growing {
    fn name(&self) -> &str {
        "growing"
    }
    fn all_candidates(&self) -> anyhow::Result<Vec<Candidate>> {
        Ok(self.0.lock().clone())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn catalog_refresh_reaches_first_pane() {
    let items = Arc::new(Mutex::new(vec![Candidate::item("app.vim", "Vim")]));
    let catalog = Arc::new(CatalogIndex::build(vec![Arc::new(Growing(items.clone()))]));
    let engine = Engine::new(catalog, RelevanceStore::new().into_shared(), fast_config());
    let (events_tx, _events_rx) = crossbeam_channel::unbounded();
    let (handle, task) = runtime::spawn(engine, events_tx);

    items.lock().push(Candidate::item("app.zed", "Zed"));
    handle.send(Command::RefreshCatalog);

    let mut found = false;
    for _ in 0..200 {
        let view = handle.context(Pane::First).await.unwrap();
        if view.results.iter().any(|c| c.uid == "app.zed") {
            found = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(found, "refreshed catalog never reached pane 1");

    handle.shutdown();
    task.await.unwrap();
}
