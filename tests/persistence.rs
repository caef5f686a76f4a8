mod util;

use std::sync::Arc;

use anyhow::Result;
use quicklaunch::config::EngineConfig;
use quicklaunch::controller::ManualClock;
use quicklaunch::engine::Engine;
use quicklaunch::model::types::Pane;
use quicklaunch::open_store;
use quicklaunch::search::relevance::SharedRelevance;
use quicklaunch::storage::RelevanceFile;
use tempfile::TempDir;
use util::{desktop_index, selected_uid};

fn engine_in(dir: &TempDir, clock: &ManualClock) -> (Engine, RelevanceFile, SharedRelevance) {
    let config = EngineConfig::default();
    let (file, store) = open_store(dir.path(), &config);
    let engine = Engine::with_clock(desktop_index(vec![]), store.clone(), config, Arc::new(clock.clone()));
    (engine, file, store)
}

#[test]
fn learned_choice_survives_restart_and_wins() -> Result<()> {
    let dir = TempDir::new()?;
    let clock = ManualClock::new();

    {
        let (mut engine, _file, _store) = engine_in(&dir, &clock);
        engine.set_string(Pane::First, "f");
        // Unknown candidates: the shorter name leads.
        assert_eq!(selected_uid(&engine, Pane::First).as_deref(), Some("app.files"));
    }

    {
        let (mut engine, file, store) = engine_in(&dir, &clock);
        for _ in 0..3 {
            engine.set_string(Pane::First, "f");
            let idx = engine
                .current_context(Pane::First)
                .results
                .iter()
                .position(|c| c.uid == "app.firefox")
                .unwrap();
            engine.set_cursor(Pane::First, idx);
            assert_eq!(selected_uid(&engine, Pane::First).as_deref(), Some("app.firefox"));
            engine.set_string(Pane::Second, "open");
            assert!(engine.commit().is_some());
        }
        file.save(&store.read().snapshot())?;
    }

    let (mut engine, _file, store) = engine_in(&dir, &clock);
    assert_eq!(store.read().get("app.firefox").map(|r| r.hits), Some(3));
    engine.set_string(Pane::First, "f");
    assert_eq!(selected_uid(&engine, Pane::First).as_deref(), Some("app.firefox"));

    // Learned usage is keyed to the letters that led to it.
    engine.set_string(Pane::First, "i");
    let view = engine.current_context(Pane::First);
    let firefox = view.results.iter().find(|c| c.uid == "app.firefox").unwrap();
    assert!(firefox.relevance < 0.7 * firefox.score + 0.01);
    let store = store.read();
    let record = store.get("app.firefox").unwrap();
    assert_eq!(record.first_chars.as_slice(), &['f']);
    Ok(())
}

#[test]
fn corrupt_store_starts_empty() -> Result<()> {
    let dir = TempDir::new()?;
    let file = RelevanceFile::in_data_dir(dir.path());
    std::fs::write(file.path(), b"garbage")?;
    let (_file, store) = open_store(dir.path(), &EngineConfig::default());
    assert!(store.read().is_empty());
    Ok(())
}

#[test]
fn popular_override_replaces_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let config = EngineConfig {
        popular: Some(vec!["action.compress".into()]),
        ..EngineConfig::default()
    };
    let (_file, store) = open_store(dir.path(), &config);
    let clock = ManualClock::new();
    let mut engine = Engine::with_clock(desktop_index(vec![]), store, config, Arc::new(clock));
    engine.set_string(Pane::First, "fir");
    engine.focus(Pane::Second);
    assert_eq!(selected_uid(&engine, Pane::Second).as_deref(), Some("action.compress"));
    Ok(())
}
