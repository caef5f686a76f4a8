//! Periodic background persistence of the relevance store.
//!
//! The saver thread wakes on a `crossbeam_channel::tick`, clones the store
//! under a short read lock when its generation moved, and serializes plus
//! writes outside the lock so keystroke handling never waits on disk IO.
//! Write failures are logged and retried on the next tick. Shutdown flushes
//! one last time.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};
use tracing::{debug, info, warn};

use crate::search::relevance::SharedRelevance;
use crate::storage::relevance_file::RelevanceFile;

pub struct RelevanceSaver {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RelevanceSaver {
    pub fn spawn(
        store: SharedRelevance,
        file: RelevanceFile,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("relevance-saver".into())
            .spawn(move || {
                let ticker = tick(interval);
                let mut saved_generation = store.read().generation();
                info!(
                    path = %file.path().display(),
                    interval_secs = interval.as_secs(),
                    "relevance saver started"
                );
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            save_if_dirty(&store, &file, &mut saved_generation);
                        }
                        recv(stop_rx) -> _ => {
                            save_if_dirty(&store, &file, &mut saved_generation);
                            break;
                        }
                    }
                }
                debug!("relevance saver stopped");
            })?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread after a final flush.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("relevance saver thread panicked");
        }
    }
}

impl Drop for RelevanceSaver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Write the store when it changed since `saved_generation`. Returns whether
/// a write succeeded.
pub fn save_if_dirty(store: &SharedRelevance, file: &RelevanceFile, saved_generation: &mut u64) -> bool {
    let (generation, snapshot) = {
        let guard = store.read();
        if guard.generation() == *saved_generation {
            return false;
        }
        (guard.generation(), guard.snapshot())
    };
    match file.save(&snapshot) {
        Ok(()) => {
            *saved_generation = generation;
            true
        }
        Err(e) => {
            warn!(path = %file.path().display(), error = %e, "saving relevance failed; will retry");
            false
        }
    }
}
