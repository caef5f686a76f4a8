//! Async driver owning an [`Engine`].
//!
//! One task owns the engine and is the only place its state changes. It
//! sleeps until either a command arrives or the earliest timer is due, then
//! forwards whatever events the engine produced. Catalog rebuilds run on the
//! blocking pool and report back through an internal channel.

use std::time::Instant;

use crossbeam_channel::Sender;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineEvent, Execution};
use crate::model::types::{KindSet, Pane};
use crate::search::context::ContextView;

#[derive(Debug)]
pub enum Command {
    AddChar(Pane, char),
    DeleteChar(Pane),
    SetString(Pane, String),
    SetCursor(Pane, usize),
    MoveCursor(Pane, isize),
    ToggleSecondary(Pane, usize),
    DrillIn(Pane),
    DrillOut(Pane),
    Reset(Pane),
    Focus(Pane),
    SetTextMode(bool),
    SetTypeFilter(KindSet),
    /// Re-enumerate the catalog on a worker, then refresh the panes.
    RefreshCatalog,
    Commit(oneshot::Sender<Option<Execution>>),
    Context(Pane, oneshot::Sender<ContextView>),
    /// Settle every pending timer now; replies once done.
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cheap, cloneable front door to a running engine task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    /// Queue a fire-and-forget command. Returns false once the engine stopped.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    pub async fn commit(&self) -> Option<Execution> {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Commit(tx)) {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn context(&self, pane: Pane) -> Option<ContextView> {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Context(pane, tx)) {
            return None;
        }
        rx.await.ok()
    }

    pub async fn flush(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx)) && rx.await.is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

/// Move `engine` onto its own task. The join handle yields the engine back
/// after shutdown, or once every handle is dropped.
pub fn spawn(engine: Engine, events: Sender<EngineEvent>) -> (EngineHandle, JoinHandle<Engine>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(drive(engine, rx, events));
    (EngineHandle { tx }, task)
}

async fn drive(
    mut engine: Engine,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: Sender<EngineEvent>,
) -> Engine {
    let (refreshed_tx, mut refreshed_rx) = mpsc::unbounded_channel::<usize>();
    let mut listener_gone = false;
    info!("engine task started");
    forward(&mut engine, &events, &mut listener_gone);

    loop {
        let deadline = engine.next_deadline();
        tokio::select! {
            command = commands.recv() => {
                match command {
                    None | Some(Command::Shutdown) => break,
                    Some(Command::RefreshCatalog) => {
                        let catalog = engine.catalog().clone();
                        let tx = refreshed_tx.clone();
                        tokio::task::spawn_blocking(move || {
                            let count = catalog.rebuild();
                            let _ = tx.send(count);
                        });
                    }
                    Some(command) => apply(&mut engine, command),
                }
            }
            Some(count) = refreshed_rx.recv() => {
                debug!(count, "catalog refresh landed");
                engine.catalog_refreshed();
            }
            _ = sleep_until(deadline) => {
                engine.poll_timers();
            }
        }
        forward(&mut engine, &events, &mut listener_gone);
    }

    info!("engine task stopped");
    engine
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

fn apply(engine: &mut Engine, command: Command) {
    match command {
        Command::AddChar(pane, ch) => engine.add_char(pane, ch),
        Command::DeleteChar(pane) => engine.delete_char(pane),
        Command::SetString(pane, text) => engine.set_string(pane, &text),
        Command::SetCursor(pane, index) => engine.set_cursor(pane, index),
        Command::MoveCursor(pane, delta) => engine.move_cursor(pane, delta),
        Command::ToggleSecondary(pane, index) => engine.toggle_secondary_cursor(pane, index),
        Command::DrillIn(pane) => {
            engine.drill_in(pane);
        }
        Command::DrillOut(pane) => {
            engine.drill_out(pane);
        }
        Command::Reset(pane) => engine.reset(pane),
        Command::Focus(pane) => engine.focus(pane),
        Command::SetTextMode(enabled) => engine.set_text_mode(enabled),
        Command::SetTypeFilter(filter) => engine.set_type_filter(filter),
        Command::Commit(reply) => {
            let _ = reply.send(engine.commit());
        }
        Command::Context(pane, reply) => {
            let _ = reply.send(engine.current_context(pane));
        }
        Command::Flush(reply) => {
            engine.flush_all();
            let _ = reply.send(());
        }
        Command::RefreshCatalog | Command::Shutdown => {}
    }
}

fn forward(engine: &mut Engine, events: &Sender<EngineEvent>, listener_gone: &mut bool) {
    for event in engine.drain_events() {
        if *listener_gone {
            continue;
        }
        if events.send(event).is_err() {
            warn!("event listener dropped; discarding further events");
            *listener_gone = true;
        }
    }
}
