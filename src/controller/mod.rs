//! Pane controllers and the timers that pace them.

pub mod pane;
pub mod timer;

pub use pane::{DrillScope, PaneController, PaneUniverse, SearchState};
pub use timer::{Clock, ManualClock, SystemClock, TimerKind, TimerQueue};
