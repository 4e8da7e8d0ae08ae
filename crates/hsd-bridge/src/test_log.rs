//! Scoped capture of tracing events for assertions in unit tests.

use std::sync::{Arc, Mutex};

use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

/// Levels of every event emitted while the guard from `capture` is alive.
#[derive(Clone, Default)]
pub struct CapturedLevels(Arc<Mutex<Vec<Level>>>);

impl CapturedLevels {
    pub fn count(&self, level: Level) -> usize {
        self.0.lock().unwrap().iter().filter(|l| **l == level).count()
    }
}

impl<S: Subscriber> Layer<S> for CapturedLevels {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.0.lock().unwrap().push(*event.metadata().level());
    }
}

/// Install a thread-local subscriber recording event levels. Tokio tests
/// run on a current-thread runtime, so async code is covered too.
pub fn capture() -> (CapturedLevels, DefaultGuard) {
    let levels = CapturedLevels::default();
    let guard = tracing_subscriber::registry()
        .with(levels.clone())
        .set_default();
    (levels, guard)
}
