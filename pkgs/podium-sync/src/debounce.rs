//! Debounced deferred writes

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub type Writer<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Collapses bursts of updates into one write.
///
/// The write reads the shared cell when it fires, so it always persists the
/// latest state rather than the state at scheduling time.
pub struct Debouncer<T> {
    cell: Arc<RwLock<T>>,
    delay: Duration,
    writer: Writer<T>,
    generation: Arc<AtomicU64>,
    dirty: Arc<AtomicBool>,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T, delay: Duration, writer: Writer<T>) -> Self {
        Self {
            cell: Arc::new(RwLock::new(initial)),
            delay,
            writer,
            generation: Arc::new(AtomicU64::new(0)),
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cell(&self) -> Arc<RwLock<T>> {
        self.cell.clone()
    }

    pub fn current(&self) -> T {
        self.cell.read().clone()
    }

    /// Mutate the state and restart the quiet period
    pub fn update(&self, edit: impl FnOnce(&mut T)) {
        {
            let mut state = self.cell.write();
            edit(&mut *state);
        }
        self.schedule();
    }

    /// Restart the quiet period without changing the state
    pub fn schedule(&self) {
        let scheduled = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.dirty.store(true, Ordering::SeqCst);
        let cell = self.cell.clone();
        let writer = self.writer.clone();
        let generation = self.generation.clone();
        let dirty = self.dirty.clone();
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if generation.load(Ordering::SeqCst) != scheduled {
                debug!("Debounced write {} superseded", scheduled);
                return;
            }
            dirty.store(false, Ordering::SeqCst);
            let latest = cell.read().clone();
            writer(latest).await;
        });
    }

    pub fn is_pending(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Cancel the pending write, if any, and perform it now
    pub async fn flush(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return;
        }
        let latest = self.current();
        (self.writer)(latest).await;
    }
}
