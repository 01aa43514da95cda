//! Speculative, debounced grid compositing ahead of submission.
//!
//! Every selection change gets a new generation id. A change cancels the
//! pending (not yet started) task; a task that is already running keeps
//! going but may only commit its result if its generation is still the
//! current one when it finishes. Submitters join the work through
//! [`BackgroundPreCompositor::get_stored_or_await_pending`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use atelier_core::selection::{selection_signature, CompositeResult, GarmentItem};
use atelier_core::types::RecordId;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::composite::CompositeProducer;

/// Observable state of the pre-compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreCompositeState {
    Idle,
    /// Waiting for the debounce window to elapse.
    Scheduled,
    /// Compositing and uploading.
    Running,
    /// A composite for this signature is ready.
    Cached(String),
}

#[derive(Debug, Clone)]
enum TaskOutcome {
    Pending,
    Done(Option<CompositeResult>),
}

struct RunningComposite {
    generation: u64,
    signature: String,
    outcome: watch::Receiver<TaskOutcome>,
}

#[derive(Default)]
struct Slots {
    generation: u64,
    signature: Option<String>,
    scheduled: Option<CancellationToken>,
    running: Option<RunningComposite>,
    cached: Option<CompositeResult>,
}

/// Debounced, latest-wins background compositor for one owner's selection.
pub struct BackgroundPreCompositor {
    enabled: bool,
    debounce: Duration,
    owner_id: RecordId,
    producer: Arc<dyn CompositeProducer>,
    slots: Arc<Mutex<Slots>>,
}

impl BackgroundPreCompositor {
    pub fn new(
        owner_id: RecordId,
        producer: Arc<dyn CompositeProducer>,
        enabled: bool,
        debounce: Duration,
    ) -> Self {
        Self {
            enabled,
            debounce,
            owner_id,
            producer,
            slots: Arc::new(Mutex::new(Slots::default())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// React to a new selection. Must be called from within a Tokio runtime.
    pub fn update_selection(&self, items: Vec<GarmentItem>) {
        if !self.enabled {
            return;
        }

        let signature = selection_signature(&items);
        let mut slots = lock(&self.slots);

        if slots.signature.as_deref() == Some(signature.as_str()) {
            let in_hand = slots.scheduled.is_some()
                || slots.running.as_ref().is_some_and(|r| r.signature == signature)
                || slots.cached.as_ref().is_some_and(|c| c.matches(&signature));
            if in_hand {
                return;
            }
        }

        slots.generation += 1;
        let generation = slots.generation;
        slots.signature = Some(signature.clone());

        if let Some(pending) = slots.scheduled.take() {
            pending.cancel();
        }
        if slots.cached.as_ref().is_some_and(|c| !c.matches(&signature)) {
            tracing::debug!("Selection changed, invalidating cached composite");
            slots.cached = None;
        }

        if items.is_empty() {
            return;
        }

        let token = CancellationToken::new();
        slots.scheduled = Some(token.clone());
        drop(slots);

        tracing::debug!(generation, items = items.len(), "Composite scheduled");
        tokio::spawn(run_scheduled(
            Arc::clone(&self.slots),
            Arc::clone(&self.producer),
            self.owner_id,
            items,
            signature,
            generation,
            token,
            self.debounce,
        ));
    }

    /// Cached composite for `signature`, or the result of the running task
    /// if it was built for `signature`.
    ///
    /// Never waits when nothing is running.
    pub async fn get_stored_or_await_pending(&self, signature: &str) -> Option<CompositeResult> {
        self.lookup(signature, false).await
    }

    /// Like [`Self::get_stored_or_await_pending`], but removes the cached
    /// composite on a hit so it is consumed at most once.
    ///
    /// A composite for `signature` that is still in its debounce window is
    /// dropped, since the caller is about to produce it on demand.
    pub async fn take_stored_or_await_pending(&self, signature: &str) -> Option<CompositeResult> {
        self.lookup(signature, true).await
    }

    pub fn state(&self) -> PreCompositeState {
        let slots = lock(&self.slots);
        if slots.scheduled.is_some() {
            PreCompositeState::Scheduled
        } else if slots.running.is_some() {
            PreCompositeState::Running
        } else if let Some(cached) = &slots.cached {
            PreCompositeState::Cached(cached.selection_signature.clone())
        } else {
            PreCompositeState::Idle
        }
    }

    /// Drop pending work and the cache. A running task finishes but its
    /// result is discarded.
    pub fn shutdown(&self) {
        let mut slots = lock(&self.slots);
        slots.generation += 1;
        slots.signature = None;
        slots.cached = None;
        if let Some(pending) = slots.scheduled.take() {
            pending.cancel();
        }
    }

    async fn lookup(&self, signature: &str, consume: bool) -> Option<CompositeResult> {
        if !self.enabled {
            return None;
        }

        let mut outcome = {
            let mut slots = lock(&self.slots);
            if slots.cached.as_ref().is_some_and(|c| c.matches(signature)) {
                return if consume {
                    slots.cached.take()
                } else {
                    slots.cached.clone()
                };
            }
            if slots.running.is_none() {
                if consume {
                    drop_scheduled(&mut slots, signature);
                }
                return None;
            }
            match &slots.running {
                Some(running) => running.outcome.clone(),
                None => return None,
            }
        };

        tracing::debug!(signature, "Waiting for in-flight composite");
        let result = match outcome
            .wait_for(|o| matches!(o, TaskOutcome::Done(_)))
            .await
        {
            Ok(done) => match &*done {
                TaskOutcome::Done(Some(result)) if result.matches(signature) => Some(result.clone()),
                _ => None,
            },
            Err(_) => None,
        };

        if consume && result.is_some() {
            let mut slots = lock(&self.slots);
            if slots.cached.as_ref().is_some_and(|c| c.matches(signature)) {
                slots.cached = None;
            }
        }
        result
    }
}

impl Drop for BackgroundPreCompositor {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.slots).scheduled.take() {
            pending.cancel();
        }
    }
}

fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancel the debounced task for `signature`, if it has not started.
///
/// Bumps the generation so a task already past its debounce sleep
/// cannot start either. The signature is kept, so the same selection
/// schedules again on its next update.
fn drop_scheduled(slots: &mut Slots, signature: &str) {
    if slots.signature.as_deref() != Some(signature) {
        return;
    }
    if let Some(pending) = slots.scheduled.take() {
        slots.generation += 1;
        pending.cancel();
        tracing::debug!(signature, "Scheduled composite dropped for on-demand compositing");
    }
}

/// Debounce, then composite if this generation is still current.
#[allow(clippy::too_many_arguments)]
async fn run_scheduled(
    slots: Arc<Mutex<Slots>>,
    producer: Arc<dyn CompositeProducer>,
    owner_id: RecordId,
    items: Vec<GarmentItem>,
    signature: String,
    generation: u64,
    token: CancellationToken,
    debounce: Duration,
) {
    tokio::select! {
        _ = token.cancelled() => {
            tracing::trace!(generation, "Scheduled composite cancelled");
            return;
        }
        _ = tokio::time::sleep(debounce) => {}
    }

    let tx = {
        let mut guard = lock(&slots);
        if guard.generation != generation {
            return;
        }
        guard.scheduled = None;
        let (tx, rx) = watch::channel(TaskOutcome::Pending);
        guard.running = Some(RunningComposite {
            generation,
            signature: signature.clone(),
            outcome: rx,
        });
        tx
    };

    tracing::info!(generation, items = items.len(), "Speculative composite started");
    let result = match producer.produce(owner_id, &items).await {
        Ok(result) => Some(result),
        Err(e) => {
            tracing::warn!(generation, error = %e, "Speculative composite failed");
            None
        }
    };

    {
        let mut guard = lock(&slots);
        if guard.running.as_ref().is_some_and(|r| r.generation == generation) {
            guard.running = None;
        }
        match &result {
            Some(result) if guard.generation == generation => {
                tracing::info!(generation, path = %result.storage_key, "Composite cached");
                guard.cached = Some(result.clone());
            }
            Some(_) => tracing::debug!(generation, "Discarding superseded composite"),
            None => {}
        }
    }

    let _ = tx.send(TaskOutcome::Done(result));
}
