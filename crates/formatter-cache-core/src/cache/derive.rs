//! Background population of public variants.
//!
//! A private render of a published record enqueues a job here; the dispatcher
//! renders the withheld-hidden variant so anonymous readers can be served
//! from storage. Jobs never block the request that produced them.

use chrono::{DateTime, Utc};
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::Inner;
use super::key::Key;
use super::validator::Validator;
use crate::error::Error;
use crate::render::Renderer;

/// Count of jobs queued or running
#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the pending count when the job it belongs to is finished or
/// dropped unprocessed.
struct PendingGuard(Arc<Pending>);

impl PendingGuard {
    fn new(pending: &Arc<Pending>) -> Self {
        pending.count.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(pending))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

pub(super) struct DeriveJob {
    /// Public variant to render
    key: Key,
    /// Change date of the private render that triggered the job
    change_date: DateTime<Utc>,
    renderer: Arc<dyn Renderer>,
    _pending: PendingGuard,
}

/// Handle to the derivation dispatcher
pub(super) struct Derivations {
    sender: mpsc::Sender<DeriveJob>,
    pending: Arc<Pending>,
}

impl Derivations {
    /// Spawn the dispatcher. It holds only a weak handle to the cache, so it
    /// stops once the cache is dropped.
    pub(super) fn start(cache: Weak<Inner>, queue_size: usize, concurrency: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        let limit = Arc::new(Semaphore::new(concurrency.max(1)));
        tokio::spawn(dispatch(receiver, cache, limit));

        Self {
            sender,
            pending: Arc::new(Pending::default()),
        }
    }

    /// Queue the public variant of `key`. A full queue drops the job.
    pub(super) fn submit(&self, key: Key, change_date: DateTime<Utc>, renderer: Arc<dyn Renderer>) {
        let job = DeriveJob {
            key,
            change_date,
            renderer,
            _pending: PendingGuard::new(&self.pending),
        };

        match self.sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                warn!("Derivation queue full, dropping public variant {}", job.key);
            }
            Err(TrySendError::Closed(job)) => {
                debug!("Derivation worker stopped, dropping public variant {}", job.key);
            }
        }
    }

    pub(super) fn pending(&self) -> usize {
        self.pending.count.load(Ordering::Acquire)
    }

    /// Resolve once no job is queued or running
    pub(super) async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.pending.idle.notified());
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn dispatch(mut receiver: mpsc::Receiver<DeriveJob>, cache: Weak<Inner>, limit: Arc<Semaphore>) {
    while let Some(job) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
            break;
        };
        let Some(inner) = cache.upgrade() else {
            break;
        };

        tokio::spawn(async move {
            let _permit = permit;
            derive(&inner, job).await;
        });
    }

    debug!("Derivation worker stopped");
}

async fn derive(inner: &Arc<Inner>, job: DeriveJob) {
    let DeriveJob {
        key,
        change_date,
        renderer,
        _pending,
    } = job;

    debug!("Deriving public variant {}", key);
    if let Err(e) = inner
        .get(key.clone(), Validator::ChangeDate(change_date), renderer)
        .await
    {
        warn!("{}", Error::PublicDerivation(format!("{key}: {e}")));
    }
}
