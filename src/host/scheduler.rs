//! Callback queues of the in-memory host.
//!
//! One worker thread per priority drains its queue. Each job locks the
//! target record, clears its processing-active flag and runs the completion
//! hook with the record lock still held.

use super::memory::Record;
use super::{CallbackDescriptor, HostStatus, Priority};
use crate::types::RecordHandle;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Hook run by a worker for every completed record.
pub type CompletionHook = Arc<dyn Fn(&RecordHandle) + Send + Sync>;

pub(crate) type SharedHook = Arc<RwLock<Option<CompletionHook>>>;

/// Status returned when the queues have shut down.
pub(crate) const S_CALLBACK_QUEUE_CLOSED: i64 = -2;

pub(crate) struct Job {
    pub(crate) record: Arc<Record>,
    pub(crate) handle: RecordHandle,
    pub(crate) descriptor: CallbackDescriptor,
}

impl Job {
    fn run(self, hook: &SharedHook) {
        let hook = hook.read().clone();
        self.record.complete(|| {
            if let Some(hook) = hook {
                hook(&self.handle);
            }
        });
        log::debug!(
            "Completion {} processed for {} at {:?}",
            self.descriptor.id(),
            self.handle.name(),
            self.descriptor.priority()
        );
    }
}

pub(crate) struct CallbackQueues {
    senders: Vec<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl CallbackQueues {
    pub(crate) fn start(hook: SharedHook) -> Self {
        let mut senders = Vec::with_capacity(Priority::ALL.len());
        let mut workers = Vec::with_capacity(Priority::ALL.len());

        for priority in Priority::ALL {
            let (tx, rx): (Sender<Job>, Receiver<Job>) = channel::unbounded();
            let hook = Arc::clone(&hook);
            let name = format!("cb{:?}", priority);
            let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                for job in rx.iter() {
                    job.run(&hook);
                }
            });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => log::error!("Failed to start callback thread {}: {}", name, e),
            }
            senders.push(tx);
        }

        Self { senders, workers }
    }

    pub(crate) fn request(&self, job: Job) -> Result<(), HostStatus> {
        let index = job.descriptor.priority().index();
        let sender = self
            .senders
            .get(index)
            .ok_or_else(|| HostStatus::new(S_CALLBACK_QUEUE_CLOSED, "no queue for priority"))?;
        sender
            .send(job)
            .map_err(|_| HostStatus::new(S_CALLBACK_QUEUE_CLOSED, "callback queue closed"))
    }
}

impl Drop for CallbackQueues {
    fn drop(&mut self) {
        self.senders.clear();
        let me = thread::current().id();
        for worker in self.workers.drain(..) {
            if worker.thread().id() == me {
                continue;
            }
            if worker.join().is_err() {
                log::warn!("Callback thread panicked");
            }
        }
    }
}
