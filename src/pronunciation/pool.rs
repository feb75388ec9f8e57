use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, error, info};

use super::dispatcher::{CancellationToken, EvaluationRequest, ModeDispatcher, Scoring};
use super::result::EvaluationResult;
use super::{PronunciationError, Result};

struct Job {
    request: EvaluationRequest,
    scoring: Scoring,
    token: CancellationToken,
    reply: Sender<Result<EvaluationResult>>,
}

/// Handle to one submitted evaluation.
#[derive(Debug)]
pub struct EvaluationTicket {
    token: CancellationToken,
    reply: Receiver<Result<EvaluationResult>>,
}

impl EvaluationTicket {
    /// Requests cancellation; the job stops at its next stage boundary.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Blocks until the evaluation finishes, fails or is cancelled.
    pub fn wait(self) -> Result<EvaluationResult> {
        self.reply.recv().unwrap_or(Err(PronunciationError::Cancelled {
            stage: "worker reply",
        }))
    }
}

/// Fixed set of named worker threads evaluating requests from a shared queue.
///
/// Dropping the pool closes the queue, lets queued jobs drain and joins every
/// worker.
pub struct EvaluationPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl EvaluationPool {
    pub fn new(dispatcher: Arc<ModeDispatcher>, workers: usize) -> Result<Self> {
        let count = workers.max(1);
        let (sender, receiver) = unbounded::<Job>();
        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let receiver = receiver.clone();
            let dispatcher = Arc::clone(&dispatcher);
            let handle = thread::Builder::new()
                .name(format!("evaluation-worker-{index}"))
                .spawn(move || worker_loop(index, &dispatcher, &receiver))
                .map_err(|err| {
                    error!(error = %err, worker = index, "failed to spawn evaluation worker");
                    PronunciationError::config(format!("failed to spawn evaluation worker: {err}"))
                })?;
            handles.push(handle);
        }
        info!(workers = count, "evaluation pool started");
        Ok(Self {
            sender: Some(sender),
            workers: handles,
        })
    }

    /// Worker count sized to the machine's available parallelism.
    pub fn with_default_workers(dispatcher: Arc<ModeDispatcher>) -> Result<Self> {
        let workers = thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(dispatcher, workers)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn submit(&self, request: EvaluationRequest) -> EvaluationTicket {
        let mode = request.mode;
        self.enqueue(request, Scoring::Mode(mode))
    }

    pub fn submit_legacy(&self, request: EvaluationRequest) -> EvaluationTicket {
        self.enqueue(request, Scoring::Legacy)
    }

    fn enqueue(&self, request: EvaluationRequest, scoring: Scoring) -> EvaluationTicket {
        let token = CancellationToken::new();
        let (reply_tx, reply_rx) = bounded(1);
        let job = Job {
            request,
            scoring,
            token: token.clone(),
            reply: reply_tx,
        };
        // A failed send drops the job and its reply sender, which `wait` reports.
        if let Some(sender) = self.sender.as_ref() {
            if sender.send(job).is_err() {
                error!("evaluation queue closed; job dropped");
            }
        }
        EvaluationTicket {
            token,
            reply: reply_rx,
        }
    }
}

impl Drop for EvaluationPool {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("evaluation worker panicked");
            }
        }
        debug!("evaluation pool shut down");
    }
}

fn worker_loop(index: usize, dispatcher: &ModeDispatcher, receiver: &Receiver<Job>) {
    debug!(worker = index, "evaluation worker running");
    for job in receiver.iter() {
        let outcome = if job.token.is_cancelled() {
            debug!(worker = index, "skipping cancelled job");
            Err(PronunciationError::Cancelled {
                stage: "queue pickup",
            })
        } else {
            dispatcher.run(job.request, job.scoring, &job.token)
        };
        // The caller may have dropped its ticket.
        let _ = job.reply.send(outcome);
    }
    debug!(worker = index, "evaluation worker exiting");
}
