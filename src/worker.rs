use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::service::{GenerationOutcome, GenerationRequest, ImageGenerator};

/// Called after an outcome is queued so the UI wakes up to collect it.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Runs generation calls off the UI thread and hands outcomes back over a channel.
///
/// Each submission makes exactly one call; nothing is retried here.
pub struct GenerationWorker {
    runtime: tokio::runtime::Runtime,
    generator: Arc<dyn ImageGenerator>,
    tx: Sender<GenerationOutcome>,
    rx: Receiver<GenerationOutcome>,
    waker: Waker,
}

impl GenerationWorker {
    pub fn new(generator: Arc<dyn ImageGenerator>, waker: Waker) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("vantage-generate")
            .enable_all()
            .build()?;
        let (tx, rx) = mpsc::channel();
        Ok(Self {
            runtime,
            generator,
            tx,
            rx,
            waker,
        })
    }

    pub fn submit(&self, request: GenerationRequest) {
        let generator = Arc::clone(&self.generator);
        let tx = self.tx.clone();
        let waker = Arc::clone(&self.waker);
        debug!(bytes = request.artifact.bytes.len(), "worker: submitting");

        self.runtime.spawn(async move {
            let outcome = GenerationOutcome::from(generator.generate(&request).await);
            if tx.send(outcome).is_err() {
                warn!("worker: outcome dropped, receiver gone");
            }
            waker();
        });
    }

    pub fn try_recv(&self) -> Option<GenerationOutcome> {
        self.rx.try_recv().ok()
    }

    #[cfg(test)]
    fn recv_timeout(&self, timeout: std::time::Duration) -> Option<GenerationOutcome> {
        self.rx.recv_timeout(timeout).ok()
    }
}
