//! Stop signal shared by the listener and the bucket sweeper.
//!
//! The signal is latched: a listener created after [`Shutdown::trigger`]
//! still sees it, and dropping every [`Shutdown`] handle also counts as a stop.

use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of the stop signal. Clones share one latch.
#[derive(Clone)]
pub struct Shutdown {
    stopped: Arc<watch::Sender<bool>>,
}

/// Waiting side handed to the server and its background tasks.
#[derive(Clone)]
pub struct ShutdownListener {
    stopped: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            stopped: Arc::new(stopped),
        }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            stopped: self.stopped.subscribe(),
        }
    }

    /// Latch the stop signal. Repeated calls are no-ops.
    pub fn trigger(&self) {
        self.stopped.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Listeners not yet dropped.
    pub fn receiver_count(&self) -> usize {
        self.stopped.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownListener {
    /// Resolve once the gate is stopping.
    pub async fn wait(&mut self) {
        // Err: every Shutdown handle is gone, nobody can trigger any more.
        let _ = self.stopped.wait_for(|stopped| *stopped).await;
    }
}
