//! Lane construction: an unbounded queue plus the worker that drains it

use crate::lane::error::{LaneError, LaneResult};
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Write side of a lane
///
/// All clones feed the same queue. `close` on any clone closes the lane for
/// every clone; the worker then sees the remaining items followed by the end
/// of the stream.
pub struct LaneWriter<T> {
    lane: &'static str,
    sender: Arc<RwLock<Option<UnboundedSender<T>>>>,
}

impl<T> Clone for LaneWriter<T> {
    fn clone(&self) -> Self {
        Self {
            lane: self.lane,
            sender: self.sender.clone(),
        }
    }
}

impl<T> LaneWriter<T> {
    pub fn lane(&self) -> &'static str {
        self.lane
    }

    /// Enqueue an item. Never blocks.
    ///
    /// Fails with `LaneError::Closed` once the lane has been closed or its
    /// worker has gone away.
    pub fn send(&self, item: T) -> LaneResult<()> {
        let guard = self.sender.read().unwrap_or_else(|e| e.into_inner());
        let sender = guard
            .as_ref()
            .ok_or(LaneError::Closed { lane: self.lane })?;
        sender
            .send(item)
            .map_err(|_| LaneError::Closed { lane: self.lane })
    }

    /// Close the lane. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let mut guard = self.sender.write().unwrap_or_else(|e| e.into_inner());
        let was_open = guard.take().is_some();
        if was_open {
            log::debug!("Lane '{}' closed for writing", self.lane);
        }
        was_open
    }

    pub fn is_closed(&self) -> bool {
        let guard = self.sender.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map_or(true, |s| s.is_closed())
    }
}

/// Read side of a lane, owned by the lane's worker
pub struct LaneReader<T> {
    lane: &'static str,
    receiver: UnboundedReceiver<T>,
}

impl<T> LaneReader<T> {
    pub fn lane(&self) -> &'static str {
        self.lane
    }

    /// Wait for work, then take everything currently queued.
    ///
    /// Suspends until at least one item is queued or the lane is closed and
    /// empty. Appends the available items to `batch` in enqueue order and
    /// returns `true`; returns `false` once the lane is closed and drained.
    pub async fn next_batch(&mut self, batch: &mut Vec<T>) -> bool {
        match self.receiver.recv().await {
            Some(first) => {
                batch.push(first);
                while let Ok(item) = self.receiver.try_recv() {
                    batch.push(item);
                }
                true
            }
            None => false,
        }
    }
}

/// Handle to a lane's spawned worker
pub struct LaneTask<E> {
    lane: &'static str,
    handle: Option<JoinHandle<Result<(), E>>>,
    outcome: Option<Result<(), E>>,
}

impl<E> LaneTask<E>
where
    E: From<LaneError>,
{
    pub fn lane(&self) -> &'static str {
        self.lane
    }

    /// True once the worker has returned and `wait` has observed it
    pub fn has_finished(&self) -> bool {
        self.handle.is_none()
    }

    /// Wait for the worker to return and keep its outcome.
    ///
    /// Cancellation safe: dropping the future leaves the task untouched so
    /// `wait` or `join` can be called again.
    pub async fn wait(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            let joined = handle.await;
            self.handle = None;
            self.outcome = Some(match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(LaneError::WorkerPanicked {
                    lane: self.lane,
                    message: e.to_string(),
                }
                .into()),
                Err(_) => Err(LaneError::WorkerCancelled { lane: self.lane }.into()),
            });
        }
    }

    /// Wait for the worker to return and hand back its outcome
    pub async fn join(mut self) -> Result<(), E> {
        self.wait().await;
        self.outcome.take().unwrap_or(Ok(()))
    }
}

/// Create a lane: an unbounded FIFO queue and one spawned worker.
///
/// `handler` receives the read side and must return once the lane is closed
/// and drained. Items sent before `close` reach the handler in send order.
pub fn create_lane<T, E, F, Fut>(lane: &'static str, handler: F) -> (LaneWriter<T>, LaneTask<E>)
where
    T: Send + 'static,
    E: From<LaneError> + std::fmt::Display + Send + 'static,
    F: FnOnce(LaneReader<T>) -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    let (sender, receiver) = unbounded_channel();
    let writer = LaneWriter {
        lane,
        sender: Arc::new(RwLock::new(Some(sender))),
    };
    let reader = LaneReader { lane, receiver };

    let work = handler(reader);
    let handle = tokio::spawn(async move {
        log::debug!("Lane '{}' worker started", lane);
        let result = work.await;
        match &result {
            Ok(()) => log::debug!("Lane '{}' worker drained and stopped", lane),
            Err(e) => log::error!("Lane '{}' worker failed: {}", lane, e),
        }
        result
    });

    let task = LaneTask {
        lane,
        handle: Some(handle),
        outcome: None,
    };
    (writer, task)
}
