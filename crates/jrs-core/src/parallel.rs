//! A bounded-concurrency async worker pool.
//!
//! At most `parallel_count` handler invocations are ever in flight, and
//! items are admitted to those slots in the exact order [`ParallelPool::queue`]
//! was called — a single dispatcher task reads the work queue and hands
//! items to workers one at a time, so admission order never depends on
//! scheduler timing the way racing on a semaphore directly would.

use futures::future::join_all;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};

type HandlerFn<T, R> = Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = R> + Send>> + Send + Sync>;

/// A bounded-concurrency pool. `T` is the item type, `R` the handler's
/// return type.
pub struct ParallelPool<T, R> {
    work_tx: mpsc::UnboundedSender<(T, oneshot::Sender<R>)>,
    pending: Arc<AtomicUsize>,
    flush_tx: tokio::sync::watch::Sender<usize>,
}

impl<T, R> ParallelPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Create a pool that runs at most `parallel_count` invocations of
    /// `handler` concurrently.
    pub fn new<F, Fut>(parallel_count: usize, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let handler: HandlerFn<T, R> = Arc::new(move |item| Box::pin(handler(item)));
        let (work_tx, mut work_rx) = mpsc::unbounded_channel::<(T, oneshot::Sender<R>)>();
        let pending = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(parallel_count.max(1)));
        let (flush_tx, _) = tokio::sync::watch::channel(0usize);

        let pending_dispatch = pending.clone();
        let flush_tx_dispatch = flush_tx.clone();
        tokio::spawn(async move {
            while let Some((item, reply)) = work_rx.recv().await {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("pool semaphore is never closed while the dispatcher runs");
                let handler = handler.clone();
                let pending = pending_dispatch.clone();
                let flush_tx = flush_tx_dispatch.clone();
                tokio::spawn(async move {
                    let result = (handler)(item).await;
                    drop(permit);
                    let _ = reply.send(result);
                    let remaining = pending.fetch_sub(1, Ordering::SeqCst) - 1;
                    let _ = flush_tx.send(remaining);
                });
            }
        });

        Self { work_tx, pending, flush_tx }
    }

    /// Enqueue one item; the returned future resolves to the handler's
    /// result once it has run. Enqueue order is preserved even though
    /// completion order is not.
    pub fn queue(&self, item: T) -> impl Future<Output = R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.fetch_add(1, Ordering::SeqCst);
        let _ = self.work_tx.send((item, reply_tx));
        async move { reply_rx.await.expect("worker dropped the reply channel without sending") }
    }

    /// Enqueue a batch, preserving the input order in the output `Vec`.
    pub async fn queue_list(&self, items: Vec<T>) -> Vec<R> {
        let futures: Vec<_> = items.into_iter().map(|item| self.queue(item)).collect();
        join_all(futures).await
    }

    /// Current in-flight-plus-pending count.
    pub fn queue_length(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Resolve once every item queued so far (including any currently
    /// running) has completed. Never fails, regardless of what the handler
    /// returned for any individual item.
    pub async fn flush(&self) {
        let mut rx = self.flush_tx.subscribe();
        if self.queue_length() == 0 {
            return;
        }
        loop {
            if self.queue_length() == 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
