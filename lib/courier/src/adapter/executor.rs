//! Executor-bridged calls: callbacks run on a chosen executor.

use std::fmt;
use std::sync::Arc;

use courier_core::{Error, Request, Response, Result};
use futures_util::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::warn;

use super::{CallAdapter, CallAdapterFactory};
use crate::call::{Callback, DynCall};
use crate::client::Courier;
use crate::declaration::MethodAnnotation;
use crate::type_token::{AnyValue, TypeToken, WrapFn, call_raw_type};

/// A unit of work handed to a [`CallbackExecutor`].
pub type Task = Box<dyn FnOnce() + Send>;

/// Runs callback tasks, in submission order for a single producer.
///
/// Any `Fn(Task)` closure is an executor:
///
/// ```
/// use courier::Courier;
/// use courier::adapter::Task;
///
/// let courier = Courier::builder()
///     .base_url("http://localhost/")
///     .callback_executor(|task: Task| task())
///     .build()?;
/// # Ok::<(), courier::Error>(())
/// ```
pub trait CallbackExecutor: Send + Sync + 'static {
    /// Run `task`, now or later.
    fn execute(&self, task: Task);
}

impl<F> CallbackExecutor for F
where
    F: Fn(Task) + Send + Sync + 'static,
{
    fn execute(&self, task: Task) {
        self(task);
    }
}

/// Runs callbacks as tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct RuntimeExecutor(Handle);

impl RuntimeExecutor {
    /// Spawn on the given runtime.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self(handle)
    }

    /// Spawn on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns an error outside of a tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self)
            .map_err(|e| Error::invalid_request(format!("no tokio runtime: {e}")))
    }
}

impl CallbackExecutor for RuntimeExecutor {
    fn execute(&self, task: Task) {
        drop(self.0.spawn(async move { task() }));
    }
}

// ============================================================================
// Queue Executor
// ============================================================================

/// Create an executor whose tasks run only when its queue is drained.
///
/// The queue plays the role of a UI thread: callbacks are delivered on
/// whichever thread calls [`CallbackQueue::run_pending`] or
/// [`CallbackQueue::run_next`].
///
/// Once the [`CallbackQueue`] is dropped, tasks run inline on the thread
/// that submits them, so every callback is still invoked.
#[must_use]
pub fn callback_queue() -> (QueueExecutor, CallbackQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (QueueExecutor { sender }, CallbackQueue { receiver })
}

/// Producer side of [`callback_queue`].
#[derive(Clone)]
pub struct QueueExecutor {
    sender: mpsc::UnboundedSender<Task>,
}

impl fmt::Debug for QueueExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueExecutor")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl CallbackExecutor for QueueExecutor {
    fn execute(&self, task: Task) {
        if let Err(mpsc::error::SendError(task)) = self.sender.send(task) {
            warn!("callback queue closed, running callback inline");
            task();
        }
    }
}

/// Consumer side of [`callback_queue`].
pub struct CallbackQueue {
    receiver: mpsc::UnboundedReceiver<Task>,
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("pending", &self.receiver.len())
            .finish()
    }
}

impl CallbackQueue {
    /// Run every task already queued, returning how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            count += 1;
        }
        count
    }

    /// Wait for the next task and run it.
    ///
    /// Returns `false` once every executor is dropped and the queue is empty.
    pub async fn run_next(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Adapts `Call<T>` so enqueue callbacks run on an executor.
#[derive(Clone)]
pub struct ExecutorCallAdapterFactory {
    executor: Arc<dyn CallbackExecutor>,
}

impl ExecutorCallAdapterFactory {
    /// Dispatch callbacks through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn CallbackExecutor>) -> Self {
        Self { executor }
    }
}

impl fmt::Debug for ExecutorCallAdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorCallAdapterFactory").finish_non_exhaustive()
    }
}

impl CallAdapterFactory for ExecutorCallAdapterFactory {
    fn name(&self) -> &str {
        "ExecutorCallAdapterFactory"
    }

    fn get(
        &self,
        return_type: &TypeToken,
        _annotations: &[MethodAnnotation],
        _courier: &Courier,
    ) -> Option<Arc<dyn CallAdapter>> {
        if return_type.raw_type() != Some(call_raw_type()) {
            return None;
        }
        Some(Arc::new(ExecutorAdapter {
            executor: Arc::clone(&self.executor),
            response_type: return_type.inner()?.clone(),
            wrap: return_type.wrap_fn()?,
        }))
    }
}

struct ExecutorAdapter {
    executor: Arc<dyn CallbackExecutor>,
    response_type: TypeToken,
    wrap: WrapFn,
}

impl CallAdapter for ExecutorAdapter {
    fn response_type(&self) -> &TypeToken {
        &self.response_type
    }

    fn adapt(&self, call: Arc<dyn DynCall>) -> AnyValue {
        (self.wrap)(Arc::new(ExecutorCallbackCall {
            executor: Arc::clone(&self.executor),
            delegate: call,
        }))
    }
}

/// Forwards to a delegate call, delivering callbacks through the executor.
///
/// A response arriving after the delegate was canceled is reported as
/// [`Error::Canceled`].
struct ExecutorCallbackCall {
    executor: Arc<dyn CallbackExecutor>,
    delegate: Arc<dyn DynCall>,
}

impl DynCall for ExecutorCallbackCall {
    fn execute(&self) -> BoxFuture<'_, Result<Response<AnyValue>>> {
        self.delegate.execute()
    }

    fn enqueue(&self, callback: Box<dyn Callback<AnyValue>>) -> Result<()> {
        let executor = Arc::clone(&self.executor);
        let delegate = Arc::clone(&self.delegate);
        self.delegate
            .enqueue(Box::new(move |result: Result<Response<AnyValue>>| {
                executor.execute(Box::new(move || match result {
                    Ok(_) if delegate.is_canceled() => callback.on_failure(Error::Canceled),
                    Ok(response) => callback.on_response(response),
                    Err(error) => callback.on_failure(error),
                }));
            }))
    }

    fn is_executed(&self) -> bool {
        self.delegate.is_executed()
    }

    fn cancel(&self) {
        self.delegate.cancel();
    }

    fn is_canceled(&self) -> bool {
        self.delegate.is_canceled()
    }

    fn clone_call(&self) -> Arc<dyn DynCall> {
        Arc::new(Self {
            executor: Arc::clone(&self.executor),
            delegate: self.delegate.clone_call(),
        })
    }

    fn request(&self) -> Result<Request> {
        self.delegate.request()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn queue_runs_in_order() {
        let (executor, mut queue) = callback_queue();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            executor.execute(Box::new(move || seen.lock().expect("lock").push(i)));
        }

        assert!(seen.lock().expect("lock").is_empty());
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*seen.lock().expect("lock"), [0, 1, 2]);
        assert_eq!(queue.run_pending(), 0);
    }

    #[tokio::test]
    async fn queue_ends_when_executors_drop() {
        let (executor, mut queue) = callback_queue();
        executor.execute(Box::new(|| {}));
        drop(executor);

        assert!(queue.run_next().await);
        assert!(!queue.run_next().await);
    }

    #[test]
    fn closed_queue_runs_tasks_inline() {
        let (executor, queue) = callback_queue();
        drop(queue);

        let (tx, rx) = std::sync::mpsc::channel();
        executor.execute(Box::new(move || tx.send("ran").expect("send")));
        assert_eq!(rx.try_recv(), Ok("ran"));
    }

    #[tokio::test]
    async fn runtime_executor_spawns() {
        let executor = RuntimeExecutor::current().expect("runtime");
        let (tx, rx) = tokio::sync::oneshot::channel();
        executor.execute(Box::new(move || {
            let _ = tx.send(7);
        }));
        assert_eq!(rx.await.expect("ran"), 7);
    }
}
