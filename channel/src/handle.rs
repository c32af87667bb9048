//! Call Handle - Decoupled Completion for One Inner Call
//!
//! `CallHandle` unifies "completed before the method returned" and "completes
//! later on another task" behind one consume-once handle:
//!
//! * `issue` polls the inner future once. If it is already finished, the
//!   completion hook runs inline and the handle is born terminal
//!   (`completed_synchronously`). Otherwise a spawned task drives the future,
//!   runs the completion hook, and only then publishes the result.
//! * `join` consumes the handle, waits for the terminal state if necessary,
//!   and returns the inner result or the captured error.
//!
//! The completion hook is where a decorator finalizes its span, so a caller
//! can never observe a completed handle whose span is still open. Exactly one
//! of the inline path and the task path runs the hook. The hook is
//! panic-isolated: a telemetry failure must not poison the completion task.
//!
//! Dropping a handle without joining does not cancel the call; the task still
//! drives the inner future and the completion hook still runs.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use tokio::sync::oneshot;

use crate::error::ChannelError;

enum HandleState<T> {
    /// Terminal before the constructor returned.
    Ready(Result<T, ChannelError>),
    /// A spawned task will publish the result.
    Waiting(oneshot::Receiver<Result<T, ChannelError>>),
}

pub struct CallHandle<T> {
    state: HandleState<T>,
    completed_synchronously: bool,
    done: Arc<AtomicBool>,
}

impl<T: Send + 'static> CallHandle<T> {
    /// Issue an inner call with a completion hook.
    ///
    /// Must be called from within a tokio runtime (the slow path spawns).
    pub fn issue<F, C>(future: F, completion: C) -> Self
    where
        F: Future<Output = Result<T, ChannelError>> + Send + 'static,
        C: FnOnce(&Result<T, ChannelError>) + Send + 'static,
    {
        let mut future = Box::pin(future);

        // Fast path: the inner call finished before we returned.
        if let Some(result) = (&mut future).now_or_never() {
            run_completion(completion, &result);
            return Self {
                state: HandleState::Ready(result),
                completed_synchronously: true,
                done: Arc::new(AtomicBool::new(true)),
            };
        }

        let done = Arc::new(AtomicBool::new(false));
        let task_done = Arc::clone(&done);
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = future.await;
            run_completion(completion, &result);
            task_done.store(true, Ordering::Release);
            // The handle may have been dropped without a join; that only
            // discards the result, never the telemetry.
            let _ = tx.send(result);
        });

        Self {
            state: HandleState::Waiting(rx),
            completed_synchronously: false,
            done,
        }
    }

    /// A handle that was terminal at creation. Used by issuance-failure paths
    /// whose telemetry was already finalized by the caller.
    pub fn ready(result: Result<T, ChannelError>) -> Self {
        Self {
            state: HandleState::Ready(result),
            completed_synchronously: true,
            done: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Did the inner call finish before `begin_*` returned?
    pub fn completed_synchronously(&self) -> bool {
        self.completed_synchronously
    }

    /// Has the inner call reached its terminal state?
    pub fn is_completed(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Wait for completion and take the result. Consumes the handle; a result
    /// can be taken exactly once.
    pub async fn join(self) -> Result<T, ChannelError> {
        match self.state {
            HandleState::Ready(result) => result,
            HandleState::Waiting(rx) => match rx.await {
                Ok(result) => result,
                // The driving task died before publishing (inner future
                // panicked). Surface it as a call failure.
                Err(_) => Err(ChannelError::Transport("call task aborted".to_string())),
            },
        }
    }
}

fn run_completion<T, C>(completion: C, result: &Result<T, ChannelError>)
where
    C: FnOnce(&Result<T, ChannelError>),
{
    if catch_unwind(AssertUnwindSafe(|| completion(result))).is_err() {
        tracing::warn!("call completion hook panicked; telemetry for this call may be lost");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_synchronous_completion_fast_path() {
        let hook_runs = Arc::new(AtomicUsize::new(0));
        let counter = hook_runs.clone();

        let handle = CallHandle::issue(async { Ok(7u32) }, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.completed_synchronously());
        assert!(handle.is_completed());
        // The hook already ran, before issue returned.
        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
        assert_eq!(handle.join().await.unwrap(), 7);
        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_asynchronous_completion() {
        let hook_runs = Arc::new(AtomicUsize::new(0));
        let counter = hook_runs.clone();

        let handle = CallHandle::issue(
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(1u32)
            },
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert!(!handle.completed_synchronously());
        assert_eq!(handle.join().await.unwrap(), 1);
        // Completion ran before join could observe the result.
        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_join_rethrows_captured_error() {
        let handle: CallHandle<()> = CallHandle::issue(
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err(ChannelError::Timeout)
            },
            |_| {},
        );
        assert!(matches!(handle.join().await, Err(ChannelError::Timeout)));
    }

    #[tokio::test]
    async fn test_dropped_handle_still_completes() {
        let hook_runs = Arc::new(AtomicUsize::new(0));
        let counter = hook_runs.clone();

        let handle: CallHandle<u32> = CallHandle::issue(
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(3)
            },
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        drop(handle);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ready_handle_is_born_terminal() {
        let handle = CallHandle::ready(Ok(9u32));
        assert!(handle.completed_synchronously());
        assert!(handle.is_completed());
        assert_eq!(handle.join().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_panicking_hook_is_contained() {
        let handle = CallHandle::issue(async { Ok(5u32) }, |_| panic!("hook exploded"));
        assert_eq!(handle.join().await.unwrap(), 5);
    }
}
