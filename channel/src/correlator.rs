//! Reply Correlator - Time-Bounded Pending-Span Table
//!
//! Decouples duplex sends from duplex receives. A two-way send parks its span
//! here keyed by the outgoing message id; the matching receive claims it back.
//! Each entry arms its own cancellable timer, so an unanswered send is
//! finalized as a failure after the configured timeout and the table never
//! grows without bound.
//!
//! Exactly one of {matched, timed out, disposed} happens per entry. The
//! sending task, the receiving task, and timer tasks all serialize on one
//! mutex; removal is the commit point, and whichever path removes the entry
//! owns its span.
//!
//! `dispose` drops still-pending entries *without* invoking the timeout
//! callback: shutdown is not a call failure, and fabricating failure records
//! on close would over-report.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use wiretap_core::Span;

use crate::error::CorrelatorError;

/// Invoked with `(message_id, span)` when an entry expires unmatched.
pub type TimeoutCallback = Arc<dyn Fn(&str, Span) + Send + Sync>;

struct PendingReply {
    span: Span,
    timer: JoinHandle<()>,
}

struct CorrelatorInner {
    entries: HashMap<String, PendingReply>,
    disposed: bool,
}

pub struct ReplyCorrelator {
    inner: Mutex<CorrelatorInner>,
    on_timeout: TimeoutCallback,
    // Handed to per-entry timer tasks; Weak so a timer never keeps a dropped
    // correlator alive.
    self_ref: Weak<ReplyCorrelator>,
}

impl ReplyCorrelator {
    pub fn new(on_timeout: TimeoutCallback) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            inner: Mutex::new(CorrelatorInner {
                entries: HashMap::new(),
                disposed: false,
            }),
            on_timeout,
            self_ref: weak.clone(),
        })
    }

    /// Park a span under `message_id` and arm its expiry timer.
    ///
    /// Fails fast, before any state changes, on an empty or duplicate id or a
    /// disposed correlator; the span is dropped unrecorded in that case.
    ///
    /// Must be called from within a tokio runtime (arms a sleep task).
    pub fn add(
        &self,
        message_id: &str,
        span: Span,
        timeout: Duration,
    ) -> Result<(), CorrelatorError> {
        if message_id.is_empty() {
            return Err(CorrelatorError::InvalidArgument {
                what: "message id must not be empty".to_string(),
            });
        }

        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(CorrelatorError::AlreadyDisposed);
        }
        if inner.entries.contains_key(message_id) {
            return Err(CorrelatorError::InvalidArgument {
                what: format!("duplicate message id {message_id}"),
            });
        }

        let correlator = self.self_ref.clone();
        let expired_id = message_id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(correlator) = Weak::upgrade(&correlator) {
                correlator.expire(&expired_id);
            }
        });

        inner.entries.insert(
            message_id.to_string(),
            PendingReply { span, timer },
        );
        Ok(())
    }

    /// Claim the span parked under `message_id`, disarming its timer.
    ///
    /// A given entry can be found at most once; a second lookup returns
    /// `None`.
    pub fn try_lookup(&self, message_id: &str) -> Option<Span> {
        let entry = self.inner.lock().entries.remove(message_id)?;
        entry.timer.abort();
        Some(entry.span)
    }

    /// Drop the entry for `message_id`, if any, without finalizing its span.
    ///
    /// Used when a send's own completion fails and no reply will ever arrive.
    pub fn remove(&self, message_id: &str) {
        if self.try_lookup(message_id).is_some() {
            tracing::debug!(message_id, "pending correlation discarded");
        }
    }

    /// Cancel all timers and drop all entries without the timeout callback.
    pub fn dispose(&self) {
        let drained: Vec<PendingReply> = {
            let mut inner = self.inner.lock();
            inner.disposed = true;
            inner.entries.drain().map(|(_, entry)| entry).collect()
        };
        if !drained.is_empty() {
            tracing::debug!(
                dropped = drained.len(),
                "correlator disposed with pending entries; spans dropped unrecorded"
            );
        }
        for entry in drained {
            entry.timer.abort();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    fn expire(&self, message_id: &str) {
        // Lose the race against try_lookup/dispose and there is nothing to do.
        let Some(entry) = self.inner.lock().entries.remove(message_id) else {
            return;
        };
        tracing::debug!(message_id, "pending reply timed out");
        // Callback runs outside the lock; it will finalize the span.
        (self.on_timeout)(message_id, entry.span);
    }
}

impl std::fmt::Debug for ReplyCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ReplyCorrelator")
            .field("pending", &inner.entries.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_span() -> Span {
        Span::remote_call("GetQuote", "quotes:9000", "urn:quotes/Get")
    }

    fn counting_correlator() -> (Arc<ReplyCorrelator>, Arc<AtomicUsize>) {
        let timeouts = Arc::new(AtomicUsize::new(0));
        let counter = timeouts.clone();
        let correlator = ReplyCorrelator::new(Arc::new(move |_id, _span| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        (correlator, timeouts)
    }

    #[tokio::test]
    async fn test_lookup_within_timeout_wins_once() {
        let (correlator, timeouts) = counting_correlator();
        correlator
            .add("m1", test_span(), Duration::from_millis(100))
            .unwrap();

        assert!(correlator.try_lookup("m1").is_some());
        assert!(correlator.try_lookup("m1").is_none());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_fires_once_then_lookup_misses() {
        let (correlator, timeouts) = counting_correlator();
        correlator
            .add("m2", test_span(), Duration::from_millis(50))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
        assert!(correlator.try_lookup("m2").is_none());
    }

    #[tokio::test]
    async fn test_add_rejects_empty_and_duplicate_ids() {
        let (correlator, _) = counting_correlator();
        assert!(matches!(
            correlator.add("", test_span(), Duration::from_secs(1)),
            Err(CorrelatorError::InvalidArgument { .. })
        ));

        correlator
            .add("m3", test_span(), Duration::from_secs(1))
            .unwrap();
        assert!(matches!(
            correlator.add("m3", test_span(), Duration::from_secs(1)),
            Err(CorrelatorError::InvalidArgument { .. })
        ));
        assert_eq!(correlator.len(), 1);
    }

    #[tokio::test]
    async fn test_dispose_drops_pending_without_callbacks() {
        let (correlator, timeouts) = counting_correlator();
        correlator
            .add("m4", test_span(), Duration::from_millis(30))
            .unwrap();
        correlator
            .add("m5", test_span(), Duration::from_millis(30))
            .unwrap();

        correlator.dispose();
        assert!(correlator.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);

        assert_eq!(
            correlator.add("m6", test_span(), Duration::from_secs(1)),
            Err(CorrelatorError::AlreadyDisposed)
        );
    }

    #[tokio::test]
    async fn test_remove_discards_silently() {
        let (correlator, timeouts) = counting_correlator();
        correlator
            .add("m7", test_span(), Duration::from_millis(40))
            .unwrap();
        correlator.remove("m7");
        assert!(correlator.try_lookup("m7").is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lookup_and_timeout_resolve_once() {
        // Race a near-instant timer against a concurrent lookup, many times.
        // Each id must resolve exactly once: matched or timed out, never both.
        for round in 0..50 {
            let (correlator, timeouts) = counting_correlator();
            let id = format!("race-{round}");
            correlator
                .add(&id, test_span(), Duration::from_millis(1))
                .unwrap();

            let contender = {
                let correlator = correlator.clone();
                let id = id.clone();
                tokio::spawn(async move { correlator.try_lookup(&id).is_some() })
            };

            let matched = contender.await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            let timed_out = timeouts.load(Ordering::SeqCst);

            assert_eq!(
                matched as usize + timed_out,
                1,
                "id {id} resolved {} times",
                matched as usize + timed_out
            );
        }
    }
}
