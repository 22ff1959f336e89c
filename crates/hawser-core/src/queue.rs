//! Serialized task queue with minimum inter-start spacing.
//!
//! [`DelayedQueue`] runs heterogeneous units of work strictly one at a time,
//! enforcing a minimum wall-clock interval between task *starts* — the tool
//! for throttling calls into a rate-limited external service. The handler
//! settles each attempt with a [`Verdict`]: done, failed, or retry. A retried
//! task is reinserted at the front of the pending queue with an incremented
//! tries count, and its rerun honors the spacing rule measured from the
//! attempt's start time, not its completion — slow handlers do not inflate
//! the enforced cadence.
//!
//! The queue imposes no retry cap; the handler decides when to stop retrying.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

/// Outcome of one handler attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict<T, E> {
    /// The task settled successfully.
    Done(T),
    /// The task settled with an error, surfaced to the submitter.
    Fail(E),
    /// Rerun the same task next, with `tries + 1`.
    Retry,
}

/// Error surfaced to a [`DelayedQueue::push`] caller.
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    /// The handler settled the task with an error.
    #[error("task handler reported failure")]
    Failed(E),
    /// The queue worker went away before the task settled.
    #[error("queue closed before the task settled")]
    Closed,
}

struct Job<P, T, E> {
    payload: P,
    tries: u32,
    settle: oneshot::Sender<Result<T, E>>,
}

/// FIFO task runner enforcing a minimum spacing between task starts.
///
/// Must be created inside a Tokio runtime; dropping every handle lets the
/// worker drain what it already holds and exit.
pub struct DelayedQueue<P, T, E> {
    submit: mpsc::UnboundedSender<Job<P, T, E>>,
}

impl<P, T, E> Clone for DelayedQueue<P, T, E> {
    fn clone(&self) -> Self {
        Self {
            submit: self.submit.clone(),
        }
    }
}

impl<P, T, E> DelayedQueue<P, T, E>
where
    P: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Spawn a queue worker with the given spacing and task handler.
    ///
    /// The handler receives `(payload, tries)` where `tries` counts prior
    /// attempts of the same task (0 for the first run).
    pub fn new<H, Fut>(spacing: Duration, handler: H) -> Self
    where
        H: Fn(P, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Verdict<T, E>> + Send + 'static,
    {
        let (submit, inbox) = mpsc::unbounded_channel();
        drop(tokio::spawn(run_worker(spacing, handler, inbox)));
        Self { submit }
    }

    /// Append a task to the tail and wait for it to settle.
    ///
    /// Resolves once the handler returns [`Verdict::Done`] or
    /// [`Verdict::Fail`] for this task; retries are invisible to the caller.
    pub async fn push(&self, payload: P) -> Result<T, TaskError<E>> {
        let (settle, settled) = oneshot::channel();
        self.submit
            .send(Job {
                payload,
                tries: 0,
                settle,
            })
            .map_err(|_| TaskError::Closed)?;
        match settled.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(TaskError::Failed(error)),
            Err(_) => Err(TaskError::Closed),
        }
    }
}

async fn run_worker<P, T, E, H, Fut>(
    spacing: Duration,
    handler: H,
    mut inbox: mpsc::UnboundedReceiver<Job<P, T, E>>,
) where
    P: Clone + Send + 'static,
    H: Fn(P, u32) -> Fut,
    Fut: Future<Output = Verdict<T, E>>,
{
    let mut pending: VecDeque<Job<P, T, E>> = VecDeque::new();
    // Start time of the most recent attempt; spacing is measured against
    // starts, never completions.
    let mut last_start: Option<Instant> = None;

    loop {
        if pending.is_empty() {
            match inbox.recv().await {
                Some(job) => pending.push_back(job),
                None => return,
            }
        }
        while let Ok(job) = inbox.try_recv() {
            pending.push_back(job);
        }

        if let Some(started) = last_start {
            let elapsed = started.elapsed();
            if elapsed < spacing {
                tokio::time::sleep(spacing - elapsed).await;
            }
        }

        let Some(mut job) = pending.pop_front() else {
            continue;
        };
        last_start = Some(Instant::now());
        match handler(job.payload.clone(), job.tries).await {
            Verdict::Done(value) => {
                let _ = job.settle.send(Ok(value));
            }
            Verdict::Fail(error) => {
                let _ = job.settle.send(Err(error));
            }
            Verdict::Retry => {
                debug!(tries = job.tries + 1, "task requeued for retry");
                job.tries += 1;
                pending.push_front(job);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    const SPACING: Duration = Duration::from_millis(250);

    /// Record of one handler attempt: payload, tries, start time.
    type Log = Arc<Mutex<Vec<(u32, u32, Instant)>>>;

    fn new_log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn settles_success_and_failure() {
        let queue: DelayedQueue<u32, u32, String> =
            DelayedQueue::new(Duration::ZERO, |payload, _tries| async move {
                if payload % 2 == 0 {
                    Verdict::Done(payload * 10)
                } else {
                    Verdict::Fail(format!("odd payload {payload}"))
                }
            });

        assert_eq!(queue.push(4).await.unwrap(), 40);
        let err = queue.push(3).await.unwrap_err();
        assert!(matches!(err, TaskError::Failed(ref m) if m == "odd payload 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_order_preserved() {
        let log = new_log();
        let seen = log.clone();
        let queue: DelayedQueue<u32, (), ()> = DelayedQueue::new(SPACING, move |payload, tries| {
            seen.lock().push((payload, tries, Instant::now()));
            async { Verdict::Done(()) }
        });

        let (a, b, c) = tokio::join!(queue.push(1), queue.push(2), queue.push(3));
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let order: Vec<u32> = log.lock().iter().map(|(p, _, _)| *p).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_between_immediate_tasks() {
        let log = new_log();
        let seen = log.clone();
        let queue: DelayedQueue<u32, (), ()> = DelayedQueue::new(SPACING, move |payload, tries| {
            seen.lock().push((payload, tries, Instant::now()));
            async { Verdict::Done(()) }
        });

        let (a, b) = tokio::join!(queue.push(1), queue.push(2));
        a.unwrap();
        b.unwrap();

        let starts: Vec<Instant> = log.lock().iter().map(|(_, _, t)| *t).collect();
        assert_eq!(starts.len(), 2);
        assert!(starts[1] - starts[0] >= SPACING);
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_measured_from_start_not_completion() {
        let log = new_log();
        let seen = log.clone();
        // Handler takes 100 ms; cadence must still be 250 ms, not 350 ms.
        let queue: DelayedQueue<u32, (), ()> = DelayedQueue::new(SPACING, move |payload, tries| {
            seen.lock().push((payload, tries, Instant::now()));
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Verdict::Done(())
            }
        });

        let (a, b) = tokio::join!(queue.push(1), queue.push(2));
        a.unwrap();
        b.unwrap();

        let starts: Vec<Instant> = log.lock().iter().map(|(_, _, t)| *t).collect();
        let gap = starts[1] - starts[0];
        assert!(gap >= SPACING);
        assert!(gap < SPACING + Duration::from_millis(50), "gap was {gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_never_overlaps() {
        let log = new_log();
        let seen = log.clone();
        // Handler outlives the spacing window; serialization must hold.
        let queue: DelayedQueue<u32, (), ()> = DelayedQueue::new(SPACING, move |payload, tries| {
            seen.lock().push((payload, tries, Instant::now()));
            async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Verdict::Done(())
            }
        });

        let (a, b) = tokio::join!(queue.push(1), queue.push(2));
        a.unwrap();
        b.unwrap();

        let starts: Vec<Instant> = log.lock().iter().map(|(_, _, t)| *t).collect();
        assert!(starts[1] - starts[0] >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_reinserts_at_front_with_incremented_tries() {
        let log = new_log();
        let seen = log.clone();
        let queue: DelayedQueue<u32, u32, ()> = DelayedQueue::new(SPACING, move |payload, tries| {
            seen.lock().push((payload, tries, Instant::now()));
            async move {
                if payload == 1 && tries < 2 {
                    Verdict::Retry
                } else {
                    Verdict::Done(payload)
                }
            }
        });

        let (a, b) = tokio::join!(queue.push(1), queue.push(2));
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 2);

        // The retried task runs to completion before the queued one starts.
        let attempts: Vec<(u32, u32)> = log.lock().iter().map(|(p, t, _)| (*p, *t)).collect();
        assert_eq!(attempts, vec![(1, 0), (1, 1), (1, 2), (2, 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_cadence_measured_from_attempt_start() {
        let log = new_log();
        let seen = log.clone();
        // Each attempt takes 100 ms and retries twice before settling.
        let queue: DelayedQueue<u32, (), ()> = DelayedQueue::new(SPACING, move |payload, tries| {
            seen.lock().push((payload, tries, Instant::now()));
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                if tries < 2 { Verdict::Retry } else { Verdict::Done(()) }
            }
        });

        queue.push(1).await.unwrap();

        let starts: Vec<Instant> = log.lock().iter().map(|(_, _, t)| *t).collect();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= SPACING);
            assert!(gap < SPACING + Duration::from_millis(50), "gap was {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn clone_submits_to_same_worker() {
        let log = new_log();
        let seen = log.clone();
        let queue: DelayedQueue<u32, (), ()> = DelayedQueue::new(SPACING, move |payload, tries| {
            seen.lock().push((payload, tries, Instant::now()));
            async { Verdict::Done(()) }
        });
        let other = queue.clone();

        let (a, b) = tokio::join!(queue.push(1), other.push(2));
        a.unwrap();
        b.unwrap();

        let starts: Vec<Instant> = log.lock().iter().map(|(_, _, t)| *t).collect();
        assert!(starts[1] - starts[0] >= SPACING);
    }

    #[tokio::test(start_paused = true)]
    async fn tries_are_per_task() {
        let log = new_log();
        let seen = log.clone();
        let queue: DelayedQueue<u32, (), ()> = DelayedQueue::new(Duration::ZERO, move |payload, tries| {
            seen.lock().push((payload, tries, Instant::now()));
            async move {
                if tries == 0 { Verdict::Retry } else { Verdict::Done(()) }
            }
        });

        let (a, b) = tokio::join!(queue.push(1), queue.push(2));
        a.unwrap();
        b.unwrap();

        let attempts: Vec<(u32, u32)> = log.lock().iter().map(|(p, t, _)| (*p, *t)).collect();
        // Each task retries once from a fresh tries count.
        assert_eq!(attempts, vec![(1, 0), (1, 1), (2, 0), (2, 1)]);
    }
}
