use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Result, TaskError};
use crate::sink::{TaskSink, TracingTaskSink};

/// Smallest period a periodic task runs at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// When a periodic task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSchedule {
    /// Time between the starts of consecutive iterations. Iterations that
    /// overrun are not made up.
    pub interval: Duration,
    /// Delay before the first iteration.
    pub initial_delay: Duration,
}

impl TaskSchedule {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            initial_delay: Duration::ZERO,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

impl Default for TaskSchedule {
    fn default() -> Self {
        Self::every(Duration::from_secs(1))
    }
}

/// Schedules blocking work on a tokio runtime.
///
/// Cloning is cheap; clones share the runtime, the sink and the root
/// cancellation token.
#[derive(Clone)]
pub struct TaskRunner {
    handle: Handle,
    root: Arc<Mutex<CancellationToken>>,
    sink: Arc<dyn TaskSink>,
}

impl TaskRunner {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            root: Arc::new(Mutex::new(CancellationToken::new())),
            sink: Arc::new(TracingTaskSink),
        }
    }

    /// Runner on the runtime the calling thread belongs to.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|err| TaskError::NoRuntime(err.to_string()))
    }

    pub fn with_sink(mut self, sink: Arc<dyn TaskSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Run `work` repeatedly until it fails or the task is cancelled.
    pub fn schedule<F>(&self, name: impl Into<String>, schedule: TaskSchedule, work: F) -> TaskHandle
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.spawn(name.into(), schedule.initial_delay, Some(schedule.interval), work)
    }

    /// Run `work` a single time after `delay`.
    pub fn schedule_once<F>(&self, name: impl Into<String>, delay: Duration, work: F) -> TaskHandle
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let mut work = Some(work);
        self.spawn(name.into(), delay, None, move || match work.take() {
            Some(work) => work(),
            None => Ok(()),
        })
    }

    pub fn cancel(&self, task: &TaskHandle) {
        task.cancel();
    }

    /// Cancel every task scheduled so far. Tasks scheduled afterwards run
    /// normally.
    pub fn cancel_all(&self) {
        let mut root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        root.cancel();
        *root = CancellationToken::new();
        debug!("all background tasks cancelled");
    }

    fn spawn<F>(
        &self,
        name: String,
        initial_delay: Duration,
        interval: Option<Duration>,
        work: F,
    ) -> TaskHandle
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        let token = self
            .root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token();
        let name: Arc<str> = Arc::from(name);

        let task = self.handle.spawn(run(
            Arc::clone(&name),
            initial_delay,
            interval,
            work,
            token.clone(),
            Arc::clone(&self.sink),
        ));
        debug!(task = %name, ?interval, ?initial_delay, "background task scheduled");

        TaskHandle { name, token, task }
    }
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner").finish_non_exhaustive()
    }
}

/// Handle to one scheduled task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle {
    name: Arc<str>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the task. An iteration already running completes; no further
    /// iteration starts.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the task has ended, for any reason.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end.
    pub async fn join(self) -> Result<()> {
        self.task.await.map_err(|err| TaskError::Panicked {
            task: self.name.to_string(),
            message: err.to_string(),
        })
    }
}

async fn run<F>(
    name: Arc<str>,
    initial_delay: Duration,
    interval: Option<Duration>,
    mut work: F,
    token: CancellationToken,
    sink: Arc<dyn TaskSink>,
) where
    F: FnMut() -> Result<()> + Send + 'static,
{
    let mut next = Instant::now() + initial_delay;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = time::sleep_until(next) => {}
        }
        if token.is_cancelled() {
            break;
        }

        trace!(task = %name, "running iteration");
        let outcome = tokio::task::spawn_blocking(move || {
            let result = work();
            (work, result)
        })
        .await;

        match outcome {
            Ok((returned, Ok(()))) => work = returned,
            Ok((_, Err(err))) => {
                sink.task_failed(&name, &err);
                return;
            }
            Err(err) if err.is_panic() => {
                let err = TaskError::Panicked {
                    task: name.to_string(),
                    message: panic_message(err.into_panic()),
                };
                sink.task_failed(&name, &err);
                return;
            }
            // Runtime shutting down.
            Err(_) => return,
        }

        let Some(interval) = interval else {
            break;
        };
        // Fixed rate; an iteration that overruns is followed at once by the next.
        next += interval.max(MIN_INTERVAL);
        next = next.max(Instant::now());
    }

    sink.task_stopped(&name);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        failed: Mutex<Vec<(String, String)>>,
        stopped: Mutex<Vec<String>>,
    }

    impl TaskSink for RecordingSink {
        fn task_failed(&self, task: &str, error: &TaskError) {
            self.failed
                .lock()
                .unwrap()
                .push((task.to_string(), error.to_string()));
        }

        fn task_stopped(&self, task: &str) {
            self.stopped.lock().unwrap().push(task.to_string());
        }
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&count), count)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn periodic_task_runs_until_cancelled() {
        let sink = Arc::new(RecordingSink::default());
        let runner = TaskRunner::current().unwrap().with_sink(sink.clone());
        let (count, seen) = counter();

        let task = runner.schedule("tick", TaskSchedule::every(Duration::from_millis(10)), move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        time::sleep(Duration::from_millis(100)).await;
        runner.cancel(&task);
        assert!(task.is_cancelled());
        task.join().await.unwrap();

        let after_cancel = seen.load(Ordering::SeqCst);
        assert!(after_cancel >= 3, "ran {after_cancel} times");
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), after_cancel);
        assert_eq!(sink.stopped.lock().unwrap().as_slice(), ["tick".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failure_stops_only_the_failing_task() {
        let sink = Arc::new(RecordingSink::default());
        let runner = TaskRunner::current().unwrap().with_sink(sink.clone());
        let (failing_count, failing_seen) = counter();
        let (sibling_count, sibling_seen) = counter();

        let failing = runner.schedule("failing", TaskSchedule::every(Duration::from_millis(5)), move || {
            if failing_count.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(TaskError::failed("sensor offline"));
            }
            Ok(())
        });
        let sibling = runner.schedule("sibling", TaskSchedule::every(Duration::from_millis(5)), move || {
            sibling_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        failing.join().await.unwrap();
        assert_eq!(failing_seen.load(Ordering::SeqCst), 2);

        let before = sibling_seen.load(Ordering::SeqCst);
        time::sleep(Duration::from_millis(50)).await;
        assert!(sibling_seen.load(Ordering::SeqCst) > before);
        assert!(!sibling.is_finished());
        sibling.cancel();

        let failed = sink.failed.lock().unwrap().clone();
        assert_eq!(failed, vec![("failing".to_string(), "sensor offline".to_string())]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panic_is_reported() {
        let sink = Arc::new(RecordingSink::default());
        let runner = TaskRunner::current().unwrap().with_sink(sink.clone());

        let task = runner.schedule("boom", TaskSchedule::every(Duration::from_millis(5)), || {
            panic!("checksum table corrupt");
        });
        task.join().await.unwrap();

        let failed = sink.failed.lock().unwrap().clone();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "boom");
        assert!(failed[0].1.contains("checksum table corrupt"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn once_runs_a_single_time_after_delay() {
        let runner = TaskRunner::current().unwrap();
        let (count, seen) = counter();
        let started = Instant::now();

        let task = runner.schedule_once("once", Duration::from_millis(30), move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        task.join().await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_during_initial_delay_skips_work() {
        let runner = TaskRunner::current().unwrap();
        let (count, seen) = counter();

        let task = runner.schedule(
            "delayed",
            TaskSchedule::every(Duration::from_millis(5))
                .with_initial_delay(Duration::from_millis(200)),
            move || {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );
        task.cancel();
        task.join().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_all_leaves_runner_usable() {
        let runner = TaskRunner::current().unwrap();
        let every = TaskSchedule::every(Duration::from_millis(5));
        let first = runner.schedule("a", every, || Ok(()));
        let second = runner.schedule("b", every, || Ok(()));

        runner.cancel_all();
        first.join().await.unwrap();
        second.join().await.unwrap();

        let (count, seen) = counter();
        let later = runner.schedule_once("c", Duration::ZERO, move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(!later.is_cancelled());
        later.join().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn current_requires_a_runtime() {
        assert!(matches!(TaskRunner::current(), Err(TaskError::NoRuntime(_))));
    }
}
