use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use disp_core::error::{DispError, Result};
use disp_core::job::Job;
use disp_core::outcome::{JobOutcome, OutcomeStatus};
use disp_core::worker::WorkerId;
use disp_runtime::testing::{Probe, DEFAULT_WAIT};
use disp_runtime::{
    queue, DispatchOrder, Dispatcher, DispatcherConfig, DispatcherHandle, JobSender, PoolWorker,
    Worker, WorkerPool,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Harness {
    jobs: JobSender,
    handle: DispatcherHandle,
    outcomes: mpsc::UnboundedReceiver<JobOutcome>,
}

fn start(config: DispatcherConfig) -> Harness {
    let (jobs, rx) = queue::channel(config.queue_capacity).unwrap();
    let (sink, outcomes) = mpsc::unbounded_channel();
    let handle = Dispatcher::new(rx, config)
        .with_outcomes(sink)
        .run_default()
        .unwrap();

    Harness {
        jobs,
        handle,
        outcomes,
    }
}

async fn collect(outcomes: &mut mpsc::UnboundedReceiver<JobOutcome>, n: usize) -> Vec<JobOutcome> {
    let mut collected = Vec::with_capacity(n);
    while collected.len() < n {
        let outcome = tokio::time::timeout(DEFAULT_WAIT, outcomes.recv())
            .await
            .expect("timed out waiting for outcome")
            .expect("outcome sink closed");
        collected.push(outcome);
    }
    collected
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_worker_runs_jobs_sequentially() {
    let probe = Probe::new();
    let mut h = start(DispatcherConfig::with_workers(1));

    h.jobs.submit(probe.job("A", Duration::from_millis(1))).await.unwrap();
    h.jobs.submit(probe.job("B", Duration::from_millis(1))).await.unwrap();

    let outcomes = collect(&mut h.outcomes, 2).await;
    assert!(outcomes.iter().all(|o| o.worker_id == WorkerId::new(1)));

    let a = &probe.executions_of("A")[0];
    let b = &probe.executions_of("B")[0];
    let (first, second) = if a.started <= b.started { (a, b) } else { (b, a) };
    assert!(second.started >= first.finished);
    assert!(!probe.worker_overlap());

    h.handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_workers_run_three_jobs_concurrently() {
    let probe = Probe::new();
    let mut h = start(DispatcherConfig::with_workers(3));

    for (name, ms) in [("a", 300), ("b", 350), ("c", 400)] {
        h.jobs.submit(probe.job(name, Duration::from_millis(ms))).await.unwrap();
    }

    assert!(probe.wait_for_active(3, DEFAULT_WAIT).await);

    let outcomes = collect(&mut h.outcomes, 3).await;
    let workers: HashSet<WorkerId> = outcomes.iter().map(|o| o.worker_id).collect();
    assert_eq!(workers.len(), 3);

    h.handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopped_worker_never_receives_a_job() {
    let probe = Probe::new();
    let mut config = DispatcherConfig::with_workers(1);
    config.drain_timeout_ms = 50;
    let mut h = start(config);

    assert!(h.handle.stop_worker(WorkerId::new(1)));
    h.jobs.submit(probe.job("starved", Duration::from_millis(1))).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(probe.completed(), 0);
    assert!(h.outcomes.try_recv().is_err());
    assert_eq!(h.handle.in_flight(), 1);

    let report = h.handle.shutdown().await.unwrap();
    assert!(!report.drained);
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.workers_joined, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_workers_complete_five_jobs_exactly_once() {
    let probe = Probe::new();
    let mut h = start(DispatcherConfig::with_workers(2));

    let mut submitted = HashSet::new();
    for i in 1..=5 {
        let job = probe.job(format!("job-{}", i), Duration::from_millis(2));
        submitted.insert(job.id());
        h.jobs.submit(job).await.unwrap();
    }

    let outcomes = collect(&mut h.outcomes, 5).await;
    let completed: HashSet<_> = outcomes.iter().map(|o| o.job_id).collect();
    assert_eq!(completed, submitted);
    assert!(outcomes.iter().all(JobOutcome::is_success));

    let report = h.handle.shutdown().await.unwrap();
    assert!(report.drained);
    assert_eq!(probe.completed(), 5);
    assert!(probe.max_active() <= 2);
    assert!(h.outcomes.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_never_exceeds_worker_count() {
    let probe = Probe::new();
    let config = DispatcherConfig {
        queue_capacity: Some(2),
        ..DispatcherConfig::with_workers(3)
    };
    let mut h = start(config);

    for i in 0..30 {
        h.jobs
            .submit(probe.job(format!("job-{}", i), Duration::from_millis(2)))
            .await
            .unwrap();
    }

    collect(&mut h.outcomes, 30).await;
    assert!(probe.max_active() <= 3);
    assert!(!probe.worker_overlap());

    h.handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_waits_for_in_flight_job_then_takes_effect() {
    let probe = Probe::new();
    let mut config = DispatcherConfig::with_workers(1);
    config.drain_timeout_ms = 50;
    let mut h = start(config);

    h.jobs.submit(probe.job("long", Duration::from_millis(100))).await.unwrap();
    assert!(probe.wait_for_active(1, DEFAULT_WAIT).await);

    h.handle.stop_worker(WorkerId::new(1));
    h.jobs.submit(probe.job("after-stop", Duration::from_millis(1))).await.unwrap();

    let outcome = collect(&mut h.outcomes, 1).await.remove(0);
    assert_eq!(outcome.job_name, "long");
    assert_eq!(outcome.status, OutcomeStatus::Completed);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(probe.executions_of("after-stop").is_empty());

    let report = h.handle.shutdown().await.unwrap();
    assert_eq!(report.abandoned, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remaining_workers_take_over_from_stopped_one() {
    let probe = Probe::new();
    let mut h = start(DispatcherConfig::with_workers(2));

    h.handle.stop_worker(WorkerId::new(1));
    for i in 0..6 {
        h.jobs
            .submit(probe.job(format!("job-{}", i), Duration::from_millis(1)))
            .await
            .unwrap();
    }

    let outcomes = collect(&mut h.outcomes, 6).await;
    assert!(outcomes.iter().all(|o| o.worker_id == WorkerId::new(2)));

    let report = h.handle.shutdown().await.unwrap();
    assert!(report.drained);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fifo_order_assigns_in_submission_order() {
    let probe = Probe::new();
    let config = DispatcherConfig {
        order: DispatchOrder::Fifo,
        ..DispatcherConfig::with_workers(1)
    };
    let (jobs, rx) = queue::unbounded();
    for i in 0..6 {
        jobs.submit(probe.job(format!("job-{}", i), Duration::from_millis(1)))
            .await
            .unwrap();
    }

    let (sink, mut outcomes) = mpsc::unbounded_channel();
    let handle = Dispatcher::new(rx, config)
        .with_outcomes(sink)
        .run_default()
        .unwrap();

    let outcomes = collect(&mut outcomes, 6).await;
    let names: Vec<_> = outcomes.iter().map(|o| o.job_name.clone()).collect();
    let expected: Vec<_> = (0..6).map(|i| format!("job-{}", i)).collect();
    assert_eq!(names, expected);
    assert!(outcomes.windows(2).all(|w| w[0].seq < w[1].seq));

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_drains_buffered_jobs_and_closes_intake() {
    let probe = Probe::new();
    let h = start(DispatcherConfig::with_workers(2));

    for i in 0..6 {
        h.jobs
            .submit(probe.job(format!("job-{}", i), Duration::from_millis(10)))
            .await
            .unwrap();
    }

    let report = h.handle.shutdown().await.unwrap();
    assert!(report.drained);
    assert_eq!(report.workers_joined, 2);
    assert_eq!(probe.completed(), 6);

    let late = h.jobs.submit(probe.job("late", Duration::ZERO)).await;
    assert!(matches!(late, Err(DispError::QueueClosed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fifo_shutdown_closes_intake_while_waiting_for_a_worker() {
    let probe = Probe::new();
    let config = DispatcherConfig {
        order: DispatchOrder::Fifo,
        drain_timeout_ms: 100,
        ..DispatcherConfig::with_workers(1)
    };
    let h = start(config);

    h.jobs.submit(probe.job("busy", Duration::from_millis(400))).await.unwrap();
    assert!(probe.wait_for_active(1, DEFAULT_WAIT).await);

    // Dequeued, then held by the loop until a worker frees up.
    h.jobs.submit(probe.job("waiting", Duration::from_millis(1))).await.unwrap();
    while h.handle.in_flight() < 2 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    h.jobs.submit(probe.job("buffered", Duration::from_millis(1))).await.unwrap();

    let shutdown = tokio::spawn(h.handle.shutdown());
    tokio::time::sleep(Duration::from_millis(30)).await;

    let late = h.jobs.submit(probe.job("late", Duration::ZERO)).await;
    assert!(matches!(late, Err(DispError::QueueClosed)));

    let report = shutdown.await.unwrap().unwrap();
    assert!(!report.drained);
    assert_eq!(report.abandoned, 3);
    assert_eq!(report.workers_joined, 1);
    assert_eq!(probe.completed(), 1);
    assert!(probe.executions_of("late").is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_gives_up_on_jobs_past_drain_timeout() {
    let probe = Probe::new();
    let mut config = DispatcherConfig::with_workers(1);
    config.drain_timeout_ms = 50;
    let h = start(config);

    h.jobs.submit(probe.job("stuck", Duration::from_secs(600))).await.unwrap();
    assert!(probe.wait_for_active(1, DEFAULT_WAIT).await);

    let report = h.handle.shutdown().await.unwrap();
    assert!(!report.drained);
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.workers_joined, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn job_failures_are_reported_and_worker_keeps_serving() {
    let mut h = start(DispatcherConfig {
        order: DispatchOrder::Fifo,
        ..DispatcherConfig::with_workers(1)
    });

    h.jobs
        .submit(Job::from_fn("fails", |_ctx| async {
            Err(DispError::job("repository not found"))
        }))
        .await
        .unwrap();
    h.jobs
        .submit(Job::from_fn("panics", |ctx| async move {
            if ctx.seq == 1 {
                panic!("bad annex key");
            }
            Ok(())
        }))
        .await
        .unwrap();
    h.jobs
        .submit(Job::delay("slow", Duration::from_secs(30)).with_timeout(Duration::from_millis(20)))
        .await
        .unwrap();
    h.jobs
        .submit(Job::delay("fine", Duration::from_millis(1)))
        .await
        .unwrap();

    let outcomes = collect(&mut h.outcomes, 4).await;
    let statuses: Vec<_> = outcomes.iter().map(|o| o.status.as_str()).collect();
    assert_eq!(statuses, vec!["failed", "panicked", "timed_out", "completed"]);
    assert!(outcomes.iter().all(|o| o.worker_id == WorkerId::new(1)));

    let report = h.handle.shutdown().await.unwrap();
    assert!(report.drained);
}

struct FlakyWorker {
    inner: PoolWorker,
    fail: bool,
    stops: Arc<AtomicUsize>,
}

impl Worker for FlakyWorker {
    fn id(&self) -> WorkerId {
        self.inner.id()
    }

    fn start(&mut self) -> Result<JoinHandle<()>> {
        if self.fail {
            return Err(DispError::WorkerStart {
                worker_id: self.id(),
                reason: "ssh key unavailable".to_string(),
            });
        }
        self.inner.start()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.inner.stop();
    }
}

#[tokio::test]
async fn run_fails_fast_when_a_worker_cannot_start() {
    let stops = Arc::new(AtomicUsize::new(0));
    let (_jobs, rx) = queue::unbounded();

    let factory_stops = stops.clone();
    let result = Dispatcher::new(rx, DispatcherConfig::with_workers(3)).run(
        move |id: WorkerId, pool: WorkerPool| FlakyWorker {
            inner: PoolWorker::new(id, pool),
            fail: id == WorkerId::new(2),
            stops: factory_stops.clone(),
        },
    );

    match result {
        Err(DispError::WorkerStart { worker_id, .. }) => assert_eq!(worker_id, WorkerId::new(2)),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("run should fail"),
    }
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn custom_workers_from_factory_process_jobs() {
    let stops = Arc::new(AtomicUsize::new(0));
    let (jobs, rx) = queue::unbounded();
    let (sink, mut outcomes) = mpsc::unbounded_channel();

    let factory_stops = stops.clone();
    let handle = Dispatcher::new(rx, DispatcherConfig::with_workers(2))
        .with_outcomes(sink)
        .run(move |id, pool| FlakyWorker {
            inner: PoolWorker::new(id, pool),
            fail: false,
            stops: factory_stops.clone(),
        })
        .unwrap();

    jobs.submit(Job::delay("x", Duration::from_millis(1))).await.unwrap();
    assert_eq!(collect(&mut outcomes, 1).await[0].job_name, "x");

    let report = handle.shutdown().await.unwrap();
    assert_eq!(report.workers_joined, 2);
    assert_eq!(stops.load(Ordering::SeqCst), 2);
}
