// End-to-end behaviour of the host: loops, consumers, scopes and failure routing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence_core::CadenceConfig;
use cadence_scheduler::{
    ExceptionHandler, ExceptionHandlerChain, FnJob, IntervalTrigger, Job, JobContext, JobError,
    JobFailure, JobOrigin, SchedulerHost, ServiceJob, ServiceRegistry,
};
use tokio_util::sync::CancellationToken;

fn config(consumers: usize) -> CadenceConfig {
    let mut config = CadenceConfig::default();
    config.scheduler.poll_interval_secs = 1;
    config.queue.consumers = consumers;
    config
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_queued_job_runs_exactly_once_across_consumers() {
    let host = SchedulerHost::new(config(2));
    let hits: Arc<Vec<AtomicUsize>> = Arc::new((0..20).map(|_| AtomicUsize::new(0)).collect());

    for i in 0..20 {
        let hits = Arc::clone(&hits);
        host.enqueue(Arc::new(FnJob::new(format!("job-{i}"), move |_ctx: JobContext| {
            hits[i].fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })));
    }

    let running = host.start(CancellationToken::new());
    wait_until("all queued jobs", || {
        hits.iter().map(|h| h.load(Ordering::SeqCst)).sum::<usize>() == 20
    })
    .await;
    running.stop().await;

    assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
    assert!(host.queue().is_empty());
}

#[tokio::test]
async fn one_shot_interval_task_fires_then_leaves_the_pool() {
    let host = SchedulerHost::new(config(1));
    let ran = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&ran);
    let trigger = IntervalTrigger::new(chrono::Duration::zero())
        .unwrap()
        .with_repeat_count(1)
        .unwrap();
    host.schedule_recurring(
        Arc::new(FnJob::new("once", move |_ctx: JobContext| {
            r.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })),
        Box::new(trigger),
    );

    let running = host.start(CancellationToken::new());
    wait_until("task eviction", || host.pool().is_empty()).await;
    running.stop().await;

    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

struct Collecting(Mutex<Vec<String>>);

impl ExceptionHandler for Collecting {
    fn handle(&self, failure: &JobFailure) -> bool {
        assert_eq!(failure.origin, JobOrigin::Queued);
        self.0.lock().unwrap().push(failure.job_name.clone());
        true
    }
}

#[tokio::test]
async fn queued_failures_reach_the_exception_handler() {
    let collected = Arc::new(Collecting(Mutex::new(Vec::new())));
    let chain = ExceptionHandlerChain::new().with(collected.clone(), 0);
    let host = SchedulerHost::new(config(1)).with_exception_handler(Arc::new(chain));

    host.enqueue(Arc::new(FnJob::new("broken", |_ctx: JobContext| async {
        Err(JobError::failed("disk full"))
    })));
    let after = Arc::new(AtomicUsize::new(0));
    let a = Arc::clone(&after);
    host.enqueue(Arc::new(FnJob::new("after", move |_ctx: JobContext| {
        a.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    })));

    let running = host.start(CancellationToken::new());
    wait_until("second job", || after.load(Ordering::SeqCst) == 1).await;
    running.stop().await;

    assert_eq!(*collected.0.lock().unwrap(), vec!["broken".to_string()]);
}

struct Greeter {
    greeted: AtomicUsize,
}

#[tokio::test]
async fn service_jobs_resolve_from_the_host_registry() {
    let greeter = Arc::new(Greeter { greeted: AtomicUsize::new(0) });
    let registry = ServiceRegistry::new().singleton(Arc::clone(&greeter));
    let host = SchedulerHost::new(config(1)).with_scopes(Arc::new(registry));

    let job: Arc<dyn Job> = Arc::new(ServiceJob::new("greet", |g: Arc<Greeter>, _ctx: JobContext| async move {
        g.greeted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    host.enqueue(Arc::clone(&job));
    host.enqueue(job);

    let running = host.start(CancellationToken::new());
    wait_until("greetings", || greeter.greeted.load(Ordering::SeqCst) == 2).await;
    running.stop().await;
}

#[tokio::test]
async fn shutdown_reaches_running_jobs() {
    let host = SchedulerHost::new(config(1));
    let started = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&started);
    host.enqueue(Arc::new(FnJob::new("long", move |ctx: JobContext| {
        s.fetch_add(1, Ordering::SeqCst);
        async move {
            ctx.cancelled().await;
            ctx.checkpoint()
        }
    })));

    let shutdown = CancellationToken::new();
    let running = host.start(shutdown.clone());
    wait_until("job start", || started.load(Ordering::SeqCst) == 1).await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), running.join())
        .await
        .expect("loops should exit after shutdown");
}
