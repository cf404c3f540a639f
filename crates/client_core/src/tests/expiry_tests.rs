use super::*;
use anyhow::anyhow;
use std::sync::atomic::{AtomicUsize, Ordering};

const EVERY: Duration = Duration::from_secs(60);

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

struct FixedItems(Result<Vec<Item>, String>);

#[async_trait]
impl RemoteItemSource for FixedItems {
    async fn fetch_items(&self) -> Result<Vec<Item>> {
        self.0.clone().map_err(|msg| anyhow!(msg))
    }
}

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<Vec<Item>>>);

impl ExpiryNotifier for RecordingNotifier {
    fn notify_expired(&self, expired: &[Item]) {
        self.0.lock().expect("lock").push(expired.to_vec());
    }
}

fn check(items: Result<Vec<Item>, String>) -> (ExpiryCheck, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let check = ExpiryCheck::new(Arc::new(FixedItems(items)), notifier.clone());
    (check, notifier)
}

#[tokio::test]
async fn notifies_with_expired_items_only() {
    let flour = Item::draft("Flour", 1, "2023-06-01", "A").with_id("1");
    let (check, notifier) = check(Ok(vec![
        flour.clone(),
        Item::draft("Sugar", 1, "2099-06-01", "B").with_id("2"),
        Item::draft("Yeast", 1, "whenever", "C").with_id("3"),
    ]));

    let report = check.run_once(day(2024, 1, 1)).await.expect("report");
    assert_eq!(report.checked, 3);
    assert_eq!(report.expired, vec![flour.clone()]);
    assert_eq!(report.unparseable, 1);
    assert_eq!(*notifier.0.lock().expect("lock"), vec![vec![flour]]);
}

#[tokio::test]
async fn nothing_expired_means_no_notification() {
    let (check, notifier) = check(Ok(vec![
        Item::draft("Sugar", 1, "01.01.2024", "B").with_id("2"),
    ]));

    let report = check.run_once(day(2024, 1, 1)).await.expect("report");
    assert!(report.expired.is_empty());
    assert!(notifier.0.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn fetch_failure_is_reported_without_notification() {
    let (check, notifier) = check(Err("store offline".to_string()));
    let err = check.run_once(day(2024, 1, 1)).await.expect_err("fetch fails");
    assert!(err.to_string().contains("store offline"));
    assert!(notifier.0.lock().expect("lock").is_empty());
}

/// Counts runs; fails or panics on the runs listed in `fail_on`/`panic_on`.
#[derive(Default)]
struct CountingTask {
    runs: AtomicUsize,
    fail_on: Option<usize>,
    panic_on: Option<usize>,
}

#[async_trait]
impl PeriodicTask for CountingTask {
    async fn run(&self) -> Result<()> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on == Some(run) {
            panic!("run {run} blew up");
        }
        if self.fail_on == Some(run) {
            return Err(anyhow!("run {run} failed"));
        }
        Ok(())
    }
}

fn runs(task: &CountingTask) -> usize {
    task.runs.load(Ordering::SeqCst)
}

#[tokio::test(start_paused = true)]
async fn runs_immediately_then_every_interval() {
    let scheduler = PeriodicScheduler::new();
    let task = Arc::new(CountingTask::default());

    assert!(scheduler.enqueue_unique_periodic(
        EXPIRED_ITEMS_TASK,
        EVERY,
        ExistingSchedulePolicy::Keep,
        task.clone(),
    ));
    tokio::time::sleep(EVERY / 2).await;
    assert_eq!(runs(&task), 1);

    tokio::time::sleep(EVERY * 2).await;
    assert_eq!(runs(&task), 3);
    assert!(scheduler.is_scheduled(EXPIRED_ITEMS_TASK));
}

#[tokio::test(start_paused = true)]
async fn keep_policy_leaves_existing_registration() {
    let scheduler = PeriodicScheduler::new();
    let first = Arc::new(CountingTask::default());
    let second = Arc::new(CountingTask::default());

    assert!(scheduler.enqueue_unique_periodic("job", EVERY, ExistingSchedulePolicy::Keep, first.clone()));
    assert!(!scheduler.enqueue_unique_periodic("job", EVERY, ExistingSchedulePolicy::Keep, second.clone()));
    tokio::time::sleep(EVERY + EVERY / 2).await;

    assert_eq!(runs(&first), 2);
    assert_eq!(runs(&second), 0);
}

#[tokio::test(start_paused = true)]
async fn replace_policy_swaps_registration() {
    let scheduler = PeriodicScheduler::new();
    let first = Arc::new(CountingTask::default());
    let second = Arc::new(CountingTask::default());

    scheduler.enqueue_unique_periodic("job", EVERY, ExistingSchedulePolicy::Keep, first.clone());
    tokio::time::sleep(EVERY / 2).await;
    assert!(scheduler.enqueue_unique_periodic("job", EVERY, ExistingSchedulePolicy::Replace, second.clone()));
    tokio::time::sleep(EVERY + EVERY / 4).await;

    assert_eq!(runs(&first), 1);
    assert_eq!(runs(&second), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_and_panicking_runs_do_not_stop_the_schedule() {
    let scheduler = PeriodicScheduler::new();
    let task = Arc::new(CountingTask {
        fail_on: Some(1),
        panic_on: Some(2),
        ..CountingTask::default()
    });

    scheduler.enqueue_unique_periodic("job", EVERY, ExistingSchedulePolicy::Keep, task.clone());
    tokio::time::sleep(EVERY * 2 + EVERY / 2).await;

    assert_eq!(runs(&task), 3);
    assert!(scheduler.is_scheduled("job"));
}

#[tokio::test(start_paused = true)]
async fn cancel_and_shutdown_stop_runs() {
    let scheduler = PeriodicScheduler::new();
    let cancelled = Arc::new(CountingTask::default());
    let stopped = Arc::new(CountingTask::default());

    scheduler.enqueue_unique_periodic("a", EVERY, ExistingSchedulePolicy::Keep, cancelled.clone());
    scheduler.enqueue_unique_periodic("b", EVERY, ExistingSchedulePolicy::Keep, stopped.clone());
    tokio::time::sleep(EVERY / 2).await;

    assert!(scheduler.cancel("a"));
    assert!(!scheduler.cancel("a"));
    scheduler.shutdown();
    tokio::time::sleep(EVERY * 3).await;

    assert_eq!(runs(&cancelled), 1);
    assert_eq!(runs(&stopped), 1);
    assert!(!scheduler.is_scheduled("b"));
}

#[tokio::test(start_paused = true)]
async fn huge_interval_is_clamped_and_schedule_survives() {
    let scheduler = PeriodicScheduler::new();
    let task = Arc::new(CountingTask::default());

    scheduler.enqueue_unique_periodic("job", Duration::MAX, ExistingSchedulePolicy::Keep, task.clone());
    tokio::time::sleep(EVERY).await;

    assert_eq!(runs(&task), 1);
    assert!(scheduler.is_scheduled("job"));
}

/// Records starts and completions; each run takes `EVERY * 10`.
#[derive(Default)]
struct SlowTask {
    started: AtomicUsize,
    finished: AtomicUsize,
}

#[async_trait]
impl PeriodicTask for SlowTask {
    async fn run(&self) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(EVERY * 10).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_aborts_a_run_in_progress() {
    let scheduler = PeriodicScheduler::new();
    let task = Arc::new(SlowTask::default());

    scheduler.enqueue_unique_periodic("job", EVERY, ExistingSchedulePolicy::Keep, task.clone());
    tokio::time::sleep(EVERY / 2).await;
    assert_eq!(task.started.load(Ordering::SeqCst), 1);

    assert!(scheduler.cancel("job"));
    tokio::time::sleep(EVERY * 20).await;

    assert_eq!(task.finished.load(Ordering::SeqCst), 0);
}
