//! Periodic expired-item check.
//!
//! The check reads the user's items straight from the remote store and never
//! touches the synchronized collection.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use shared::{domain::Item, expiry::select_expired};
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

pub const EXPIRED_ITEMS_TASK: &str = "item_expired";
pub const DEFAULT_EXPIRY_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// Upper bound for a periodic interval; longer ones are clamped.
pub const MAX_PERIODIC_INTERVAL: Duration = Duration::from_secs(3650 * 24 * 60 * 60);
const MIN_PERIODIC_INTERVAL: Duration = Duration::from_millis(1);

#[async_trait]
pub trait RemoteItemSource: Send + Sync {
    async fn fetch_items(&self) -> Result<Vec<Item>>;
}

pub trait ExpiryNotifier: Send + Sync {
    fn notify_expired(&self, expired: &[Item]);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    pub checked: usize,
    pub expired: Vec<Item>,
    pub unparseable: usize,
}

pub struct ExpiryCheck {
    source: Arc<dyn RemoteItemSource>,
    notifier: Arc<dyn ExpiryNotifier>,
}

impl ExpiryCheck {
    pub fn new(source: Arc<dyn RemoteItemSource>, notifier: Arc<dyn ExpiryNotifier>) -> Self {
        Self { source, notifier }
    }

    pub async fn run_once(&self, today: NaiveDate) -> Result<ExpiryReport> {
        let items = self.source.fetch_items().await?;
        let selection = select_expired(&items, today);
        let report = ExpiryReport {
            checked: items.len(),
            expired: selection.expired,
            unparseable: selection.unparseable,
        };
        info!(
            %today,
            checked = report.checked,
            expired = report.expired.len(),
            unparseable = report.unparseable,
            "expired item check finished"
        );
        if !report.expired.is_empty() {
            self.notifier.notify_expired(&report.expired);
        }
        Ok(report)
    }
}

#[async_trait]
pub trait PeriodicTask: Send + Sync {
    async fn run(&self) -> Result<()>;
}

#[async_trait]
impl PeriodicTask for ExpiryCheck {
    async fn run(&self) -> Result<()> {
        self.run_once(Local::now().date_naive()).await.map(|_| ())
    }
}

/// What to do when a task with the same name is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingSchedulePolicy {
    Keep,
    Replace,
}

/// Uniquely named recurring tasks on the current tokio runtime.
#[derive(Default)]
pub struct PeriodicScheduler {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl PeriodicScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `task` under `name`. The first run starts immediately.
    /// Returns whether a new registration was made.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue_unique_periodic(
        &self,
        name: &str,
        every: Duration,
        policy: ExistingSchedulePolicy,
        task: Arc<dyn PeriodicTask>,
    ) -> bool {
        let mut tasks = self.lock();
        if let Some(existing) = tasks.get(name) {
            if policy == ExistingSchedulePolicy::Keep && !existing.is_finished() {
                debug!(task = name, "periodic task already scheduled; keeping it");
                return false;
            }
        }
        if let Some(previous) = tasks.remove(name) {
            previous.abort();
        }

        let every = clamp_interval(name, every);
        let handle = tokio::spawn(run_periodic(name.to_string(), every, task));
        tasks.insert(name.to_string(), handle);
        info!(task = name, interval_secs = every.as_secs(), ?policy, "periodic task scheduled");
        true
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.lock()
            .get(name)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn cancel(&self, name: &str) -> bool {
        match self.lock().remove(name) {
            Some(handle) => {
                handle.abort();
                info!(task = name, "periodic task cancelled");
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        for (name, handle) in self.lock().drain() {
            handle.abort();
            debug!(task = %name, "periodic task stopped");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn clamp_interval(name: &str, every: Duration) -> Duration {
    let clamped = every.clamp(MIN_PERIODIC_INTERVAL, MAX_PERIODIC_INTERVAL);
    if clamped != every {
        warn!(task = name, requested_secs = every.as_secs(), clamped_secs = clamped.as_secs(), "periodic interval out of range; clamped");
    }
    clamped
}

/// Aborts an in-flight run when the schedule loop is cancelled.
struct InFlightRun(JoinHandle<Result<()>>);

impl Drop for InFlightRun {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_periodic(name: String, every: Duration, task: Arc<dyn PeriodicTask>) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let task = Arc::clone(&task);
        let mut run = InFlightRun(tokio::spawn(async move { task.run().await }));
        match (&mut run.0).await {
            Ok(Ok(())) => debug!(task = %name, "periodic task run finished"),
            Ok(Err(err)) => warn!(task = %name, error = %err, "periodic task run failed; will retry next interval"),
            Err(err) if err.is_panic() => error!(task = %name, "periodic task run panicked; will retry next interval"),
            Err(_) => return,
        }
    }
}

#[cfg(test)]
#[path = "tests/expiry_tests.rs"]
mod tests;
