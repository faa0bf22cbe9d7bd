//! Periodic task scheduling
//!
//! Plugins declare cron tasks; the host hands each one to a [`Scheduler`].
//! Every firing runs as its own task, and firings are not deduplicated, so
//! cron callbacks have to tolerate running more than once.

use chrono::Utc;
use cron::Schedule;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression {expr:?}: {reason}")]
    InvalidExpression { expr: String, reason: String },
}

/// Future produced by one firing of a cron job
pub type CronFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Callback run on every firing
pub type CronJob = Arc<dyn Fn() -> CronFuture + Send + Sync>;

/// A scheduled job. Dropping the handle cancels it.
pub struct CronHandle {
    id: String,
    task: JoinHandle<()>,
}

impl CronHandle {
    /// Wrap the task driving a job
    pub fn new(id: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            id: id.into(),
            task,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CronHandle {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!(task = %self.id, "Cron task cancelled");
    }
}

/// Runs jobs on a cron schedule
pub trait Scheduler: Send + Sync {
    fn schedule(&self, id: &str, expr: &str, job: CronJob) -> Result<CronHandle, SchedulerError>;
}

/// Parse a cron expression.
///
/// The `cron` crate wants seconds and accepts an optional year
/// (`sec min hour dom month dow [year]`); the usual 5-field form
/// (`min hour dom month dow`) gets `0` seconds and any year.
pub fn parse_schedule(expr: &str) -> Result<Schedule, SchedulerError> {
    expr.parse::<Schedule>()
        .or_else(|_| format!("0 {} *", expr.trim()).parse::<Schedule>())
        .map_err(|e| SchedulerError::InvalidExpression {
            expr: expr.to_string(),
            reason: e.to_string(),
        })
}

/// Scheduler driven by the tokio timer
#[derive(Debug, Default, Clone)]
pub struct CronScheduler;

impl CronScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for CronScheduler {
    fn schedule(&self, id: &str, expr: &str, job: CronJob) -> Result<CronHandle, SchedulerError> {
        let schedule = parse_schedule(expr)?;
        let task_id = id.to_string();

        let task = tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    tracing::debug!(task = %task_id, "Cron schedule has no future runs");
                    break;
                };
                let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(delay).await;

                tracing::trace!(task = %task_id, "Cron task firing");
                tokio::spawn(job());
            }
        });

        tracing::debug!(task = %id, schedule = %expr, "Cron task scheduled");
        Ok(CronHandle::new(id, task))
    }
}
