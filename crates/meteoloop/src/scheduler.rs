//! Cron-driven trigger loop.
//!
//! Sleeps until the next cron occurrence (UTC), runs one pipeline tick, and
//! repeats until the shutdown channel fires. A failed tick is logged and the
//! loop carries on.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::str::FromStr;
use tokio::sync::watch;

use crate::config::ScheduleConfig;
use crate::coordinate::Coordinate;
use crate::envelope::PersistEnvelope;
use crate::pipeline::Pipeline;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression: {0}")]
    CronParse(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Compute the next cron occurrence after the given epoch seconds.
///
/// The `cron` crate expects 6-field expressions (sec min hr dom month dow).
/// Standard 5-field expressions are accepted and pinned to second zero.
pub fn next_run_after(cron_expr: &str, after_epoch_secs: u64) -> Result<u64> {
    let schedule = parse_schedule(cron_expr)?;
    let after = DateTime::from_timestamp(after_epoch_secs as i64, 0).ok_or_else(|| {
        SchedulerError::CronParse(format!("invalid epoch seconds: {}", after_epoch_secs))
    })?;
    let next = schedule
        .after(&after)
        .next()
        .ok_or_else(|| SchedulerError::CronParse("no next occurrence".to_string()))?;
    Ok(next.timestamp() as u64)
}

/// Normalise a cron expression to 6-field format by prepending `0 ` to
/// 5-field expressions.
pub fn normalize_cron_expr(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

fn parse_schedule(cron_expr: &str) -> Result<cron::Schedule> {
    cron::Schedule::from_str(&normalize_cron_expr(cron_expr))
        .map_err(|e| SchedulerError::CronParse(format!("{}: {}", cron_expr, e)))
}

pub struct Scheduler {
    expr: String,
    schedule: cron::Schedule,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(config: &ScheduleConfig) -> Result<Self> {
        Ok(Self {
            expr: config.cron.trim().to_string(),
            schedule: parse_schedule(&config.cron)?,
            run_on_start: config.run_on_start,
        })
    }

    /// Next occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Drive `tick` on schedule until `shutdown` fires or its sender is dropped.
    ///
    /// Returns the number of ticks run.
    pub async fn run<F, Fut>(&self, mut tick: F, mut shutdown: watch::Receiver<()>) -> u64
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PersistEnvelope>,
    {
        log::info!(
            "[Scheduler] starting (cron '{}', run_on_start={})",
            self.expr,
            self.run_on_start
        );
        let mut ticks = 0u64;

        if self.run_on_start {
            ticks += 1;
            log_tick(ticks, &tick().await);
        }

        loop {
            let now = Utc::now();
            let Some(next) = self.next_after(now) else {
                log::warn!("[Scheduler] cron '{}' has no further occurrences", self.expr);
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            log::debug!("[Scheduler] next run at {}", next);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    ticks += 1;
                    log_tick(ticks, &tick().await);
                }
                _ = shutdown.changed() => {
                    log::info!("[Scheduler] shutdown signal received, exiting");
                    break;
                }
            }
        }
        ticks
    }
}

fn log_tick(n: u64, envelope: &PersistEnvelope) {
    if envelope.is_success() {
        log::info!(
            "[Scheduler] tick {} stored record {}",
            n,
            envelope.record_id().unwrap_or_default()
        );
    } else {
        log::error!(
            "[Scheduler] tick {} failed (status {}): {}",
            n,
            envelope.status_code,
            envelope.error_message().unwrap_or_else(|| envelope.body.clone())
        );
    }
}

/// Run `pipeline` for `coordinate` on the configured schedule.
pub async fn run_scheduler(
    pipeline: &Pipeline,
    config: &ScheduleConfig,
    coordinate: Coordinate,
    shutdown: watch::Receiver<()>,
) -> Result<u64> {
    let scheduler = Scheduler::new(config)?;
    let ticks = scheduler
        .run(
            move || async move { pipeline.run_once(&coordinate).await },
            shutdown,
        )
        .await;
    Ok(ticks)
}
