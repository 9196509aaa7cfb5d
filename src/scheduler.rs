use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::cron::{parse_cron, CronSchedule};
use crate::errors::{Result, RollError};
use crate::model::RotationRequest;
use crate::roller::IndexRoller;

/// Re-runs rotations on cron triggers, one trigger per index prefix.
///
/// Registering a prefix that already has a trigger replaces it.
#[derive(Clone)]
pub struct RollScheduler {
    roller: IndexRoller,
    triggers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl RollScheduler {
    pub fn new(roller: IndexRoller) -> Self {
        Self {
            roller,
            triggers: Arc::default(),
        }
    }

    pub fn schedule_rolling_cron(&self, request: RotationRequest, cron_expr: &str) -> Result<()> {
        let schedule = parse_schedule(cron_expr)?;
        request.validate()?;

        let prefix = request.index_prefix.clone();
        let handle = tokio::spawn(run_trigger(self.roller.clone(), request, schedule));

        if let Some(previous) = self.lock().insert(prefix.clone(), handle) {
            previous.abort();
            tracing::info!("replaced rolling schedule for {}", prefix);
        }
        tracing::info!("scheduled rolling of {} with cron '{}'", prefix, cron_expr);
        Ok(())
    }

    /// Stops the trigger for `prefix`. Returns false if none was registered.
    pub fn cancel(&self, prefix: &str) -> bool {
        match self.lock().remove(prefix) {
            Some(handle) => {
                handle.abort();
                tracing::info!("cancelled rolling schedule for {}", prefix);
                true
            }
            None => false,
        }
    }

    pub fn registered(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.lock().keys().cloned().collect();
        prefixes.sort();
        prefixes
    }

    /// Aborts every trigger and waits for the tasks to wind down.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = self.lock().drain().map(|(_, handle)| handle).collect();
        for handle in &handles {
            handle.abort();
        }
        futures::future::join_all(handles).await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.triggers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Parses a cron expression, reporting failures as [`RollError::InvalidSchedule`].
pub fn parse_schedule(cron_expr: &str) -> Result<CronSchedule> {
    parse_cron(cron_expr).map_err(|reason| RollError::InvalidSchedule {
        expr: cron_expr.to_string(),
        reason,
    })
}

async fn run_trigger(roller: IndexRoller, request: RotationRequest, schedule: CronSchedule) {
    let mut last = Utc::now();
    loop {
        let Some(next) = schedule.next_after(last) else {
            tracing::warn!("cron schedule for {} never fires again, stopping", request.index_prefix);
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        last = next;

        // Failures are logged and left to the next tick; there is no retry.
        match roller.rotate(&request).await {
            Ok(result) => tracing::info!(
                "scheduled roll of {} created {}",
                request.index_prefix,
                result.created_index
            ),
            Err(e) => tracing::error!(
                "scheduled roll of {} failed: {} (partial: {:?})",
                request.index_prefix,
                e,
                e.partial()
            ),
        }
    }
}
