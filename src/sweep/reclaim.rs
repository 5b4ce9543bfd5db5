//! Tracked reclaim of delegated fee capacity.
//!
//! Every grant produced by a sweep becomes a persisted `ReclaimTask`. The
//! poll loop processes due tasks each cycle; failures are rescheduled with
//! exponential backoff and abandoned after the attempt budget. Completed and
//! abandoned tasks are logged and dropped from the store: delegated stake
//! can still be taken back by hand, and the lent energy regenerates on the
//! receiver either way.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::types::Network;
use crate::config::DelegationConfig;
use crate::observability::metrics;
use crate::resilience::backoff::backoff_secs;
use crate::store::{ReclaimStore, StoreResult};
use crate::sweep::delegation::{DelegationGrant, FeeDelegation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReclaimState {
    Pending,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclaimTask {
    pub id: Uuid,
    pub grant: DelegationGrant,
    pub not_before: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub state: ReclaimState,
    pub reclaim_tx_hash: Option<String>,
}

impl ReclaimTask {
    pub fn new(grant: DelegationGrant, not_before: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            grant,
            not_before,
            attempts: 0,
            last_error: None,
            state: ReclaimState::Pending,
            reclaim_tx_hash: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ReclaimState::Pending
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.not_before <= now
    }
}

/// Outcome counts of one processing pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    pub completed: usize,
    pub rescheduled: usize,
    pub abandoned: usize,
}

pub struct ReclaimQueue {
    store: Arc<dyn ReclaimStore>,
    delegators: HashMap<Network, Arc<dyn FeeDelegation>>,
    config: DelegationConfig,
}

impl ReclaimQueue {
    pub fn new(store: Arc<dyn ReclaimStore>, config: DelegationConfig) -> Self {
        Self {
            store,
            delegators: HashMap::new(),
            config,
        }
    }

    pub fn with_delegator(mut self, delegator: Arc<dyn FeeDelegation>) -> Self {
        self.delegators.insert(delegator.network(), delegator);
        self
    }

    /// Schedule a reclaim `reclaim_delay_secs` from now.
    pub async fn enqueue(&self, grant: DelegationGrant) -> StoreResult<ReclaimTask> {
        let delay = chrono::Duration::seconds(self.config.reclaim_delay_secs as i64);
        let task = ReclaimTask::new(grant, Utc::now() + delay);
        self.store.upsert_reclaim(task.clone()).await?;
        tracing::debug!(
            task_id = %task.id,
            receiver = %task.grant.receiver,
            not_before = %task.not_before,
            "Reclaim scheduled"
        );
        Ok(task)
    }

    pub async fn pending_count(&self) -> StoreResult<usize> {
        Ok(self.store.open_reclaims().await?.len())
    }

    /// Attempt every task that is due at `now`.
    pub async fn process_due(&self, now: DateTime<Utc>) -> StoreResult<ReclaimReport> {
        self.process(now, false).await
    }

    /// Attempt every open task regardless of schedule. Used on shutdown;
    /// anything that still fails stays pending in the store.
    pub async fn drain(&self) -> StoreResult<ReclaimReport> {
        self.process(Utc::now(), true).await
    }

    async fn process(&self, now: DateTime<Utc>, ignore_schedule: bool) -> StoreResult<ReclaimReport> {
        let mut report = ReclaimReport::default();

        for mut task in self.store.open_reclaims().await? {
            if !ignore_schedule && !task.is_due(now) {
                continue;
            }

            let Some(delegator) = self.delegators.get(&task.grant.network) else {
                tracing::warn!(
                    task_id = %task.id,
                    network = %task.grant.network,
                    "No delegator for reclaim task"
                );
                continue;
            };

            task.attempts += 1;
            match delegator.reclaim(&task.grant).await {
                Ok(tx_hash) => {
                    tracing::info!(
                        task_id = %task.id,
                        receiver = %task.grant.receiver,
                        tx_hash = %tx_hash,
                        "Delegated capacity reclaimed"
                    );
                    task.state = ReclaimState::Completed;
                    task.reclaim_tx_hash = Some(tx_hash);
                    task.last_error = None;
                    report.completed += 1;
                }
                Err(e) if task.attempts >= self.config.reclaim_max_attempts => {
                    tracing::warn!(
                        task_id = %task.id,
                        receiver = %task.grant.receiver,
                        attempts = task.attempts,
                        error = %e,
                        "Reclaim abandoned"
                    );
                    task.state = ReclaimState::Abandoned;
                    task.last_error = Some(e.to_string());
                    report.abandoned += 1;
                }
                Err(e) => {
                    task.not_before = now
                        + backoff_secs(
                            task.attempts,
                            self.config.reclaim_base_backoff_secs,
                            self.config.reclaim_max_backoff_secs,
                        );
                    tracing::warn!(
                        task_id = %task.id,
                        receiver = %task.grant.receiver,
                        attempts = task.attempts,
                        retry_at = %task.not_before,
                        error = %e,
                        "Reclaim failed, rescheduled"
                    );
                    task.last_error = Some(e.to_string());
                    report.rescheduled += 1;
                }
            }
            // Terminal outcomes are already in the log; only open tasks are kept
            if task.is_open() {
                self.store.upsert_reclaim(task).await?;
            } else {
                self.store.remove_reclaim(task.id).await?;
            }
        }

        metrics::set_reclaim_pending(self.pending_count().await?);
        Ok(report)
    }
}
