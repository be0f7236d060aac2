//! Append-only usage ledger.
//!
//! Records flow through an unbounded channel into a writer task, so the
//! request path never blocks on the store. No record is dropped while the
//! process is running; records still in the channel at crash time are
//! lost, which is accepted.
//!
//! The read side (snapshots and per-provider summaries) is for external
//! analytics and admin dashboards — the gateway itself only appends.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use oxigate_core::types::{AttemptOutcome, UsageRecord};

enum LedgerMessage {
    Record(UsageRecord),
    /// Resolves once every previously sent record has been applied.
    Flush(oneshot::Sender<()>),
}

/// Aggregated usage for one provider over a query window.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
}

impl UsageSummary {
    fn add(&mut self, record: &UsageRecord) {
        self.attempts += 1;
        match record.outcome {
            AttemptOutcome::Success => self.successes += 1,
            _ => self.failures += 1,
        }
        self.tokens_in += u64::from(record.tokens_in);
        self.tokens_out += u64::from(record.tokens_out);
        self.cost += record.cost;
    }
}

/// Handle for appending and querying usage records.
pub struct UsageLedger {
    tx: mpsc::UnboundedSender<LedgerMessage>,
    store: Arc<RwLock<Vec<UsageRecord>>>,
}

impl UsageLedger {
    /// Create the ledger and spawn its writer task. The task ends when
    /// the ledger is dropped.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store: Arc<RwLock<Vec<UsageRecord>>> = Arc::new(RwLock::new(Vec::new()));

        let writer_store = store.clone();
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    LedgerMessage::Record(record) => {
                        let mut records = writer_store
                            .write()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        records.push(record);
                    }
                    LedgerMessage::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        (UsageLedger { tx, store }, handle)
    }

    /// Append one record. Non-blocking; never fails the request path.
    pub fn record(&self, record: UsageRecord) {
        if self.tx.send(LedgerMessage::Record(record)).is_err() {
            warn!("Usage ledger writer is gone, dropping record");
        }
    }

    /// Wait until everything recorded so far is visible to readers.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(LedgerMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Copy of every record, in append order.
    pub fn snapshot(&self) -> Vec<UsageRecord> {
        self.store
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Aggregate records per provider, optionally restricted to those at
    /// or after `since`. Sorted by provider name.
    pub fn summarize(&self, since: Option<DateTime<Utc>>) -> BTreeMap<String, UsageSummary> {
        let records = self
            .store
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut summaries: BTreeMap<String, UsageSummary> = BTreeMap::new();
        for record in records.iter() {
            if let Some(since) = since {
                if record.timestamp < since {
                    continue;
                }
            }
            summaries
                .entry(record.provider.clone())
                .or_default()
                .add(record);
        }
        summaries
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
