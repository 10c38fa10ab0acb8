//! Background NAV refresh.
//!
//! Sleeps for the configured interval, then reprices every ledger position at
//! the provider's latest NAV, one entry at a time.

use crate::models::RefreshStatus;
use crate::services::PurchaseLedger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Counts from one pass over the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub missing: usize,
    pub failed: usize,
}

impl RefreshReport {
    pub fn total(&self) -> usize {
        self.refreshed + self.missing + self.failed
    }
}

pub struct RefreshScheduler {
    ledger: Arc<PurchaseLedger>,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(ledger: Arc<PurchaseLedger>, interval: Duration) -> Self {
        Self { ledger, interval }
    }

    /// Run until `shutdown` flips to true or its sender is dropped
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) {
        info!("NAV refresh scheduler started, interval {:?}", self.interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop_requested(&mut shutdown) => break,
            }

            tokio::select! {
                report = self.run_cycle() => {
                    info!(
                        "NAV refresh cycle finished: {} refreshed, {} missing, {} failed",
                        report.refreshed, report.missing, report.failed
                    );
                }
                _ = stop_requested(&mut shutdown) => {
                    info!("NAV refresh cycle interrupted by shutdown");
                    break;
                }
            }
        }

        info!("NAV refresh scheduler stopped");
    }

    /// One pass over every position. Per-entry failures are logged and counted.
    pub async fn run_cycle(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        let entries = match self.ledger.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to enumerate ledger entries for refresh: {}", e);
                return report;
            }
        };

        for entry in &entries {
            match self.ledger.refresh_valuation(entry).await {
                Ok(RefreshStatus::Success) => report.refreshed += 1,
                Ok(RefreshStatus::NoPosition) => report.missing += 1,
                Err(e) => {
                    warn!(
                        retryable = e.is_retryable(),
                        "NAV refresh failed for owner={}, scheme={}: {}",
                        entry.owner_id, entry.scheme_code, e
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

/// Resolves once the flag is set to true or the sender is gone.
/// Other value changes are ignored.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if shutdown.changed().await.is_err() || *shutdown.borrow_and_update() {
            return;
        }
    }
}
