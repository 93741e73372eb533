//! Persists the result of a run
//!
//! Every run ends here exactly once: the receipt is written, the journal
//! gets an entry pointing at it, and summary facts land in the job's
//! properties.

use crate::error::{IngestError, Result};
use crate::host::{JournalEntry, JournalSink, PropertyStore, ReceiptStore};
use crate::manifest::FileCategory;
use crate::receipt::{RunOutcome, RunStatus};
use std::sync::Arc;
use tracing::{info, warn};

pub const RECEIPT_JOURNAL_MESSAGE: &str = "Receipt for the ingest into MyCoRe created";

pub struct OutcomeReporter {
    receipts: Arc<dyn ReceiptStore>,
    journal: Arc<dyn JournalSink>,
    properties: Arc<dyn PropertyStore>,
}

impl OutcomeReporter {
    pub fn new(
        receipts: Arc<dyn ReceiptStore>,
        journal: Arc<dyn JournalSink>,
        properties: Arc<dyn PropertyStore>,
    ) -> Self {
        Self {
            receipts,
            journal,
            properties,
        }
    }

    /// Stamp `outcome`, write its receipt and return the receipt location
    pub async fn finalize(
        &self,
        job: &str,
        outcome: &mut RunOutcome,
        status: RunStatus,
        message: &str,
    ) -> Result<String> {
        outcome.finish(status, message);

        let filename = outcome
            .receipt_filename()
            .ok_or_else(|| IngestError::host("Finished outcome carries no end time"))?;
        let xml = outcome.to_xml()?;

        let location = self.receipts.write(job, &filename, &xml).await?;
        info!(job = %job, status = %status, receipt = %location, "Receipt written");

        // Best effort once the receipt exists
        if let Err(e) = self
            .journal
            .append(job, JournalEntry::file(RECEIPT_JOURNAL_MESSAGE, location.clone()))
            .await
        {
            warn!(job = %job, receipt = %location, error = %e, "Failed to journal the receipt");
        }

        for (name, value) in summary_facts(outcome) {
            if let Err(e) = self.properties.set(job, &name, &value).await {
                warn!(job = %job, property = %name, error = %e, "Failed to store summary fact");
            }
        }

        Ok(location)
    }

    /// Journal a fatal error
    pub async fn report_error(&self, job: &str, message: &str) -> Result<()> {
        self.journal.append(job, JournalEntry::error(message)).await
    }
}

/// Key/value facts derived from a finished outcome
pub fn summary_facts(outcome: &RunOutcome) -> Vec<(String, String)> {
    let manifest = &outcome.manifest;

    let mut facts = vec![
        ("ingest-status".to_string(), outcome.status.to_string()),
        ("ingest-files-total".to_string(), manifest.len().to_string()),
        ("ingest-files-valid".to_string(), manifest.valid_count().to_string()),
    ];

    for (category, bytes) in manifest.bytes_by_category() {
        facts.push((bytes_key(category), bytes.to_string()));
    }

    if let Some(volume) = &outcome.parent_location {
        facts.push(("ingest-volume".to_string(), volume.clone()));
    }
    if let Some(derivative) = &outcome.derivative_location {
        facts.push(("ingest-derivative".to_string(), derivative.clone()));
    }

    facts
}

fn bytes_key(category: FileCategory) -> String {
    format!("ingest-bytes-{}", category.as_str())
}
