//! Ingest reconciliation engine
//!
//! Drives one job from the local export to a verified derivative:
//!
//! ```text
//! STARTED -> (UPLOADING <-> VERIFYING) -> CONVERGED | EXHAUSTED
//!        \------------------------------> FAILED (fatal error)
//! ```
//!
//! Rounds are strictly sequential. Each round uploads the records that are
//! not yet valid and still have attempts left, then lists every subfolder
//! in use and recomputes validity from what the store reports.

use crate::api::RemoteStore;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::host::{
    DocumentTransformer, ExportedMetadata, FileEnumerator, FileRole, JournalSink,
    MetadataExporter, PropertyStore, ReceiptStore,
};
use crate::manifest::{FileCategory, TransferRecord, Verification};
use crate::receipt::{RunOutcome, RunStatus};
use crate::reporter::OutcomeReporter;
use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Collaborators supplied by the host
#[derive(Clone)]
pub struct HostServices {
    pub exporter: Arc<dyn MetadataExporter>,
    pub transformer: Arc<dyn DocumentTransformer>,
    pub enumerator: Arc<dyn FileEnumerator>,
    pub properties: Arc<dyn PropertyStore>,
    pub journal: Arc<dyn JournalSink>,
    pub receipts: Arc<dyn ReceiptStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Started,
    Uploading,
    Verifying,
    Converged,
    Exhausted,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Started => "started",
            RunState::Uploading => "uploading",
            RunState::Verifying => "verifying",
            RunState::Converged => "converged",
            RunState::Exhausted => "exhausted",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller learns about a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    Finished,
    Error,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub result: RunResult,
    pub state: RunState,
    pub rounds: u32,
    pub outcome: RunOutcome,
    /// Where the receipt went; `None` if it could not be written
    pub receipt_location: Option<String>,
}

/// State of one run. Nothing in here outlives it.
#[derive(Debug)]
pub struct IngestRun {
    pub job: String,
    pub state: RunState,
    pub rounds: u32,
    pub outcome: RunOutcome,
}

impl IngestRun {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            state: RunState::Started,
            rounds: 0,
            outcome: RunOutcome::start(),
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!(job = %self.job, from = %self.state, to = %next, round = self.rounds, "State transition");
        self.state = next;
    }
}

pub struct IngestEngine {
    config: IngestConfig,
    job: String,
    store: Arc<dyn RemoteStore>,
    host: HostServices,
    reporter: OutcomeReporter,
}

impl IngestEngine {
    pub fn new(
        config: IngestConfig,
        job: impl Into<String>,
        store: Arc<dyn RemoteStore>,
        host: HostServices,
    ) -> Self {
        let reporter = OutcomeReporter::new(
            host.receipts.clone(),
            host.journal.clone(),
            host.properties.clone(),
        );

        Self {
            config,
            job: job.into(),
            store,
            host,
            reporter,
        }
    }

    /// Run the job to completion. Never fails: every outcome, including
    /// fatal errors, ends in a written receipt and a [`RunResult`].
    pub async fn run(&self) -> IngestReport {
        let start_time = Instant::now();
        let mut run = IngestRun::new(&self.job);

        info!(job = %self.job, max_tries = self.config.max_tries, "Starting ingest");

        let (status, message) = match self.execute_run(&mut run).await {
            Ok(()) if run.state == RunState::Converged => {
                (RunStatus::Finished, "Ingest finished successfully".to_string())
            }
            Ok(()) => {
                let manifest = &run.outcome.manifest;
                let message = format!(
                    "{} of {} files could not be verified after {} rounds",
                    manifest.len() - manifest.valid_count(),
                    manifest.len(),
                    run.rounds
                );
                warn!(job = %self.job, "{}", message);
                self.journal_error(&message).await;
                (RunStatus::Error, message)
            }
            Err(e) => {
                run.transition(RunState::Failed);
                error!(
                    job = %self.job,
                    error = %e,
                    rejected_by_store = e.is_rejection(),
                    "Ingest failed"
                );
                let message = e.to_string();
                self.journal_error(&message).await;
                (RunStatus::Error, message)
            }
        };

        let receipt_location = match self
            .reporter
            .finalize(&self.job, &mut run.outcome, status, &message)
            .await
        {
            Ok(location) => Some(location),
            Err(e) => {
                error!(job = %self.job, error = %e, "Failed to write the receipt");
                None
            }
        };

        let result = match status {
            RunStatus::Finished => RunResult::Finished,
            _ => RunResult::Error,
        };

        info!(
            job = %self.job,
            state = %run.state,
            rounds = run.rounds,
            files = run.outcome.manifest.len(),
            valid = run.outcome.manifest.valid_count(),
            duration_secs = start_time.elapsed().as_secs_f64(),
            "Ingest complete"
        );

        IngestReport {
            result,
            state: run.state,
            rounds: run.rounds,
            outcome: run.outcome,
            receipt_location,
        }
    }

    async fn journal_error(&self, message: &str) {
        if let Err(e) = self.reporter.report_error(&self.job, message).await {
            warn!(job = %self.job, error = %e, "Failed to journal error");
        }
    }

    /// Everything up to a terminal state. `Err` means FAILED.
    pub async fn execute_run(&self, run: &mut IngestRun) -> Result<()> {
        // Step 1: Export and transform the metadata
        let exported = self.host.exporter.export(&self.job).await?;
        let parent_id = self.parent_id().await?;
        let document = self
            .host
            .transformer
            .transform(&exported.document, &parent_id)
            .await?;

        // Step 2: Create the volume and its derivative, once each
        let parent = self.store.create_parent(&document).await?;
        info!(job = %self.job, location = %parent, "Volume created");
        run.outcome.parent_location = Some(parent.clone());

        let derivative = self
            .store
            .create_derivative_container(&parent, &document)
            .await?;
        info!(job = %self.job, location = %derivative, "Derivative created");
        run.outcome.derivative_location = Some(derivative.clone());

        // Step 3: Build the manifest
        self.build_manifest(run, &exported).await?;
        info!(
            job = %self.job,
            files = run.outcome.manifest.len(),
            subfolders = ?run.outcome.manifest.subfolders_in_use(),
            "Manifest built"
        );

        // Step 4: Upload and verify until everything matches or tries run out
        while run.rounds < self.config.max_tries && !run.outcome.manifest.all_valid() {
            run.rounds += 1;

            run.transition(RunState::Uploading);
            self.upload_round(run, &derivative).await?;

            run.transition(RunState::Verifying);
            self.verify_round(run, &derivative).await;
        }

        if run.outcome.manifest.all_valid() {
            run.transition(RunState::Converged);
        } else {
            run.transition(RunState::Exhausted);
        }

        Ok(())
    }

    async fn parent_id(&self) -> Result<String> {
        let property = &self.config.identifier_property;
        self.host
            .properties
            .get(&self.job, property)
            .await?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                IngestError::transform(format!(
                    "Job '{}' has no '{}' property",
                    self.job, property
                ))
            })
    }

    async fn build_manifest(&self, run: &mut IngestRun, exported: &ExportedMetadata) -> Result<()> {
        let mut sources: Vec<(String, FileCategory, PathBuf)> = vec![(
            self.config.metadata_filename.clone(),
            FileCategory::Metadata,
            exported.document.clone(),
        )];

        if let Some(companion) = &exported.companion {
            sources.push((
                self.config.companion_filename(),
                FileCategory::MetadataCompanion,
                companion.clone(),
            ));
        }

        for (role, category) in [
            (FileRole::Media, FileCategory::Media),
            (FileRole::TextAnnotation, FileCategory::TextAnnotation),
        ] {
            for path in self.host.enumerator.list(role).await? {
                sources.push((file_name(&path)?, category, path));
            }
        }

        let layout = self.config.layout();
        for (name, category, path) in sources {
            if run.outcome.manifest.contains_path(&path) {
                debug!(path = %path.display(), "Already tracked, skipping");
                continue;
            }

            let subfolder = layout.subfolder_for(category).to_string();
            let record = tokio::task::spawn_blocking(move || {
                TransferRecord::from_local(name, category, &subfolder, &path)
            })
            .await
            .map_err(|e| IngestError::host(format!("Checksum task failed: {}", e)))??;

            debug!(
                file = %record.name(),
                category = %record.category(),
                size = record.local_size(),
                md5 = %record.local_checksum(),
                "Tracking file"
            );
            run.outcome.manifest.add(record)?;
        }

        Ok(())
    }

    /// Upload every eligible record once. Retryable transmission failures are
    /// logged and left for verification to notice. An unreadable source or a
    /// fatal store error ends the run.
    async fn upload_round(&self, run: &mut IngestRun, container: &str) -> Result<()> {
        let max_tries = self.config.max_tries;
        let pending = run.outcome.manifest.pending_uploads(max_tries);

        info!(job = %self.job, round = run.rounds, files = pending.len(), "Uploading");

        for index in pending {
            let Some(record) = run.outcome.manifest.record_mut(index) else {
                continue;
            };
            if !record.record_upload_attempt(max_tries) {
                continue;
            }

            let name = record.name().to_string();
            let subfolder = record.subfolder().to_string();
            let content_type = record.category().content_type();
            let path = record.local_path().to_path_buf();
            let attempt = record.upload_attempts();

            let bytes = Bytes::from(
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| IngestError::local_io(&path, e))?,
            );

            match self
                .transmit(container, &subfolder, &name, content_type, bytes)
                .await
            {
                Ok(()) => debug!(file = %name, attempt, "Transmitted"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(file = %name, attempt, error = %e, "Could not transmit file"),
            }
        }

        Ok(())
    }

    /// One file: a first transmission plus up to `upload-retries` retries
    /// with doubling backoff
    async fn transmit(
        &self,
        container: &str,
        subfolder: &str,
        name: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<()> {
        let max_transmissions = self.config.upload_retries.saturating_add(1);
        let mut transmissions = 0;

        loop {
            transmissions += 1;

            match self
                .store
                .put_file(container, subfolder, name, content_type, bytes.clone())
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && transmissions < max_transmissions => {
                    warn!(
                        "Transmission {}/{} failed for {}: {}",
                        transmissions, max_transmissions, name, e
                    );
                    tokio::time::sleep(self.config.retry_delay(transmissions)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Refresh every subfolder from a listing. A failed listing leaves its
    /// records as they were.
    async fn verify_round(&self, run: &mut IngestRun, container: &str) {
        for subfolder in run.outcome.manifest.subfolders_in_use() {
            let listing = match self.store.list_contents(container, &subfolder).await {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(
                        job = %self.job,
                        round = run.rounds,
                        subfolder = %subfolder,
                        error = %e,
                        "Listing failed, records left unchanged"
                    );
                    continue;
                }
            };

            let summary = run
                .outcome
                .manifest
                .apply_listing(container, &subfolder, &listing);

            info!(
                job = %self.job,
                round = run.rounds,
                subfolder = %subfolder,
                matched = summary.matched,
                mismatched = summary.mismatched,
                missing = summary.missing,
                "Verified"
            );

            for record in run
                .outcome
                .manifest
                .records()
                .iter()
                .filter(|r| r.subfolder() == subfolder && !r.is_valid())
            {
                match record.verification() {
                    Verification::Missing => {
                        warn!(file = %record.name(), "Not present in the remote listing")
                    }
                    _ => warn!(
                        file = %record.name(),
                        local = %record.local_checksum(),
                        remote = record.remote_checksum().unwrap_or("-"),
                        "Checksum mismatch"
                    ),
                }
            }
        }
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            IngestError::local_io(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "file name is missing or not UTF-8",
                ),
            )
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::api::mock::DERIVATIVE_LOCATION;
    use crate::api::{DirectoryListing, MockStore};
    use crate::host::{JournalKind, MemoryJournal, MemoryPropertyStore, MemoryReceiptStore};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const JOB: &str = "job";

    struct StaticExporter(ExportedMetadata);

    #[async_trait]
    impl MetadataExporter for StaticExporter {
        async fn export(&self, _job: &str) -> Result<ExportedMetadata> {
            Ok(self.0.clone())
        }
    }

    struct FailingExporter;

    #[async_trait]
    impl MetadataExporter for FailingExporter {
        async fn export(&self, job: &str) -> Result<ExportedMetadata> {
            Err(IngestError::export(format!("no export for {}", job)))
        }
    }

    #[derive(Default)]
    struct RecordingTransformer {
        parent_ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DocumentTransformer for RecordingTransformer {
        async fn transform(&self, _document: &Path, parent_id: &str) -> Result<String> {
            self.parent_ids.lock().unwrap().push(parent_id.to_string());
            Ok(format!("<mycoreobject parentID=\"{}\"/>", parent_id))
        }
    }

    struct FixedFiles {
        media: Vec<PathBuf>,
        annotations: Vec<PathBuf>,
    }

    #[async_trait]
    impl FileEnumerator for FixedFiles {
        async fn list(&self, role: FileRole) -> Result<Vec<PathBuf>> {
            Ok(match role {
                FileRole::Media => self.media.clone(),
                FileRole::TextAnnotation => self.annotations.clone(),
            })
        }
    }

    /// Deletes a local file when the store is first asked for a listing
    struct VanishingStore {
        inner: MockStore,
        victim: PathBuf,
    }

    #[async_trait]
    impl RemoteStore for VanishingStore {
        async fn create_parent(&self, document: &str) -> Result<String> {
            self.inner.create_parent(document).await
        }

        async fn create_derivative_container(&self, parent: &str, document: &str) -> Result<String> {
            self.inner.create_derivative_container(parent, document).await
        }

        async fn put_file(
            &self,
            container: &str,
            subfolder: &str,
            filename: &str,
            content_type: &str,
            bytes: Bytes,
        ) -> Result<()> {
            self.inner
                .put_file(container, subfolder, filename, content_type, bytes)
                .await
        }

        async fn list_contents(&self, container: &str, subfolder: &str) -> Result<DirectoryListing> {
            let _ = std::fs::remove_file(&self.victim);
            self.inner.list_contents(container, subfolder).await
        }
    }

    /// Answers every upload with an error no retry can fix
    struct MisconfiguredStore {
        inner: MockStore,
    }

    #[async_trait]
    impl RemoteStore for MisconfiguredStore {
        async fn create_parent(&self, document: &str) -> Result<String> {
            self.inner.create_parent(document).await
        }

        async fn create_derivative_container(&self, parent: &str, document: &str) -> Result<String> {
            self.inner.create_derivative_container(parent, document).await
        }

        async fn put_file(
            &self,
            _container: &str,
            _subfolder: &str,
            filename: &str,
            _content_type: &str,
            _bytes: Bytes,
        ) -> Result<()> {
            Err(IngestError::config(format!("no upload target for {}", filename)))
        }

        async fn list_contents(&self, container: &str, subfolder: &str) -> Result<DirectoryListing> {
            self.inner.list_contents(container, subfolder).await
        }
    }

    struct Fixture {
        dir: TempDir,
        metadata: PathBuf,
        companion: Option<PathBuf>,
        media: Vec<PathBuf>,
        annotations: Vec<PathBuf>,
        config: IngestConfig,
        properties: Arc<MemoryPropertyStore>,
        journal: Arc<MemoryJournal>,
        receipts: Arc<MemoryReceiptStore>,
        transformer: Arc<RecordingTransformer>,
        exporter: Option<Arc<dyn MetadataExporter>>,
    }

    impl Fixture {
        /// `job_mets.xml` plus `0001.tif`
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let metadata = dir.path().join("job_mets.xml");
            std::fs::write(&metadata, "<mets:mets/>").unwrap();

            let mut fixture = Self {
                dir,
                metadata,
                companion: None,
                media: Vec::new(),
                annotations: Vec::new(),
                config: IngestConfig {
                    mycore_api: "http://mock.invalid/api/v2/".to_string(),
                    retry_delay_ms: 0,
                    ..IngestConfig::default()
                },
                properties: Arc::new(MemoryPropertyStore::with_properties(
                    JOB,
                    [("mycore-id", "jportal_jpvolume_00003142")],
                )),
                journal: Arc::new(MemoryJournal::new()),
                receipts: Arc::new(MemoryReceiptStore::new()),
                transformer: Arc::new(RecordingTransformer::default()),
                exporter: None,
            };
            fixture.add_media("0001.tif", b"tiff bytes");
            fixture
        }

        fn write(&self, relative: &str, content: &[u8]) -> PathBuf {
            let path = self.dir.path().join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, content).unwrap();
            path
        }

        fn add_media(&mut self, name: &str, content: &[u8]) -> PathBuf {
            let path = self.write(&format!("images/{}", name), content);
            self.media.push(path.clone());
            path
        }

        fn add_annotation(&mut self, name: &str, content: &[u8]) {
            let path = self.write(&format!("alto/{}", name), content);
            self.annotations.push(path);
        }

        fn add_companion(&mut self) {
            self.companion = Some(self.write("job_mets_anchor.xml", b"<mets:mets anchor/>"));
        }

        fn engine(&self, store: Arc<dyn RemoteStore>) -> IngestEngine {
            let exporter: Arc<dyn MetadataExporter> = match &self.exporter {
                Some(exporter) => exporter.clone(),
                None => Arc::new(StaticExporter(ExportedMetadata {
                    document: self.metadata.clone(),
                    companion: self.companion.clone(),
                })),
            };

            let host = HostServices {
                exporter,
                transformer: self.transformer.clone(),
                enumerator: Arc::new(FixedFiles {
                    media: self.media.clone(),
                    annotations: self.annotations.clone(),
                }),
                properties: self.properties.clone(),
                journal: self.journal.clone(),
                receipts: self.receipts.clone(),
            };

            IngestEngine::new(self.config.clone(), JOB, store, host)
        }

        fn journal_kinds(&self) -> Vec<JournalKind> {
            self.journal.entries().into_iter().map(|(_, e)| e.kind).collect()
        }
    }

    fn attempts(report: &IngestReport, name: &str) -> u32 {
        report.outcome.manifest.get(name).unwrap().upload_attempts()
    }

    fn valid(report: &IngestReport, name: &str) -> bool {
        report.outcome.manifest.get(name).unwrap().is_valid()
    }

    #[tokio::test]
    async fn test_faithful_store_finishes_in_one_round() {
        let fixture = Fixture::new();
        let store = Arc::new(MockStore::new());

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Finished);
        assert_eq!(report.state, RunState::Converged);
        assert_eq!(report.rounds, 1);
        assert_eq!(report.outcome.manifest.len(), 2);
        for name in ["goobi_mets.xml", "0001.tif"] {
            assert!(valid(&report, name));
            assert_eq!(attempts(&report, name), 1);
        }
        assert_eq!(report.outcome.status, RunStatus::Finished);
        assert_eq!(
            report.outcome.derivative_location.as_deref(),
            Some(DERIVATIVE_LOCATION)
        );

        assert_eq!(store.stored("", "0001.tif").unwrap(), b"tiff bytes");
        assert_eq!(store.stored("", "goobi_mets.xml").unwrap(), b"<mets:mets/>");

        // Parent id comes from the job property, whatever its case
        assert_eq!(
            *fixture.transformer.parent_ids.lock().unwrap(),
            vec!["jportal_jpvolume_00003142".to_string()]
        );

        let receipts = fixture.receipts.receipts();
        assert_eq!(receipts.len(), 1);
        assert!(receipts.values().next().unwrap().contains("<status>FINISHED</status>"));
        assert_eq!(fixture.journal_kinds(), vec![JournalKind::File]);
        assert!(report.receipt_location.is_some());
        assert_eq!(
            fixture.properties.properties(JOB)["ingest-files-valid"],
            "2"
        );
    }

    #[tokio::test]
    async fn test_always_mismatched_file_exhausts() {
        let fixture = Fixture::new();
        let store = Arc::new(MockStore::new());
        store.corrupt("0001.tif");

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Error);
        assert_eq!(report.state, RunState::Exhausted);
        assert_eq!(report.rounds, 3);

        assert_eq!(attempts(&report, "0001.tif"), 3);
        assert!(!valid(&report, "0001.tif"));
        assert_eq!(
            report.outcome.manifest.get("0001.tif").unwrap().verification(),
            Verification::Mismatch
        );
        assert_eq!(attempts(&report, "goobi_mets.xml"), 1);
        assert!(valid(&report, "goobi_mets.xml"));

        assert_eq!(store.uploads_of("0001.tif"), 3);
        assert_eq!(store.uploads_of("goobi_mets.xml"), 1);

        let xml = fixture.receipts.receipts().into_values().next().unwrap();
        assert!(xml.contains("<status>ERROR</status>"));
        assert!(xml.contains(r#"verification="mismatch""#));
        assert_eq!(
            fixture.journal_kinds(),
            vec![JournalKind::Error, JournalKind::File]
        );
    }

    #[tokio::test]
    async fn test_never_matching_store_runs_exactly_max_tries_rounds() {
        let mut fixture = Fixture::new();
        fixture.config.max_tries = 2;
        let store = Arc::new(MockStore::new());
        store.corrupt("0001.tif").corrupt("goobi_mets.xml");

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Error);
        assert_eq!(report.rounds, 2);
        assert_eq!(store.list_calls(), 2);
        for record in report.outcome.manifest.records() {
            assert_eq!(record.upload_attempts(), 2);
            assert!(!record.is_valid());
        }
    }

    #[tokio::test]
    async fn test_missing_location_aborts_before_any_file() {
        let fixture = Fixture::new();
        let store = Arc::new(MockStore::new());
        store.omit_location();

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Error);
        assert_eq!(report.state, RunState::Failed);
        assert!(report.outcome.manifest.is_empty());
        assert_eq!(store.total_uploads(), 0);
        assert_eq!(store.list_calls(), 0);
        assert!(report.outcome.parent_location.is_some());
        assert!(report.outcome.derivative_location.is_none());
        assert!(report.outcome.message.as_deref().unwrap().contains("no location"));

        let xml = fixture.receipts.receipts().into_values().next().unwrap();
        assert!(xml.contains("<status>ERROR</status>"));
        assert!(!xml.contains("<files"));
        assert_eq!(
            fixture.journal_kinds(),
            vec![JournalKind::Error, JournalKind::File]
        );
    }

    #[tokio::test]
    async fn test_rejected_parent_creates_nothing_else() {
        let fixture = Fixture::new();
        let store = Arc::new(MockStore::new());
        store.reject_parent();

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Error);
        assert_eq!(store.creates(), 1);
        assert!(report.outcome.parent_location.is_none());
        assert!(report.outcome.manifest.is_empty());
        assert_eq!(store.total_uploads(), 0);
    }

    #[tokio::test]
    async fn test_rejected_container_aborts_before_any_file() {
        let fixture = Fixture::new();
        let store = Arc::new(MockStore::new());
        store.reject_container();

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Error);
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(store.creates(), 2);
        assert!(report.outcome.parent_location.is_some());
        assert!(report.outcome.derivative_location.is_none());
        assert!(report.outcome.manifest.is_empty());
        assert_eq!(store.total_uploads(), 0);
        assert_eq!(store.list_calls(), 0);
        assert!(report.outcome.message.as_deref().unwrap().contains("403"));

        let xml = fixture.receipts.receipts().into_values().next().unwrap();
        assert!(xml.contains("<status>ERROR</status>"));
        assert!(xml.contains("<volume>"));
        assert!(!xml.contains("<derivative>"));
        assert_eq!(
            fixture.journal_kinds(),
            vec![JournalKind::Error, JournalKind::File]
        );
    }

    #[tokio::test]
    async fn test_unretryable_upload_error_is_fatal() {
        let fixture = Fixture::new();
        let store = Arc::new(MisconfiguredStore {
            inner: MockStore::new(),
        });

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Error);
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.rounds, 1);
        assert_eq!(store.inner.list_calls(), 0);
        // The first record in manifest order is the one that failed
        assert_eq!(attempts(&report, "goobi_mets.xml"), 1);
        assert_eq!(attempts(&report, "0001.tif"), 0);
        assert!(report
            .outcome
            .message
            .as_deref()
            .unwrap()
            .contains("goobi_mets.xml"));
    }

    #[tokio::test]
    async fn test_missing_identifier_is_transform_failure() {
        let mut fixture = Fixture::new();
        fixture.properties = Arc::new(MemoryPropertyStore::new());
        let store = Arc::new(MockStore::new());

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Error);
        assert_eq!(store.creates(), 0);
        assert!(report
            .outcome
            .message
            .as_deref()
            .unwrap()
            .starts_with("Metadata transform failed"));
    }

    #[tokio::test]
    async fn test_export_failure_is_fatal() {
        let mut fixture = Fixture::new();
        fixture.exporter = Some(Arc::new(FailingExporter));
        let store = Arc::new(MockStore::new());

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Error);
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(store.creates(), 0);
        assert_eq!(fixture.receipts.receipts().len(), 1);
    }

    #[tokio::test]
    async fn test_inner_retries_recover_within_round() {
        let fixture = Fixture::new();
        let store = Arc::new(MockStore::new());
        store.fail_puts("0001.tif", 2);

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Finished);
        assert_eq!(report.rounds, 1);
        assert_eq!(store.uploads_of("0001.tif"), 3);
        assert_eq!(attempts(&report, "0001.tif"), 1);
    }

    #[tokio::test]
    async fn test_three_retries_follow_first_transmission() {
        let mut fixture = Fixture::new();
        fixture.config.max_tries = 1;
        let store = Arc::new(MockStore::new());
        store.fail_puts("0001.tif", 3);

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Finished);
        assert_eq!(report.rounds, 1);
        assert_eq!(store.uploads_of("0001.tif"), 4);
        assert_eq!(attempts(&report, "0001.tif"), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_transmit_once_per_round() {
        let mut fixture = Fixture::new();
        fixture.config.upload_retries = 0;
        let store = Arc::new(MockStore::new());
        store.fail_puts("0001.tif", 1);

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Finished);
        assert_eq!(report.rounds, 2);
        assert_eq!(store.uploads_of("0001.tif"), 2);
        assert_eq!(attempts(&report, "0001.tif"), 2);
    }

    #[tokio::test]
    async fn test_exhausted_inner_retries_do_not_abort_round() {
        let mut fixture = Fixture::new();
        fixture.add_media("0002.tif", b"second");
        let store = Arc::new(MockStore::new());
        store.fail_puts("0001.tif", 4);

        let report = fixture.engine(store.clone()).run().await;

        // Round 1 gives up on 0001.tif but still uploads 0002.tif
        assert_eq!(report.result, RunResult::Finished);
        assert_eq!(report.rounds, 2);
        assert_eq!(store.uploads_of("0001.tif"), 5);
        assert_eq!(attempts(&report, "0001.tif"), 2);
        assert_eq!(attempts(&report, "0002.tif"), 1);
        assert_eq!(
            report.outcome.manifest.get("0001.tif").unwrap().verification(),
            Verification::Match
        );
    }

    #[tokio::test]
    async fn test_failed_listing_leaves_records_untouched() {
        let fixture = Fixture::new();
        let store = Arc::new(MockStore::new());
        store.fail_listings(1);

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Finished);
        assert_eq!(report.rounds, 2);
        assert_eq!(attempts(&report, "0001.tif"), 2);
        assert_eq!(store.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_hidden_file_reported_missing() {
        let mut fixture = Fixture::new();
        fixture.config.max_tries = 1;
        let store = Arc::new(MockStore::new());
        store.hide("0001.tif");

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Error);
        let record = report.outcome.manifest.get("0001.tif").unwrap();
        assert_eq!(record.verification(), Verification::Missing);
        assert!(record.remote_checksum().is_none());

        let xml = fixture.receipts.receipts().into_values().next().unwrap();
        assert!(xml.contains(r#"verification="missing""#));
    }

    #[tokio::test]
    async fn test_companion_and_annotations_use_their_subfolders() {
        let mut fixture = Fixture::new();
        fixture.add_companion();
        fixture.add_annotation("0001.xml", b"<alto/>");
        let store = Arc::new(MockStore::new());

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Finished);
        assert_eq!(report.outcome.manifest.len(), 4);
        assert_eq!(store.list_calls(), 2);
        assert!(store.stored("", "goobi_mets_anchor.xml").is_some());
        assert_eq!(store.stored("ocr/alto/", "0001.xml").unwrap(), b"<alto/>");
        assert!(store.stored("", "0001.xml").is_none());

        let annotation = report.outcome.manifest.get("0001.xml").unwrap();
        assert_eq!(annotation.category(), FileCategory::TextAnnotation);
        assert_eq!(
            annotation.remote_url(),
            Some(format!("{}/contents/ocr/alto/0001.xml", DERIVATIVE_LOCATION).as_str())
        );
    }

    #[tokio::test]
    async fn test_duplicate_paths_tracked_once() {
        let mut fixture = Fixture::new();
        let path = fixture.media[0].clone();
        fixture.media.push(path);
        let store = Arc::new(MockStore::new());

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.outcome.manifest.len(), 2);
        assert_eq!(store.uploads_of("0001.tif"), 1);
    }

    #[tokio::test]
    async fn test_unreadable_source_at_manifest_build_is_fatal() {
        let mut fixture = Fixture::new();
        fixture.media.push(fixture.dir.path().join("images/ghost.tif"));
        let store = Arc::new(MockStore::new());

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Error);
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(store.total_uploads(), 0);
        assert!(report.outcome.message.as_deref().unwrap().contains("ghost.tif"));
    }

    #[tokio::test]
    async fn test_vanished_source_during_retry_is_fatal() {
        let fixture = Fixture::new();
        let inner = MockStore::new();
        inner.corrupt("0001.tif");
        let store = Arc::new(VanishingStore {
            inner,
            victim: fixture.media[0].clone(),
        });

        let report = fixture.engine(store.clone()).run().await;

        assert_eq!(report.result, RunResult::Error);
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.rounds, 2);
        // The manifest survives into the receipt
        assert_eq!(report.outcome.manifest.len(), 2);
        assert_eq!(store.inner.uploads_of("0001.tif"), 1);
        assert!(report.outcome.message.as_deref().unwrap().contains("0001.tif"));
    }

    #[tokio::test]
    async fn test_attempts_never_exceed_max_tries() {
        for max_tries in 1..=4 {
            let mut fixture = Fixture::new();
            fixture.config.max_tries = max_tries;
            let store = Arc::new(MockStore::new());
            store.corrupt("0001.tif");

            let report = fixture.engine(store.clone()).run().await;

            assert_eq!(report.rounds, max_tries);
            assert_eq!(attempts(&report, "0001.tif"), max_tries);
            assert!(report
                .outcome
                .manifest
                .records()
                .iter()
                .all(|r| r.upload_attempts() <= max_tries));
        }
    }
}
