//! Resumable, ordered, bounded-concurrency migration run.
//!
//! One producer task scans ids and submits each to a worker task, holding a
//! semaphore permit per document. Workers send their outcome back tagged with
//! the submission sequence number; the run loop restores scan order through a
//! [`ReorderBuffer`] and is the only place that touches [`RunState`]. A permit
//! is released only after its outcome has been folded, so running plus
//! buffered documents never exceed `max_in_flight`.

use std::borrow::Cow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use super::errors::{MigrationError, MigrationResult};
use super::models::{DocumentOutcome, MigrationConfig, RunState, Stage, StageError};
use super::ordering::{is_regression, ReorderBuffer};
use crate::ops::quarantine::short_hash;
use crate::ops::{Checkpoint, CheckpointStore, KillSwitch, QuarantineWriter, RateLimiter};
use crate::pii::PiiScanner;
use crate::store::{DocumentSink, DocumentSource, DurabilityLevel};

/// Scanned ids between kill switch polls
pub const KILL_SWITCH_POLL_INTERVAL: u64 = 1000;

/// `None` marks a worker that panicked
type WorkerResult = (u64, Option<DocumentOutcome>, OwnedSemaphorePermit);

/// Per-document stages: fetch, pace, encrypt, write
pub struct DocumentPipeline {
    source: Arc<dyn DocumentSource>,
    destination: Arc<dyn DocumentSink>,
    scanner: PiiScanner,
    limiter: RateLimiter,
    dry_run: bool,
    durability: DurabilityLevel,
}

impl DocumentPipeline {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        destination: Arc<dyn DocumentSink>,
        scanner: PiiScanner,
        limiter: RateLimiter,
        dry_run: bool,
        durability: DurabilityLevel,
    ) -> Self {
        Self {
            source,
            destination,
            scanner,
            limiter,
            dry_run,
            durability,
        }
    }

    /// Never fails: any stage error becomes a quarantined outcome
    pub async fn process(&self, id: String) -> DocumentOutcome {
        let mut encrypted = false;
        match self.run_stages(&id, &mut encrypted).await {
            Ok(true) => DocumentOutcome::Written { id, encrypted },
            Ok(false) => DocumentOutcome::DryRun { id, encrypted },
            Err(error) => DocumentOutcome::Quarantined { id, encrypted, error },
        }
    }

    /// Returns whether the document was written
    async fn run_stages(&self, id: &str, encrypted: &mut bool) -> Result<bool, StageError> {
        let document = self
            .source
            .get(id)
            .await
            .map_err(|e| StageError::new(Stage::Get, e))?;

        self.limiter
            .acquire()
            .await
            .map_err(|e| StageError::new(Stage::RateLimit, e))?;

        let payload = match self
            .scanner
            .encrypt(&document, id)
            .map_err(|e| StageError::new(Stage::Encrypt, e))?
        {
            Cow::Borrowed(_) => document.clone(),
            Cow::Owned(out) => {
                *encrypted = true;
                Bytes::from(out)
            }
        };

        if self.dry_run {
            return Ok(false);
        }

        self.destination
            .upsert(id, payload, self.durability)
            .await
            .map_err(|e| StageError::new(Stage::Upsert, e))?;
        Ok(true)
    }
}

pub struct MigrationJob {
    source: Arc<dyn DocumentSource>,
    pipeline: Arc<DocumentPipeline>,
    checkpoints: CheckpointStore,
    quarantine: QuarantineWriter,
    kill_switch: KillSwitch,
    config: MigrationConfig,
}

impl MigrationJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn DocumentSource>,
        destination: Arc<dyn DocumentSink>,
        scanner: PiiScanner,
        limiter: RateLimiter,
        checkpoints: CheckpointStore,
        quarantine: QuarantineWriter,
        kill_switch: KillSwitch,
        config: MigrationConfig,
    ) -> MigrationResult<Self> {
        config.validate()?;
        let pipeline = Arc::new(DocumentPipeline::new(
            Arc::clone(&source),
            destination,
            scanner,
            limiter,
            config.dry_run,
            config.durability,
        ));
        Ok(Self {
            source,
            pipeline,
            checkpoints,
            quarantine,
            kill_switch,
            config,
        })
    }

    /// Run one pass over the keyspace from the stored resume point and return
    /// the final checkpoint. On a fatal error the final checkpoint is not
    /// written; the last saved one stays valid for the next attempt.
    pub async fn run(&self) -> MigrationResult<Checkpoint> {
        let store = self.checkpoints.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load()).await??;
        let resume_after = loaded.as_ref().and_then(|cp| cp.last_successful_id.clone());
        let mut state = RunState::resume(loaded.as_ref());

        match &loaded {
            Some(cp) => log::info!(
                "Resuming migration (scanned={}, written={}, quarantined={}, from_start={})",
                cp.scanned,
                cp.written,
                cp.quarantined,
                resume_after.is_none()
            ),
            None => log::info!("Starting migration from the beginning"),
        }
        if self.config.dry_run {
            log::info!("Dry run: documents will not be written");
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        let (tx, mut rx) = mpsc::channel::<WorkerResult>(self.config.max_in_flight);

        let producer = tokio::spawn(produce(
            Arc::clone(&self.source),
            Arc::clone(&self.pipeline),
            self.kill_switch.clone(),
            semaphore,
            tx,
            resume_after,
        ));

        let mut reorder = ReorderBuffer::new();
        let folded = async {
            while let Some((seq, outcome, permit)) = rx.recv().await {
                reorder.insert(seq, (outcome, permit));
                while let Some((outcome, permit)) = reorder.pop_ready() {
                    let outcome = outcome.ok_or(MigrationError::WorkerPanicked {
                        seq: reorder.next_seq() - 1,
                    })?;
                    self.fold(&mut state, outcome).await?;
                    drop(permit);
                }
            }
            Ok::<_, MigrationError>(())
        }
        .await;

        if let Err(e) = folded {
            producer.abort();
            return Err(e);
        }

        let submitted = producer.await??;
        if reorder.next_seq() != submitted {
            return Err(MigrationError::WorkerLost {
                expected: submitted,
                folded: reorder.next_seq(),
            });
        }

        let checkpoint = self.save_checkpoint(state.snapshot()).await?;
        log::info!(
            "Migration finished (scanned={}, encrypted={}, written={}, quarantined={})",
            checkpoint.scanned,
            checkpoint.encrypted,
            checkpoint.written,
            checkpoint.quarantined
        );
        Ok(checkpoint)
    }

    async fn fold(&self, state: &mut RunState, outcome: DocumentOutcome) -> MigrationResult<()> {
        let was_frozen = state.is_frozen();
        state.record(&outcome);

        if let DocumentOutcome::Quarantined { id, error, .. } = outcome {
            log::warn!(
                "Document {} quarantined at {} stage",
                short_hash(&id),
                error.stage
            );
            if !was_frozen {
                log::warn!("Resume point frozen for the rest of this run");
            }
            let writer = self.quarantine.clone();
            let path = tokio::task::spawn_blocking(move || writer.write(&id, error.stage.as_str(), &error)).await??;
            log::debug!("Quarantine record: {}", path.display());
        }

        if state.checkpoint_due(self.config.checkpoint_every) {
            let cp = self.save_checkpoint(state.snapshot()).await?;
            log::debug!(
                "Checkpoint saved (scanned={}, written={}, quarantined={})",
                cp.scanned,
                cp.written,
                cp.quarantined
            );
        }
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> MigrationResult<Checkpoint> {
        let store = self.checkpoints.clone();
        let saved = tokio::task::spawn_blocking(move || store.save(&checkpoint).map(|_| checkpoint)).await??;
        Ok(saved)
    }
}

/// Scan ids and submit them to workers. Returns how many were submitted.
async fn produce(
    source: Arc<dyn DocumentSource>,
    pipeline: Arc<DocumentPipeline>,
    kill_switch: KillSwitch,
    semaphore: Arc<Semaphore>,
    tx: mpsc::Sender<WorkerResult>,
    resume_after: Option<String>,
) -> MigrationResult<u64> {
    let mut ids = source.scan_ids(resume_after.clone());
    let mut previous = resume_after;
    let mut seq: u64 = 0;

    while let Some(next) = ids.next().await {
        let id = next.map_err(MigrationError::Scan)?;

        if let Some(prev) = &previous {
            if is_regression(prev, &id) {
                return Err(MigrationError::NonMonotonicScan {
                    previous: prev.clone(),
                    current: id,
                });
            }
        }
        previous = Some(id.clone());

        if seq > 0 && seq % KILL_SWITCH_POLL_INTERVAL == 0 && kill_switch.engaged() {
            log::warn!("Kill switch engaged; stopping scan after {} ids", seq);
            break;
        }

        // the semaphore is never closed
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };

        let pipeline = Arc::clone(&pipeline);
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(pipeline.process(id)).catch_unwind().await.ok();
            if tx.send((seq, outcome, permit)).await.is_err() {
                log::debug!("Run loop gone; dropping result {}", seq);
            }
        });
        seq += 1;
    }

    Ok(seq)
}
