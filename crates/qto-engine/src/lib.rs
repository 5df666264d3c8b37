// SPDX-License-Identifier: MIT OR Apache-2.0
//! Job lifecycle engine.
//!
//! Submission is cheap and synchronous on the request path: authorize,
//! debit credits atomically, insert the `queued` row, hand the job id to a
//! [`JobQueue`]. Execution happens in a background task per job:
//!
//! ```text
//! queued -> running -> completed
//!                 \-> failed
//!                 \-> canceled
//! ```
//!
//! Every stage is appended to the persistent event log and fanned out on
//! the `job:{id}` channel. All failure paths refund the submission cost;
//! a refund failure is logged but never crashes the worker. The engine
//! catches its own errors — nothing propagates past submission.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use qto_broker::EventBus;
use qto_core::job::{error_code, stage};
use qto_core::{Job, JobId, JobStatus, StageEvent, UserId, channel};
use qto_error::{Error, Result};
use qto_extract::validate::validate_file;
use qto_extract::{ExtractRequest, ExtractorSet, MappingConfig};
use qto_store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobQueue
// ---------------------------------------------------------------------------

/// Typed submission seam between the request path and background
/// execution. Deployments may back it with in-process workers or an
/// external queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Schedule background execution of `job_id`.
    async fn submit(&self, job_id: JobId) -> Result<()>;
}

/// In-process queue: one detached tokio task per submitted job.
pub struct TokioJobQueue {
    engine: Arc<Engine>,
}

impl TokioJobQueue {
    /// Create a queue executing against `engine`.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobQueue for TokioJobQueue {
    async fn submit(&self, job_id: JobId) -> Result<()> {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.process(job_id).await;
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Parameters of a job submission.
#[derive(Debug, Clone)]
pub struct CreateJob {
    /// Project the job belongs to.
    pub project_id: Uuid,
    /// Uploaded file to process.
    pub file_id: Uuid,
    /// Explicit price list, overriding resolution.
    pub price_list_id: Option<Uuid>,
    /// Supplier whose catalog shadows admin rates.
    pub supplier_id: Option<Uuid>,
}

/// The background runner and its collaborators, constructor-wired.
pub struct Engine {
    store: Store,
    broker: Arc<dyn EventBus>,
    extractors: ExtractorSet,
    mapping: MappingConfig,
    uploads_dir: PathBuf,
    cost_per_job: u64,
}

impl Engine {
    /// Wire an engine from its collaborators.
    pub fn new(
        store: Store,
        broker: Arc<dyn EventBus>,
        extractors: ExtractorSet,
        mapping: MappingConfig,
        uploads_dir: PathBuf,
        cost_per_job: u64,
    ) -> Self {
        Self {
            store,
            broker,
            extractors,
            mapping,
            uploads_dir,
            cost_per_job,
        }
    }

    /// Credits debited per submission.
    pub fn cost_per_job(&self) -> u64 {
        self.cost_per_job
    }

    /// Submission protocol: authorize, debit, resolve pricing, insert.
    ///
    /// The debit happens before the job row exists; every failure path of
    /// the later pipeline refunds it. Insufficient credits surface as
    /// `PaymentRequired` carrying the current balance, and no job is
    /// created.
    pub fn create_job(&self, user_id: UserId, req: CreateJob) -> Result<Job> {
        let file = self.store.file_get(req.file_id)?;
        if file.user_id != user_id {
            return Err(Error::not_found(format!("file {}", req.file_id)));
        }

        let cost = self.cost_per_job;
        let (balance, ok) = self.store.credits_debit(user_id, cost)?;
        if !ok {
            return Err(Error::PaymentRequired {
                required: cost,
                balance,
            });
        }

        let price_list_id = self.resolve_price_list(req.price_list_id, req.supplier_id);
        let job = Job {
            id: Uuid::new_v4(),
            project_id: req.project_id,
            user_id,
            file_id: req.file_id,
            status: JobStatus::Queued,
            progress: 0,
            error_code: None,
            price_list_id,
            supplier_id: req.supplier_id,
            created_at: self.store.now(),
            started_at: None,
            finished_at: None,
        };
        let job = self.store.job_insert(job)?;
        info!(job_id = %job.id, user_id = %user_id, cost, "job submitted");
        Ok(job)
    }

    /// Price list resolution: explicit id, then the supplier's default,
    /// then the active admin list, then none.
    fn resolve_price_list(&self, explicit: Option<Uuid>, supplier: Option<Uuid>) -> Option<Uuid> {
        if let Some(id) = explicit {
            if self.store.price_list_get(id).is_ok() {
                return Some(id);
            }
        }
        if let Some(supplier_id) = supplier {
            if let Ok(supplier) = self.store.supplier_get(supplier_id) {
                if let Some(id) = supplier.default_price_list_id {
                    return Some(id);
                }
            }
        }
        self.store.active_price_list().map(|pl| pl.id)
    }

    /// Background execution of one job. Never panics or propagates.
    pub async fn process(&self, job_id: JobId) {
        if let Err(err) = self.run_pipeline(job_id).await {
            error!(job_id = %job_id, error = %err, "job pipeline failed unexpectedly");
            self.fail(
                job_id,
                error_code::UNEXPECTED,
                &format!("Unexpected error: {err}"),
                None,
            );
        }
    }

    async fn run_pipeline(&self, job_id: JobId) -> Result<()> {
        // Missing rows mean another worker finished the job or it was
        // removed; exit silently either way.
        let Ok(job) = self.store.job_get(job_id) else {
            return Ok(());
        };
        if job.status != JobStatus::Queued {
            return Ok(());
        }
        let Ok(file) = self.store.file_get(job.file_id) else {
            return Ok(());
        };

        self.store
            .job_update_status(job_id, JobStatus::Running, None)?;
        self.emit(job_id, stage::QUEUED, "Job queued", None, Some(5));
        self.emit(job_id, stage::VALIDATING, "Validating model...", None, Some(15));

        let upload_path = self.uploads_dir.join(file.id.to_string());
        let outcome = match validate_file(file.file_type, &upload_path) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail(
                    job_id,
                    error_code::VALIDATION,
                    &format!("Cannot read upload: {err}"),
                    None,
                );
                return Ok(());
            }
        };
        if !outcome.is_valid() {
            self.fail(
                job_id,
                error_code::VALIDATION,
                "Validation failed",
                Some(serde_json::json!({"errors": outcome.errors})),
            );
            return Ok(());
        }
        if !outcome.warnings.is_empty() {
            self.emit(job_id, stage::WARNINGS, &outcome.warnings.join("; "), None, None);
        }

        if self.is_canceled(job_id) {
            return Ok(());
        }
        self.emit(job_id, stage::PARSING, "Parsing model...", None, Some(30));
        self.emit(job_id, stage::TAKEOFF, "Generating quantities...", None, Some(60));

        let req = ExtractRequest {
            file_type: file.file_type,
            path: &upload_path,
            mapping: &self.mapping,
        };
        let rows = match self.extractors.extract(&req) {
            Ok(rows) => rows,
            Err(err) => {
                self.fail(
                    job_id,
                    error_code::TAKEOFF,
                    &format!("Take-off failed: {err}"),
                    None,
                );
                return Ok(());
            }
        };

        if self.is_canceled(job_id) {
            return Ok(());
        }
        let now = self.store.now();
        let items: Vec<_> = rows.into_iter().map(|r| r.into_item(job_id, now)).collect();
        let count = items.len();
        self.store.boq_insert_rows(items)?;
        self.emit(
            job_id,
            stage::COMPLETE,
            "Take-off ready",
            Some(serde_json::json!({"rows": count})),
            Some(85),
        );

        // Pricing is best-effort: price-all-matching or price-none.
        match self.auto_apply_pricing(job_id) {
            Ok(Some(mapped)) => {
                self.emit(
                    job_id,
                    stage::PRICING,
                    "Prices applied",
                    Some(serde_json::json!({"mapped": mapped})),
                    Some(90),
                );
            }
            Ok(None) => {}
            Err(err) => {
                self.emit(
                    job_id,
                    stage::PRICING,
                    &format!("Pricing skipped: {err}"),
                    None,
                    None,
                );
            }
        }

        if self.is_canceled(job_id) {
            return Ok(());
        }
        self.store
            .job_update_status(job_id, JobStatus::Completed, None)?;
        self.emit(job_id, stage::COMPLETED, "Job finished", None, None);
        info!(job_id = %job_id, rows = count, "job completed");
        Ok(())
    }

    /// Append a stage event, bump progress, and fan out on `job:{id}`.
    ///
    /// Event-log failures are logged and swallowed: losing a progress event
    /// must not fail the job itself.
    fn emit(
        &self,
        job_id: JobId,
        stage: &str,
        message: &str,
        details: Option<serde_json::Value>,
        progress: Option<u8>,
    ) {
        if let Some(progress) = progress {
            if let Err(err) = self.store.job_set_progress(job_id, progress) {
                warn!(job_id = %job_id, error = %err, "failed to set progress");
            }
        }
        match self
            .store
            .job_event_append(job_id, stage, message, details.clone())
        {
            Ok(event) => {
                let payload = serde_json::to_value(StageEvent::from(&event))
                    .unwrap_or_else(|_| serde_json::json!({"stage": stage, "message": message}));
                self.broker.publish(&channel::job(job_id), payload);
            }
            Err(err) => warn!(job_id = %job_id, stage, error = %err, "failed to append event"),
        }
    }

    /// Terminal failure: status, error event, refund. Each step is
    /// best-effort so a broken store cannot wedge the worker.
    fn fail(
        &self,
        job_id: JobId,
        code: &str,
        message: &str,
        details: Option<serde_json::Value>,
    ) {
        if let Err(err) =
            self.store
                .job_update_status(job_id, JobStatus::Failed, Some(code.to_string()))
        {
            warn!(job_id = %job_id, error = %err, "failed to mark job failed");
        }
        self.emit(job_id, stage::ERROR, message, details, None);
        self.refund(job_id);
    }

    /// Return the submission cost to the job's owner. Called exactly once
    /// per terminal-failure path.
    fn refund(&self, job_id: JobId) {
        let job = match self.store.job_get(job_id) {
            Ok(job) => job,
            Err(err) => {
                error!(job_id = %job_id, error = %err, "refund skipped: job not loadable");
                return;
            }
        };
        match self.store.credits_credit(job.user_id, self.cost_per_job) {
            Ok(balance) => {
                self.emit(
                    job_id,
                    stage::REFUND,
                    &format!("Credits refunded ({} credits)", self.cost_per_job),
                    Some(serde_json::json!({"balance": balance})),
                    None,
                );
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "credit refund failed");
            }
        }
    }

    fn is_canceled(&self, job_id: JobId) -> bool {
        matches!(
            self.store.job_get(job_id).map(|j| j.status),
            Ok(JobStatus::Canceled)
        )
    }

    /// Apply pricing for the whole job in one transaction, or not at all.
    ///
    /// Supplier rates (when the job has a supplier) write `unit_price`
    /// directly and shadow the admin list; admin price items only record
    /// the mapping, leaving rate resolution to the export join. Returns
    /// the number of rows touched, or `None` when no catalog is
    /// resolvable.
    fn auto_apply_pricing(&self, job_id: JobId) -> Result<Option<usize>> {
        let job = self.store.job_get(job_id)?;
        let supplier_rates: std::collections::HashMap<String, f64> = match job.supplier_id {
            Some(supplier_id) => self
                .store
                .supplier_items_for(supplier_id)
                .into_iter()
                .map(|si| (si.code.clone(), si.rate))
                .collect(),
            None => Default::default(),
        };
        let admin_items: std::collections::HashMap<String, Uuid> = match job.price_list_id {
            Some(list_id) => self
                .store
                .price_items_for_list(list_id)
                .into_iter()
                .map(|pi| (pi.code.clone(), pi.id))
                .collect(),
            None => Default::default(),
        };
        if supplier_rates.is_empty() && admin_items.is_empty() {
            return Ok(None);
        }

        let mapped = self.store.tx(|s| {
            let ids: Vec<Uuid> = s.boq_for_job(job_id).iter().map(|i| i.id).collect();
            let mut mapped = 0usize;
            for id in ids {
                let item = s.boq_items.get_mut(&id).expect("row listed above");
                let Some(code) = item.code.clone() else {
                    continue;
                };
                let mut touched = false;
                if let Some(rate) = supplier_rates.get(&code) {
                    item.unit_price = *rate;
                    item.recompute_total();
                    touched = true;
                }
                if let Some(price_item_id) = admin_items.get(&code) {
                    item.mapped_price_item_id = Some(*price_item_id);
                    touched = true;
                }
                if touched {
                    mapped += 1;
                }
            }
            Ok(mapped)
        })?;
        Ok(Some(mapped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qto_broker::Broker;
    use qto_core::{FileType, StoredFile, SystemClock, User, UserRole};
    use qto_extract::BoqRow;
    use qto_extract::mock::{FailingExtractor, StaticExtractor};
    use std::io::Write as _;

    struct Fixture {
        engine: Arc<Engine>,
        store: Store,
        broker: Broker,
        user: User,
        file: StoredFile,
        _dir: tempfile::TempDir,
    }

    const VALID_IFC: &str = r#"ISO-10303-21;
HEADER;
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCWALL('0DWgwt6o1FOx7466fPk$jl',$,'Wall A');
#2=IFCCARTESIANPOINT((0.,0.,0.));
#3=IFCCARTESIANPOINT((5000.,2500.,3000.));
#4=IFCSIUNIT(*,.LENGTHUNIT.,.MILLI.,.METRE.);
ENDSEC;
END-ISO-10303-21;
"#;

    fn fixture_with(extractors: ExtractorSet, balance: u64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::in_memory(Arc::new(SystemClock));
        let broker = Broker::new();

        let user = store
            .user_insert(User {
                id: Uuid::new_v4(),
                email: "owner@test.local".into(),
                password_hash: "h".into(),
                role: UserRole::User,
                email_verified: true,
                credits_balance: balance,
                full_name: "Owner".into(),
                created_at: store.now(),
                last_verification_sent_at: None,
                deactivated: false,
            })
            .unwrap();

        let file = store
            .file_insert(StoredFile {
                id: Uuid::new_v4(),
                project_id: Uuid::new_v4(),
                user_id: user.id,
                filename: "model.ifc".into(),
                file_type: FileType::Ifc,
                size: VALID_IFC.len() as u64,
                checksum: String::new(),
                created_at: store.now(),
                uploaded_at: Some(store.now()),
            })
            .unwrap();

        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let mut f = std::fs::File::create(uploads.join(file.id.to_string())).unwrap();
        f.write_all(VALID_IFC.as_bytes()).unwrap();

        let engine = Arc::new(Engine::new(
            store.clone(),
            Arc::new(broker.clone()),
            extractors,
            MappingConfig::default(),
            uploads,
            400,
        ));
        Fixture {
            engine,
            store,
            broker,
            user,
            file,
            _dir: dir,
        }
    }

    fn static_rows() -> ExtractorSet {
        let mut set = ExtractorSet::new();
        set.register(
            FileType::Ifc,
            Arc::new(StaticExtractor::new(vec![
                BoqRow::new(Some("05-100".into()), "Walls", "m2", 26.75, None),
                BoqRow::new(Some("08-100".into()), "Doors", "pcs", 2.0, None),
            ])),
        );
        set
    }

    fn submit(fx: &Fixture) -> Job {
        fx.engine
            .create_job(
                fx.user.id,
                CreateJob {
                    project_id: fx.file.project_id,
                    file_id: fx.file.id,
                    price_list_id: None,
                    supplier_id: None,
                },
            )
            .unwrap()
    }

    fn stages(store: &Store, job_id: JobId) -> Vec<String> {
        store
            .job_events(job_id)
            .into_iter()
            .map(|e| e.stage)
            .collect()
    }

    // -- submission -------------------------------------------------------

    #[tokio::test]
    async fn submission_debits_credits() {
        let fx = fixture_with(static_rows(), 1000);
        let job = submit(&fx);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(fx.store.user_get(fx.user.id).unwrap().credits_balance, 600);
    }

    #[tokio::test]
    async fn insufficient_credits_creates_no_job() {
        let fx = fixture_with(static_rows(), 300);
        let err = fx
            .engine
            .create_job(
                fx.user.id,
                CreateJob {
                    project_id: fx.file.project_id,
                    file_id: fx.file.id,
                    price_list_id: None,
                    supplier_id: None,
                },
            )
            .unwrap_err();
        match err {
            Error::PaymentRequired { required, balance } => {
                assert_eq!(required, 400);
                assert_eq!(balance, 300);
            }
            other => panic!("expected PaymentRequired, got {other:?}"),
        }
        assert!(fx.store.jobs_for_user(fx.user.id).is_empty());
        assert_eq!(fx.store.user_get(fx.user.id).unwrap().credits_balance, 300);
    }

    #[tokio::test]
    async fn foreign_file_is_hidden() {
        let fx = fixture_with(static_rows(), 1000);
        let stranger = Uuid::new_v4();
        let err = fx
            .engine
            .create_job(
                stranger,
                CreateJob {
                    project_id: fx.file.project_id,
                    file_id: fx.file.id,
                    price_list_id: None,
                    supplier_id: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_submissions_admit_floor_of_balance() {
        // Scenario S1: balance 1000, cost 400, five concurrent submits:
        // exactly two jobs, final balance 200.
        let fx = fixture_with(static_rows(), 1000);
        let mut handles = Vec::new();
        for _ in 0..5 {
            let engine = fx.engine.clone();
            let user_id = fx.user.id;
            let req = CreateJob {
                project_id: fx.file.project_id,
                file_id: fx.file.id,
                price_list_id: None,
                supplier_id: None,
            };
            handles.push(tokio::spawn(async move { engine.create_job(user_id, req) }));
        }
        let mut accepted = 0;
        let mut rejected = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(Error::PaymentRequired { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(accepted, 2);
        assert_eq!(rejected, 3);
        assert_eq!(fx.store.user_get(fx.user.id).unwrap().credits_balance, 200);
        assert_eq!(fx.store.jobs_for_user(fx.user.id).len(), 2);
    }

    // -- pipeline ---------------------------------------------------------

    #[tokio::test]
    async fn happy_path_completes_with_rows_and_events() {
        let fx = fixture_with(static_rows(), 1000);
        let job = submit(&fx);
        let live = fx.broker.subscribe(&channel::job(job.id));

        fx.engine.process(job.id).await;

        let done = fx.store.job_get(job.id).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.check_invariants().is_ok());
        assert_eq!(fx.store.boq_for_job(job.id).len(), 2);

        let stages = stages(&fx.store, job.id);
        assert_eq!(
            stages,
            vec!["queued", "validating", "parsing", "takeoff", "complete", "completed"]
        );

        // Live fan-out carried the same stages in order.
        let mut seen = Vec::new();
        while let Some(ev) = live.try_recv() {
            if !qto_broker::is_heartbeat(&ev) {
                seen.push(ev["stage"].as_str().unwrap().to_string());
            }
        }
        assert_eq!(seen, stages);
    }

    #[tokio::test]
    async fn failing_extractor_refunds_and_marks_takeoff_error() {
        // Scenario S2: extractor raises; job fails with takeoff_error,
        // balance returns to its pre-submit value, error and refund events
        // are present.
        let mut set = ExtractorSet::new();
        set.register(FileType::Ifc, Arc::new(FailingExtractor::new("boom")));
        let fx = fixture_with(set, 600);

        let job = submit(&fx);
        assert_eq!(fx.store.user_get(fx.user.id).unwrap().credits_balance, 200);

        fx.engine.process(job.id).await;

        let done = fx.store.job_get(job.id).unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error_code.as_deref(), Some("takeoff_error"));
        assert!(done.finished_at.is_some());
        assert_eq!(fx.store.user_get(fx.user.id).unwrap().credits_balance, 600);

        let stages = stages(&fx.store, job.id);
        assert!(stages.contains(&"error".to_string()));
        assert!(stages.contains(&"refund".to_string()));
        assert!(fx.store.boq_for_job(job.id).is_empty());
    }

    #[tokio::test]
    async fn validation_failure_refunds() {
        let fx = fixture_with(static_rows(), 1000);
        let job = submit(&fx);
        // Corrupt the upload so validation fails.
        let path = fx._dir.path().join("uploads").join(fx.file.id.to_string());
        std::fs::write(&path, "not a step file").unwrap();

        fx.engine.process(job.id).await;

        let done = fx.store.job_get(job.id).unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error_code.as_deref(), Some("validation_error"));
        assert_eq!(fx.store.user_get(fx.user.id).unwrap().credits_balance, 1000);
    }

    #[tokio::test]
    async fn unit_warning_is_emitted_not_fatal() {
        let fx = fixture_with(static_rows(), 1000);
        let job = submit(&fx);
        let path = fx._dir.path().join("uploads").join(fx.file.id.to_string());
        let without_units =
            VALID_IFC.replace("#4=IFCSIUNIT(*,.LENGTHUNIT.,.MILLI.,.METRE.);\n", "");
        std::fs::write(&path, without_units).unwrap();

        fx.engine.process(job.id).await;

        assert_eq!(
            fx.store.job_get(job.id).unwrap().status,
            JobStatus::Completed
        );
        let stages = stages(&fx.store, job.id);
        assert!(stages.contains(&"warnings".to_string()));
    }

    #[tokio::test]
    async fn missing_job_exits_silently() {
        let fx = fixture_with(static_rows(), 1000);
        fx.engine.process(Uuid::new_v4()).await;
        assert_eq!(fx.store.user_get(fx.user.id).unwrap().credits_balance, 1000);
    }

    #[tokio::test]
    async fn canceled_job_is_left_alone() {
        let fx = fixture_with(static_rows(), 1000);
        let job = submit(&fx);
        fx.store
            .job_update_status(job.id, JobStatus::Canceled, None)
            .unwrap();

        fx.engine.process(job.id).await;

        let after = fx.store.job_get(job.id).unwrap();
        assert_eq!(after.status, JobStatus::Canceled);
        assert!(fx.store.boq_for_job(job.id).is_empty());
    }

    #[tokio::test]
    async fn double_process_is_idempotent() {
        let fx = fixture_with(static_rows(), 1000);
        let job = submit(&fx);
        fx.engine.process(job.id).await;
        fx.engine.process(job.id).await;
        // The second run sees a non-queued job and exits without touching
        // rows or events.
        assert_eq!(fx.store.boq_for_job(job.id).len(), 2);
        assert_eq!(
            stages(&fx.store, job.id)
                .iter()
                .filter(|s| s.as_str() == "completed")
                .count(),
            1
        );
    }

    // -- pricing ----------------------------------------------------------

    #[tokio::test]
    async fn supplier_rates_shadow_admin_list() {
        use qto_core::{PriceItem, PriceList, Supplier, SupplierPriceItem};

        let fx = fixture_with(static_rows(), 1000);
        let list = fx
            .store
            .price_list_insert(PriceList {
                id: Uuid::new_v4(),
                name: "Admin 2026".into(),
                currency: "EUR".into(),
                is_active: true,
                effective_from: None,
                created_at: fx.store.now(),
            })
            .unwrap();
        let admin_item = fx
            .store
            .price_item_insert(PriceItem {
                id: Uuid::new_v4(),
                price_list_id: list.id,
                code: "05-100".into(),
                description: "Walls".into(),
                unit: "m2".into(),
                rate: 40.0,
            })
            .unwrap();
        let supplier = fx
            .store
            .supplier_insert(Supplier {
                id: Uuid::new_v4(),
                name: "ACME".into(),
                email: None,
                default_price_list_id: Some(list.id),
                created_at: fx.store.now(),
            })
            .unwrap();
        fx.store
            .supplier_price_item_insert(SupplierPriceItem {
                id: Uuid::new_v4(),
                supplier_id: supplier.id,
                code: "05-100".into(),
                rate: 35.5,
                unit: "m2".into(),
            })
            .unwrap();

        let job = fx
            .engine
            .create_job(
                fx.user.id,
                CreateJob {
                    project_id: fx.file.project_id,
                    file_id: fx.file.id,
                    price_list_id: None,
                    supplier_id: Some(supplier.id),
                },
            )
            .unwrap();
        assert_eq!(job.price_list_id, Some(list.id));

        fx.engine.process(job.id).await;

        let rows = fx.store.boq_for_job(job.id);
        let walls = rows.iter().find(|r| r.description == "Walls").unwrap();
        assert_eq!(walls.unit_price, 35.5);
        assert_eq!(walls.mapped_price_item_id, Some(admin_item.id));
        assert!(walls.total_in_tolerance());

        // Unmatched codes stay untouched.
        let doors = rows.iter().find(|r| r.description == "Doors").unwrap();
        assert_eq!(doors.unit_price, 0.0);
        assert_eq!(doors.mapped_price_item_id, None);

        let stages = stages(&fx.store, job.id);
        assert!(stages.contains(&"pricing".to_string()));
    }

    #[tokio::test]
    async fn no_catalog_means_no_pricing_stage() {
        let fx = fixture_with(static_rows(), 1000);
        let job = submit(&fx);
        fx.engine.process(job.id).await;
        assert!(!stages(&fx.store, job.id).contains(&"pricing".to_string()));
    }
}
