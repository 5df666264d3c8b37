// SPDX-License-Identifier: MIT OR Apache-2.0
//! Export pipeline: render a job's priced BoQ into CSV, XLSX, or PDF
//! artifacts, with lifecycle events on `jobs:{id}:exports` and presigned
//! downloads.
//!
//! Rate resolution at export time: a row's own `unit_price` wins when set;
//! otherwise the mapped admin price item's rate applies; otherwise zero.
//! `amount = rate * qty + allowance`, and a TOTAL row closes the table.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod pdf;
mod xlsx;

use qto_broker::EventBus;
use qto_core::{Artifact, ArtifactId, JobId, Role, UserId, channel};
use qto_error::{Error, Result};
use qto_presign::{Action, Presigner};
use qto_store::Store;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

/// Supported artifact formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-separated values.
    Csv,
    /// Office Open XML spreadsheet.
    Xlsx,
    /// Portable document format.
    Pdf,
}

impl ExportFormat {
    /// Lowercase name, used in artifact kinds and file extensions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Pdf => "pdf",
        }
    }

    /// MIME type for download responses.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Pdf => "application/pdf",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            "pdf" => Ok(Self::Pdf),
            other => Err(Error::validation_field(
                "format",
                format!("unsupported export format: {other}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Row collection
// ---------------------------------------------------------------------------

/// One line of the rendered table, rates resolved.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportRow {
    /// Catalog code, empty when absent.
    pub code: String,
    /// Work description.
    pub description: String,
    /// Measurement unit.
    pub unit: String,
    /// Quantity.
    pub qty: f64,
    /// Fixed allowance.
    pub allowance: f64,
    /// Resolved rate.
    pub rate: f64,
    /// `rate * qty + allowance`.
    pub amount: f64,
}

const HEADERS: [&str; 7] = [
    "code",
    "description",
    "unit",
    "qty",
    "allowance",
    "rate",
    "amount",
];

// ---------------------------------------------------------------------------
// Exporter
// ---------------------------------------------------------------------------

/// The export pipeline and its collaborators.
pub struct Exporter {
    store: Store,
    broker: Arc<dyn EventBus>,
    presigner: Arc<Presigner>,
    artifacts_dir: PathBuf,
}

impl Exporter {
    /// Wire an exporter.
    pub fn new(
        store: Store,
        broker: Arc<dyn EventBus>,
        presigner: Arc<Presigner>,
        artifacts_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            broker,
            presigner,
            artifacts_dir,
        }
    }

    /// Render an artifact for `job_id` and record it.
    ///
    /// Publishes `export.started` before rendering and `export.completed`
    /// with the artifact id afterwards, both on `jobs:{id}:exports`.
    pub fn export(&self, job_id: JobId, format: ExportFormat, actor: UserId) -> Result<Artifact> {
        let job = self.store.job_get(job_id)?;
        qto_rbac::require_project_access(&self.store, job.project_id, actor, Role::Viewer)?;

        let exports_channel = channel::job_exports(job_id);
        self.broker.publish(
            &exports_channel,
            serde_json::json!({
                "type": "export.started",
                "job_id": job_id,
                "format": format.as_str(),
            }),
        );

        let rows = self.collect_rows(job_id);
        let bytes = match format {
            ExportFormat::Csv => render_csv(&rows)?,
            ExportFormat::Xlsx => xlsx::render(&rows)?,
            ExportFormat::Pdf => render_pdf(&rows, &self.currency_for(&job)),
        };

        std::fs::create_dir_all(&self.artifacts_dir)?;
        let filename = format!("{job_id}_boq.{}", format.as_str());
        let path = self.artifacts_dir.join(&filename);
        std::fs::write(&path, &bytes)?;

        let artifact = self.store.artifact_insert(Artifact {
            id: Uuid::new_v4(),
            job_id,
            kind: format!("export:{}", format.as_str()),
            path: path.to_string_lossy().into_owned(),
            size: bytes.len() as u64,
            checksum: hex_sha256(&bytes),
            created_at: self.store.now(),
        })?;

        self.broker.publish(
            &exports_channel,
            serde_json::json!({
                "type": "export.completed",
                "job_id": job_id,
                "format": format.as_str(),
                "artifact_id": artifact.id,
                "size": artifact.size,
            }),
        );
        info!(job_id = %job_id, artifact_id = %artifact.id, format = format.as_str(), "export complete");
        Ok(artifact)
    }

    /// Mint a presigned download URL after an access check on the owning
    /// job's project.
    pub fn presign_download(
        &self,
        artifact_id: ArtifactId,
        actor: UserId,
        ttl_secs: Option<u64>,
    ) -> Result<String> {
        let artifact = self.store.artifact_get(artifact_id)?;
        let job = self.store.job_get(artifact.job_id)?;
        qto_rbac::require_project_access(&self.store, job.project_id, actor, Role::Viewer)?;

        let path = format!("/api/v1/artifacts/{artifact_id}/download");
        Ok(self
            .presigner
            .presign(&path, Action::Download, &artifact_id.to_string(), ttl_secs))
    }

    /// Validate a presented download token and return the artifact.
    ///
    /// No ownership re-check here: the signature was authorized at issue
    /// time and is scoped to this one artifact id.
    pub fn verify_download(
        &self,
        artifact_id: ArtifactId,
        act: &str,
        exp: i64,
        sig: &str,
    ) -> Result<Artifact> {
        if act != Action::Download.as_str() {
            return Err(Error::validation_field("act", "invalid action"));
        }
        self.presigner
            .verify(act, &artifact_id.to_string(), exp, sig)?;
        self.store.artifact_get(artifact_id)
    }

    /// Freeze the priced totals of a job into an estimate snapshot.
    pub fn save_estimate(
        &self,
        job_id: JobId,
        name: &str,
        actor: UserId,
    ) -> Result<qto_core::Estimate> {
        let job = self.store.job_get(job_id)?;
        qto_rbac::require_project_access(&self.store, job.project_id, actor, Role::Viewer)?;
        if name.trim().is_empty() {
            return Err(Error::validation_field("name", "estimate name is required"));
        }

        let rows = self.collect_rows(job_id);
        let total: f64 = rows.iter().map(|r| r.amount).sum();
        self.store.estimate_insert(qto_core::Estimate {
            id: Uuid::new_v4(),
            project_id: job.project_id,
            job_id,
            name: name.trim().to_string(),
            totals: serde_json::json!({
                "currency": self.currency_for(&job),
                "total": total,
                "rows": rows.len(),
            }),
            created_at: self.store.now(),
        })
    }

    /// Rows of the job joined with resolved rates.
    pub fn collect_rows(&self, job_id: JobId) -> Vec<ExportRow> {
        self.store.read(|s| {
            s.boq_for_job(job_id)
                .into_iter()
                .map(|item| {
                    let mut rate = item.unit_price;
                    if rate == 0.0 {
                        if let Some(price_item_id) = item.mapped_price_item_id {
                            if let Some(pi) = s.price_items.get(&price_item_id) {
                                rate = pi.rate;
                            }
                        }
                    }
                    ExportRow {
                        code: item.code.unwrap_or_default(),
                        description: item.description,
                        unit: item.unit,
                        qty: item.qty,
                        allowance: item.allowance,
                        rate,
                        amount: rate * item.qty + item.allowance,
                    }
                })
                .collect()
        })
    }

    fn currency_for(&self, job: &qto_core::Job) -> String {
        job.price_list_id
            .and_then(|id| self.store.price_list_get(id).ok())
            .map(|pl| pl.currency)
            .unwrap_or_else(|| "—".to_string())
    }
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

/// CSV with a header row and a trailing TOTAL line.
pub fn render_csv(rows: &[ExportRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(HEADERS)
        .map_err(|e| Error::Internal(format!("csv: {e}")))?;
    let mut total = 0.0;
    for row in rows {
        total += row.amount;
        writer
            .write_record([
                row.code.as_str(),
                row.description.as_str(),
                row.unit.as_str(),
                &format_qty(row.qty),
                &format_money(row.allowance),
                &format_money(row.rate),
                &format_money(row.amount),
            ])
            .map_err(|e| Error::Internal(format!("csv: {e}")))?;
    }
    writer
        .write_record(["", "TOTAL", "", "", "", "", &format_money(total)])
        .map_err(|e| Error::Internal(format!("csv: {e}")))?;
    writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("csv: {e}")))
}

/// Tabular PDF via the built-in page writer.
fn render_pdf(rows: &[ExportRow], currency: &str) -> Vec<u8> {
    let mut lines = Vec::with_capacity(rows.len() + 3);
    lines.push(pdf::PdfLine {
        cells: vec![format!("Currency: {currency}")],
        bold: false,
    });
    lines.push(pdf::PdfLine {
        cells: HEADERS.iter().map(|h| h.to_string()).collect(),
        bold: true,
    });
    let mut total = 0.0;
    for row in rows {
        total += row.amount;
        let mut description = row.description.clone();
        description.truncate(48);
        lines.push(pdf::PdfLine {
            cells: vec![
                row.code.clone(),
                description,
                row.unit.clone(),
                format_qty(row.qty),
                format_money(row.allowance),
                format_money(row.rate),
                format_money(row.amount),
            ],
            bold: false,
        });
    }
    lines.push(pdf::PdfLine {
        cells: vec![
            String::new(),
            "TOTAL".into(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            format!("{} {currency}", format_money(total)),
        ],
        bold: true,
    });
    pdf::render("Bill of Quantities — Priced", &lines)
}

fn format_money(value: f64) -> String {
    format!("{value:.2}")
}

fn format_qty(value: f64) -> String {
    let s = format!("{value}");
    if s.contains('.') { s } else { format!("{value:.0}") }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
