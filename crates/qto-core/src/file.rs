// SPDX-License-Identifier: MIT OR Apache-2.0
//! Uploaded model files.

use crate::{FileId, ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported upload formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    /// ISO-10303-21 (STEP) building model.
    Ifc,
    /// Binary AutoCAD drawing.
    Dwg,
    /// Text drawing-exchange format.
    Dxf,
    /// Portable document format plan.
    Pdf,
}

impl FileType {
    /// Canonical uppercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ifc => "IFC",
            Self::Dwg => "DWG",
            Self::Dxf => "DXF",
            Self::Pdf => "PDF",
        }
    }

    /// All supported types.
    pub fn all() -> &'static [FileType] {
        &[Self::Ifc, Self::Dwg, Self::Dxf, Self::Pdf]
    }

    /// Checks that the first bytes of an upload match this type.
    ///
    /// `%PDF-` for PDF, the STEP banner for IFC, `AC` plus release digits
    /// for DWG. DXF has no fixed magic; its group-code structure must show
    /// up near the start of the text.
    pub fn magic_matches(self, bytes: &[u8]) -> bool {
        match self {
            Self::Pdf => bytes.starts_with(b"%PDF-"),
            Self::Ifc => bytes.starts_with(b"ISO-10303-21"),
            Self::Dwg => {
                bytes.len() >= 6
                    && bytes.starts_with(b"AC")
                    && bytes[2..6].iter().all(|b| b.is_ascii_digit())
            }
            Self::Dxf => {
                let head = &bytes[..bytes.len().min(2048)];
                match std::str::from_utf8(head) {
                    Ok(text) => text.contains("SECTION") || text.trim_start().starts_with("999"),
                    Err(_) => false,
                }
            }
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IFC" => Ok(Self::Ifc),
            "DWG" => Ok(Self::Dwg),
            "DXF" => Ok(Self::Dxf),
            "PDF" => Ok(Self::Pdf),
            other => Err(format!("unsupported file type: {other}")),
        }
    }
}

/// Metadata row for an uploaded file.
///
/// Invariant: bytes exist on disk if and only if `size > 0`; the first PUT
/// wins and later ones are rejected at the handler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Unique identifier; also the on-disk name under `uploads/`.
    pub id: FileId,
    /// Project the file belongs to.
    pub project_id: ProjectId,
    /// Uploading account.
    pub user_id: UserId,
    /// Original client-side filename.
    pub filename: String,
    /// Declared format.
    pub file_type: FileType,
    /// Size in bytes; zero until content is uploaded.
    pub size: u64,
    /// Hex SHA-256 of the content; empty until uploaded.
    pub checksum: String,
    /// Timestamp of the metadata row.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the content upload.
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl StoredFile {
    /// True once content bytes have been received.
    pub fn has_content(&self) -> bool {
        self.size > 0
    }
}
