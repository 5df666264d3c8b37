// SPDX-License-Identifier: MIT OR Apache-2.0
//! XLSX rendering: a minimal OOXML workbook inside a zip container.
//!
//! One worksheet, inline strings, no shared-string table or styles. Opens
//! in every mainstream spreadsheet application.

use crate::{ExportRow, HEADERS};
use qto_error::{Error, Result};
use std::io::Write as _;
use zip::write::SimpleFileOptions;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="BoQ" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn string_cell(text: &str) -> String {
    format!("<c t=\"inlineStr\"><is><t>{}</t></is></c>", xml_escape(text))
}

fn number_cell(value: f64) -> String {
    format!("<c><v>{value}</v></c>")
}

fn sheet_xml(rows: &[ExportRow]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );

    body.push_str("<row>");
    for header in HEADERS {
        body.push_str(&string_cell(header));
    }
    body.push_str("</row>");

    let mut total = 0.0;
    for row in rows {
        total += row.amount;
        body.push_str("<row>");
        body.push_str(&string_cell(&row.code));
        body.push_str(&string_cell(&row.description));
        body.push_str(&string_cell(&row.unit));
        body.push_str(&number_cell(row.qty));
        body.push_str(&number_cell(row.allowance));
        body.push_str(&number_cell(row.rate));
        body.push_str(&number_cell(row.amount));
        body.push_str("</row>");
    }

    body.push_str("<row>");
    for _ in 0..5 {
        body.push_str(&string_cell(""));
    }
    body.push_str(&string_cell("TOTAL"));
    body.push_str(&number_cell(total));
    body.push_str("</row>");

    body.push_str("</sheetData></worksheet>");
    body
}

/// Render the workbook into zip bytes.
pub fn render(rows: &[ExportRow]) -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let parts: [(&str, String); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", WORKBOOK.to_string()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        ("xl/worksheets/sheet1.xml", sheet_xml(rows)),
    ];
    for (name, content) in parts {
        zip.start_file(name, opts)
            .map_err(|e| Error::Internal(format!("xlsx: {e}")))?;
        zip.write_all(content.as_bytes())
            .map_err(|e| Error::Internal(format!("xlsx: {e}")))?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| Error::Internal(format!("xlsx: {e}")))?;
    Ok(cursor.into_inner())
}
