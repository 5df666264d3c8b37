// SPDX-License-Identifier: MIT OR Apache-2.0
//! Minimal tabular PDF writer.
//!
//! Emits a self-contained PDF 1.4 document: one font object, one content
//! stream per page, a correct xref table. Enough for a priced BoQ table;
//! anything fancier belongs to an external renderer.

const PAGE_WIDTH: f64 = 595.0; // A4 portrait, points
const PAGE_HEIGHT: f64 = 842.0;
const MARGIN: f64 = 50.0;
const LINE_HEIGHT: f64 = 14.0;

/// One text line placed at a fixed column layout.
pub struct PdfLine {
    /// Column texts, rendered left to right at [`col_x`] offsets.
    pub cells: Vec<String>,
    /// Render in the bold font.
    pub bold: bool,
}

/// Column x-offsets used by the BoQ table.
pub fn col_x() -> [f64; 7] {
    [
        MARGIN,
        MARGIN + 70.0,
        MARGIN + 260.0,
        MARGIN + 300.0,
        MARGIN + 350.0,
        MARGIN + 410.0,
        MARGIN + 470.0,
    ]
}

fn escape(text: &str) -> String {
    text.chars()
        .flat_map(|c| match c {
            '(' => vec!['\\', '('],
            ')' => vec!['\\', ')'],
            '\\' => vec!['\\', '\\'],
            c if c.is_ascii() => vec![c],
            // Non-ASCII falls back to '?' — the built-in fonts are
            // WinAnsi-limited.
            _ => vec!['?'],
        })
        .collect()
}

/// Render `lines` into PDF bytes, paginating as needed.
pub fn render(title: &str, lines: &[PdfLine]) -> Vec<u8> {
    let columns = col_x();
    let lines_per_page = ((PAGE_HEIGHT - 2.0 * MARGIN - 2.0 * LINE_HEIGHT) / LINE_HEIGHT) as usize;
    let pages: Vec<&[PdfLine]> = if lines.is_empty() {
        vec![&[]]
    } else {
        lines.chunks(lines_per_page).collect()
    };

    // Object layout: 1 catalog, 2 pages tree, 3 regular font, 4 bold font,
    // then (page, content) pairs.
    let mut objects: Vec<Vec<u8>> = Vec::new();
    let page_count = pages.len();
    let first_page_obj = 5;

    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    let kids: Vec<String> = (0..page_count)
        .map(|i| format!("{} 0 R", first_page_obj + i * 2))
        .collect();
    objects.push(
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_count
        )
        .into_bytes(),
    );
    objects.push(b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec());
    objects.push(b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold >>".to_vec());

    for (page_no, page_lines) in pages.iter().enumerate() {
        let content_obj = first_page_obj + page_no * 2 + 1;
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {content_obj} 0 R >>"
            )
            .into_bytes(),
        );

        let mut stream = String::new();
        let mut y = PAGE_HEIGHT - MARGIN;
        if page_no == 0 {
            stream.push_str(&format!(
                "BT /F2 13 Tf {MARGIN} {y} Td ({}) Tj ET\n",
                escape(title)
            ));
        }
        y -= 2.0 * LINE_HEIGHT;
        for line in *page_lines {
            let font = if line.bold { "F2" } else { "F1" };
            for (i, cell) in line.cells.iter().enumerate().take(columns.len()) {
                if cell.is_empty() {
                    continue;
                }
                stream.push_str(&format!(
                    "BT /{font} 9 Tf {} {y} Td ({}) Tj ET\n",
                    columns[i],
                    escape(cell)
                ));
            }
            y -= LINE_HEIGHT;
        }
        objects.push(
            format!("<< /Length {} >>\nstream\n{}endstream", stream.len(), stream).into_bytes(),
        );
    }

    // Assemble with a correct xref.
    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}
