//! Export to CSV, JSON and XLSX; import from CSV and JSON.
//!
//! CSV rows keep per-platform identifiers and counts as JSON objects in
//! single cells so an export can be imported back without loss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::models::Paper;
use crate::store::{Store, StoreError};

/// Version written into JSON exports
pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XLSX error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0} cannot be imported; use csv or json")]
    ImportUnsupported(ExportFormat),

    #[error("Unknown format '{0}': use csv, json or xlsx")]
    UnknownFormat(String),

    #[error("Row {row}: {message}")]
    InvalidRow { row: usize, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    /// `citations_YYYYMMDD.<ext>`
    pub fn default_file_name(&self, now: DateTime<Utc>) -> PathBuf {
        PathBuf::from(format!("citations_{}.{}", now.format("%Y%m%d"), self.extension()))
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Flat row shared by CSV and XLSX
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PaperRow {
    id: Option<i64>,
    title: String,
    doi: Option<String>,
    arxiv_id: Option<String>,
    year: Option<i32>,
    venue: Option<String>,
    authors: String,
    citations: u32,
    /// JSON object: platform -> platform id
    identifiers: String,
    /// JSON object: platform -> count
    platform_citations: String,
    first_seen: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

const HEADERS: [&str; 12] = [
    "id",
    "title",
    "doi",
    "arxiv_id",
    "year",
    "venue",
    "authors",
    "citations",
    "identifiers",
    "platform_citations",
    "first_seen",
    "last_updated",
];

impl PaperRow {
    fn from_paper(paper: &Paper) -> Result<Self, ExportError> {
        Ok(Self {
            id: paper.id,
            title: paper.title.clone(),
            doi: paper.doi.clone(),
            arxiv_id: paper.arxiv_id.clone(),
            year: paper.year,
            venue: paper.venue.clone(),
            authors: join_authors(&paper.authors)?,
            citations: paper.citation_count(),
            identifiers: serde_json::to_string(&paper.identifiers)?,
            platform_citations: serde_json::to_string(&paper.citations)?,
            first_seen: paper.first_seen,
            last_updated: paper.last_updated,
        })
    }

    fn into_paper(self, row: usize) -> Result<Paper, ExportError> {
        let invalid = |field: &str, e: serde_json::Error| ExportError::InvalidRow {
            row,
            message: format!("{}: {}", field, e),
        };

        let identifiers: BTreeMap<String, String> = parse_json_cell(&self.identifiers)
            .map_err(|e| invalid("identifiers", e))?;
        let citations: BTreeMap<String, u32> = parse_json_cell(&self.platform_citations)
            .map_err(|e| invalid("platform_citations", e))?;

        let authors = split_authors(&self.authors).map_err(|e| invalid("authors", e))?;

        if self.title.trim().is_empty() {
            return Err(ExportError::InvalidRow {
                row,
                message: "empty title".to_string(),
            });
        }

        Ok(Paper {
            id: None,
            title: self.title,
            doi: self.doi.filter(|s| !s.trim().is_empty()),
            arxiv_id: self.arxiv_id.filter(|s| !s.trim().is_empty()),
            year: self.year,
            venue: self.venue.filter(|s| !s.trim().is_empty()),
            authors,
            identifiers,
            citations,
            first_seen: self.first_seen,
            last_updated: self.last_updated,
        })
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.id.map(|v| Cell::Number(v as f64)).unwrap_or(Cell::Empty),
            Cell::text(&self.title),
            Cell::opt_text(&self.doi),
            Cell::opt_text(&self.arxiv_id),
            self.year.map(|v| Cell::Number(f64::from(v))).unwrap_or(Cell::Empty),
            Cell::opt_text(&self.venue),
            Cell::text(&self.authors),
            Cell::Number(f64::from(self.citations)),
            Cell::text(&self.identifiers),
            Cell::text(&self.platform_citations),
            Cell::text(&self.first_seen.to_rfc3339()),
            Cell::text(&self.last_updated.to_rfc3339()),
        ]
    }
}

/// `"A; B"` for readability; a JSON array when a name itself contains ';'
fn join_authors(authors: &[String]) -> Result<String, serde_json::Error> {
    if authors.iter().any(|a| a.contains(';')) {
        serde_json::to_string(authors)
    } else {
        Ok(authors.join("; "))
    }
}

fn split_authors(cell: &str) -> Result<Vec<String>, serde_json::Error> {
    let cell = cell.trim();
    if cell.starts_with('[') {
        return serde_json::from_str(cell);
    }
    Ok(cell
        .split(';')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_json_cell<T: serde::de::DeserializeOwned + Default>(cell: &str) -> Result<T, serde_json::Error> {
    if cell.trim().is_empty() {
        Ok(T::default())
    } else {
        serde_json::from_str(cell)
    }
}

/// JSON export document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub papers: Vec<Paper>,
}

/// Result of an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub papers_created: usize,
    pub papers_updated: usize,
    pub snapshots_appended: usize,
}

/// Write every stored paper to `path`; returns how many were written
pub fn export_store(
    store: &Store,
    format: ExportFormat,
    path: &Path,
    now: DateTime<Utc>,
) -> Result<usize, ExportError> {
    let papers = store.papers()?;
    let file = File::create(path)?;

    match format {
        ExportFormat::Csv => write_csv(&papers, BufWriter::new(file))?,
        ExportFormat::Json => write_json(&papers, BufWriter::new(file), now)?,
        ExportFormat::Xlsx => write_xlsx(&papers, file)?,
    }

    tracing::info!("Exported {} papers to {}", papers.len(), path.display());
    Ok(papers.len())
}

pub fn write_csv<W: Write>(papers: &[Paper], writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(writer);
    if papers.is_empty() {
        wtr.write_record(HEADERS)?;
    }
    for paper in papers {
        wtr.serialize(PaperRow::from_paper(paper)?)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(papers: &[Paper], mut writer: W, now: DateTime<Utc>) -> Result<(), ExportError> {
    let document = ExportDocument {
        version: EXPORT_VERSION,
        exported_at: now,
        papers: papers.to_vec(),
    };
    serde_json::to_writer_pretty(&mut writer, &document)?;
    writer.flush()?;
    Ok(())
}

pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Paper>, ExportError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let mut papers = Vec::new();
    for (i, row) in rdr.deserialize::<PaperRow>().enumerate() {
        // header is line 1
        papers.push(row?.into_paper(i + 2)?);
    }
    Ok(papers)
}

pub fn read_json<R: Read>(reader: R) -> Result<Vec<Paper>, ExportError> {
    let document: ExportDocument = serde_json::from_reader(reader)?;
    Ok(document.papers)
}

/// Read papers from `path` and upsert them into the store
pub fn import_file(
    store: &Store,
    format: ExportFormat,
    path: &Path,
    now: DateTime<Utc>,
) -> Result<ImportSummary, ExportError> {
    if format == ExportFormat::Xlsx {
        return Err(ExportError::ImportUnsupported(format));
    }

    let reader = BufReader::new(File::open(path)?);
    let papers = match format {
        ExportFormat::Json => read_json(reader)?,
        _ => read_csv(reader)?,
    };

    let mut summary = ImportSummary::default();
    for paper in &papers {
        let outcome = store.upsert_paper(paper, now)?;
        if outcome.created {
            summary.papers_created += 1;
        } else {
            summary.papers_updated += 1;
        }
        summary.snapshots_appended += outcome.snapshots_appended;
    }

    tracing::info!(
        "Imported {} papers from {} ({} new)",
        papers.len(),
        path.display(),
        summary.papers_created
    );
    Ok(summary)
}

// ---- XLSX ------------------------------------------------------------------

enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    fn text(s: &str) -> Self {
        Cell::Text(s.to_string())
    }

    fn opt_text(s: &Option<String>) -> Self {
        s.as_deref().map(Cell::text).unwrap_or(Cell::Empty)
    }
}

/// Minimal single-sheet workbook with inline strings
pub fn write_xlsx<W: Write + std::io::Seek>(papers: &[Paper], writer: W) -> Result<(), ExportError> {
    use zip::write::SimpleFileOptions;

    let mut zip = zip::ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut rows: Vec<Vec<Cell>> = vec![HEADERS.iter().map(|h| Cell::text(h)).collect()];
    for paper in papers {
        rows.push(PaperRow::from_paper(paper)?.cells());
    }

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", WORKBOOK.to_string()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        ("xl/worksheets/sheet1.xml", sheet_xml(&rows)),
    ];
    for (name, body) in parts {
        zip.start_file(name, options)?;
        zip.write_all(body.as_bytes())?;
    }
    zip.finish()?;
    Ok(())
}

fn sheet_xml(rows: &[Vec<Cell>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );

    for (r, row) in rows.iter().enumerate() {
        let row_num = r + 1;
        xml.push_str(&format!(r#"<row r="{}">"#, row_num));
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{}", column_name(c), row_num);
            match cell {
                Cell::Empty => {}
                Cell::Number(n) => {
                    xml.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, n));
                }
                Cell::Text(s) => {
                    xml.push_str(&format!(
                        r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                        reference,
                        escape_xml(s)
                    ));
                }
            }
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Spreadsheet column letters: 0 -> A, 25 -> Z, 26 -> AA
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters other than tab/newline are invalid in XML 1.0
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Citations" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn sample() -> Paper {
        let mut paper = Paper::new("Deep Learning, \"Revisited\"", now());
        paper.id = Some(3);
        paper.doi = Some("10.1/x".into());
        paper.year = Some(2021);
        paper.authors = vec!["Ada Lovelace".into(), "Charles Babbage".into()];
        paper.identifiers.insert("semantic_scholar".into(), "abc;def".into());
        paper.identifiers.insert("orcid".into(), "put-7".into());
        paper.citations.insert("semantic_scholar".into(), 5);
        paper
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("xlsx".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert!("pdf".parse::<ExportFormat>().is_err());
        assert_eq!(
            ExportFormat::Json.default_file_name(now()),
            PathBuf::from("citations_20240601.json")
        );
    }

    #[test]
    fn test_csv_preserves_identifiers_and_counts() {
        let mut buf = Vec::new();
        write_csv(&[sample()], &mut buf).unwrap();

        let papers = read_csv(Cursor::new(buf)).unwrap();
        assert_eq!(papers.len(), 1);
        let paper = &papers[0];
        assert_eq!(paper.id, None);
        assert_eq!(paper.title, sample().title);
        assert_eq!(paper.identifiers, sample().identifiers);
        assert_eq!(paper.citations, sample().citations);
        assert_eq!(paper.authors, sample().authors);
        assert_eq!(paper.arxiv_id, None);
    }

    #[test]
    fn test_csv_author_with_semicolon() {
        let mut paper = sample();
        paper.authors = vec!["Team Alpha; Beta Lab".into(), "Ada Lovelace".into()];

        let mut buf = Vec::new();
        write_csv(&[paper.clone()], &mut buf).unwrap();
        let papers = read_csv(Cursor::new(buf)).unwrap();
        assert_eq!(papers[0].authors, paper.authors);

        assert_eq!(join_authors(&sample().authors).unwrap(), "Ada Lovelace; Charles Babbage");
    }

    #[test]
    fn test_csv_bad_cell_reports_row() {
        let mut buf = Vec::new();
        write_csv(&[sample()], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap().replace(r#"{""semantic_scholar"":5}"#, "oops");

        let err = read_csv(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, ExportError::InvalidRow { row: 2, .. }), "{err}");
    }

    #[test]
    fn test_empty_csv_has_header() {
        let mut buf = Vec::new();
        write_csv(&[], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("id,title,doi"));
        assert!(read_csv(Cursor::new(text)).unwrap().is_empty());
    }

    #[test]
    fn test_json_document() {
        let mut buf = Vec::new();
        write_json(&[sample()], &mut buf, now()).unwrap();
        let papers = read_json(Cursor::new(buf)).unwrap();
        assert_eq!(papers, vec![sample()]);
    }

    #[test]
    fn test_xlsx_package() {
        let mut buf = Cursor::new(Vec::new());
        write_xlsx(&[sample()], &mut buf).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(buf.into_inner())).unwrap();
        let mut sheet = String::new();
        archive
            .by_name("xl/worksheets/sheet1.xml")
            .unwrap()
            .read_to_string(&mut sheet)
            .unwrap();
        assert!(sheet.contains("Deep Learning, &quot;Revisited&quot;"));
        assert!(sheet.contains(r#"<c r="H2"><v>5</v></c>"#));
        assert!(archive.by_name("[Content_Types].xml").is_ok());
    }

    #[test]
    fn test_column_name() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(column_name(701), "ZZ");
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = Store::open_in_memory().unwrap();
        let mut no_doi = Paper::new("Preprint", now());
        no_doi.arxiv_id = Some("2301.00001".into());
        no_doi.identifiers.insert("arxiv".into(), "2301.00001".into());
        source.upsert_paper(&sample(), now()).unwrap();
        source.upsert_paper(&no_doi, now()).unwrap();

        for format in [ExportFormat::Csv, ExportFormat::Json] {
            let path = dir.path().join(format.default_file_name(now()));
            assert_eq!(export_store(&source, format, &path, now()).unwrap(), 2);

            let target = Store::open_in_memory().unwrap();
            let summary = import_file(&target, format, &path, now()).unwrap();
            assert_eq!(summary.papers_created, 2);

            let strip = |papers: Vec<Paper>| -> Vec<_> {
                papers
                    .into_iter()
                    .map(|p| (p.doi, p.arxiv_id, p.identifiers, p.citations))
                    .collect()
            };
            assert_eq!(strip(target.papers().unwrap()), strip(source.papers().unwrap()));

            // Importing the same file again changes nothing
            let again = import_file(&target, format, &path, now()).unwrap();
            assert_eq!(again.papers_created, 0);
            assert_eq!(again.snapshots_appended, 0);
        }
    }

    #[test]
    fn test_xlsx_import_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let err = import_file(&store, ExportFormat::Xlsx, Path::new("x.xlsx"), now()).unwrap_err();
        assert!(matches!(err, ExportError::ImportUnsupported(ExportFormat::Xlsx)));
    }
}
