//! File formats and format sniffing
//!
//! Detection order matters and is fixed:
//!
//! 1. a recognized extension on the file name / URL hint
//! 2. the spreadsheet container's binary signatures
//! 3. the first bytes of the text (`{`/`[`, `<`, delimiter plus newline)
//! 4. CSV

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported data formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Comma (or other delimiter) separated values
    Csv,
    /// Array of flat JSON objects
    Json,
    /// Repeating record elements
    Xml,
    /// Spreadsheet workbook
    Excel,
}

/// Zip local file header; `.xlsx` workbooks are zip containers
const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];

/// OLE compound file header used by legacy `.xls` workbooks
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Upper bound on how much text is inspected when sniffing
const SNIFF_LIMIT: usize = 2048;

impl Format {
    /// All formats, in a stable order
    pub const ALL: [Format; 4] = [Format::Csv, Format::Json, Format::Xml, Format::Excel];

    /// Canonical file extension (without the dot)
    pub fn extension(self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Excel => "xlsx",
        }
    }

    /// Map a file extension (with or without the dot, any case) to a format
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Format::Csv),
            "json" => Some(Format::Json),
            "xml" => Some(Format::Xml),
            "xlsx" | "xls" => Some(Format::Excel),
            _ => None,
        }
    }

    /// Format implied by a file name or URL, ignoring any query or fragment
    pub fn from_hint(hint: &str) -> Option<Self> {
        let path = hint.split(['?', '#']).next().unwrap_or(hint);
        let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let (_, ext) = file_name.rsplit_once('.')?;
        Self::from_extension(ext)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Csv => "CSV",
            Format::Json => "JSON",
            Format::Xml => "XML",
            Format::Excel => "Excel",
        };
        f.write_str(name)
    }
}

/// Extension used for output artifacts of a format; `csv` when unknown
pub fn extension_for(format: Option<Format>) -> &'static str {
    format.map(Format::extension).unwrap_or("csv")
}

/// Decide which parser applies to `bytes`, optionally named by `hint`
pub fn detect(bytes: &[u8], hint: Option<&str>) -> Format {
    if let Some(format) = hint.and_then(Format::from_hint) {
        return format;
    }

    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(CFB_MAGIC) {
        return Format::Excel;
    }

    sniff_text(bytes).unwrap_or(Format::Csv)
}

fn sniff_text(bytes: &[u8]) -> Option<Format> {
    let prefix = &bytes[..bytes.len().min(SNIFF_LIMIT)];
    let prefix = prefix.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(prefix);
    let text = String::from_utf8_lossy(prefix);
    let text = text.trim_start();

    match text.chars().next()? {
        '{' | '[' => Some(Format::Json),
        '<' => Some(Format::Xml),
        _ if text.contains([',', ';', '\t']) && text.contains('\n') => Some(Format::Csv),
        _ => None,
    }
}
