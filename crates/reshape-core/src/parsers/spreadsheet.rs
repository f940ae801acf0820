//! Spreadsheet parser for Office Open XML workbooks (`.xlsx`)
//!
//! The workbook is a zip container. Only the first sheet is read: its first
//! used row is the header, and every later used row becomes a [`Row`].

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;
use zip::result::ZipError;

use super::{Parser, RowIter};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::value::{Row, Value};

const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
/// Column count of an OOXML sheet (`A` through `XFD`)
const MAX_COLUMNS: usize = 16_384;
const DEFAULT_SHEET: &str = "xl/worksheets/sheet1.xml";

/// Reads the first sheet of a workbook
#[derive(Debug, Clone, Copy, Default)]
pub struct ExcelParser;

impl Parser for ExcelParser {
    fn format(&self) -> Format {
        Format::Excel
    }

    fn parse<'a>(&self, mut reader: Box<dyn Read + 'a>) -> Result<RowIter<'a>> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }

        let rows = read_workbook(bytes)?;
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

fn read_workbook(bytes: Vec<u8>) -> Result<Vec<Row>> {
    if bytes.starts_with(CFB_MAGIC) {
        return Err(Error::format(
            Format::Excel,
            "legacy binary .xls workbooks are not supported; save the file as .xlsx",
        ));
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        Error::format(Format::Excel, format!("not a valid spreadsheet container: {}", e))
    })?;

    let shared_strings = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheet_path = first_sheet_path(&mut archive)?;
    let sheet = read_entry(&mut archive, &sheet_path)?.ok_or_else(|| {
        Error::format(Format::Excel, format!("workbook has no sheet at {}", sheet_path))
    })?;

    let used: Vec<Vec<(usize, Value)>> = parse_sheet(&sheet, &shared_strings)?
        .into_iter()
        .filter(|cells| cells.iter().any(|(_, value)| is_used(value)))
        .collect();

    let mut used = used.into_iter();
    let Some(header_cells) = used.next() else {
        return Ok(Vec::new());
    };

    let header: BTreeMap<usize, String> = header_cells
        .into_iter()
        .map(|(col, value)| (col, value.to_string().trim().to_string()))
        .filter(|(_, name)| !name.is_empty())
        .collect();

    let rows = used
        .map(|cells| {
            let mut by_col: BTreeMap<usize, Value> = cells.into_iter().collect();
            header
                .iter()
                .filter_map(|(col, name)| by_col.remove(col).map(|value| (name.clone(), value)))
                .collect::<Row>()
        })
        .collect();
    Ok(rows)
}

fn is_used(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(Error::format(
                Format::Excel,
                format!("cannot read {}: {}", name, e),
            ));
        }
    };
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| Error::format(Format::Excel, format!("cannot read {}: {}", name, e)))?;
    Ok(Some(contents))
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> Error {
    Error::format(Format::Excel, format!("malformed {}: {}", part, e))
}

fn attribute(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Resolve the archive path of the first sheet listed in the workbook
fn first_sheet_path(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> Result<String> {
    let Some(workbook) = read_entry(archive, "xl/workbook.xml")? else {
        return Ok(DEFAULT_SHEET.to_string());
    };

    let mut reader = Reader::from_str(&workbook);
    let mut relationship = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                relationship = attribute(&e, b"id");
                break;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_error("workbook", e)),
        }
    }

    let Some(relationship) = relationship else {
        return Ok(DEFAULT_SHEET.to_string());
    };
    let Some(rels) = read_entry(archive, "xl/_rels/workbook.xml.rels")? else {
        return Ok(DEFAULT_SHEET.to_string());
    };

    let mut reader = Reader::from_str(&rels);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship"
                    && attribute(&e, b"Id").as_deref() == Some(relationship.as_str()) =>
            {
                let target = attribute(&e, b"Target").unwrap_or_default();
                return Ok(match target.strip_prefix('/') {
                    Some(absolute) => absolute.to_string(),
                    None => format!("xl/{}", target),
                });
            }
            Ok(Event::Eof) => return Ok(DEFAULT_SHEET.to_string()),
            Ok(_) => {}
            Err(e) => return Err(xml_error("workbook relationships", e)),
        }
    }
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(t)) if in_text && !in_phonetic => {
                let text = t.unescape().map_err(|e| xml_error("shared strings", e))?;
                if let Some(current) = current.as_mut() {
                    current.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_error("shared strings", e)),
        }
    }
    Ok(strings)
}

/// Zero-based column index from a cell reference such as `B7` or `AA12`
///
/// References past column `XFD` are a format error.
fn column_index(reference: &str) -> Result<Option<usize>> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return Ok(None);
    }
    let number = letters
        .iter()
        .try_fold(0usize, |acc, b| {
            acc.checked_mul(26)?.checked_add(usize::from(b - b'A' + 1))
        })
        .filter(|n| *n <= MAX_COLUMNS)
        .ok_or_else(|| {
            Error::format(
                Format::Excel,
                format!("cell reference {} is beyond the last column", reference),
            )
        })?;
    Ok(Some(number - 1))
}

/// Column of a `<c>` element, or `fallback` when it carries no reference
fn cell_column(e: &BytesStart<'_>, fallback: usize) -> Result<usize> {
    match attribute(e, b"r") {
        Some(r) => Ok(column_index(&r)?.unwrap_or(fallback)),
        None => Ok(fallback),
    }
}

#[derive(Default)]
struct Cell {
    column: usize,
    cell_type: Option<String>,
    raw: Option<String>,
}

impl Cell {
    fn value(self, shared_strings: &[String]) -> Result<Option<Value>> {
        let Some(raw) = self.raw else {
            return Ok(None);
        };
        let value = match self.cell_type.as_deref() {
            Some("s") => {
                let index: usize = raw.trim().parse().map_err(|_| {
                    Error::format(Format::Excel, format!("bad shared string index '{}'", raw))
                })?;
                let text = shared_strings.get(index).ok_or_else(|| {
                    Error::format(
                        Format::Excel,
                        format!("shared string {} is out of range", index),
                    )
                })?;
                Value::String(text.clone())
            }
            Some("b") => Value::Boolean(raw.trim() == "1"),
            Some("str") | Some("inlineStr") | Some("e") | Some("d") => Value::String(raw),
            _ => number_value(raw),
        };
        Ok(Some(value))
    }
}

fn number_value(raw: String) -> Value {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Integer(i);
    }
    match trimmed.parse::<f64>() {
        Ok(d) if d.fract() == 0.0 && d.abs() < 9.0e15 => Value::Integer(d as i64),
        Ok(d) => Value::Decimal(d),
        Err(_) => Value::String(raw),
    }
}

/// Cells of every `<row>` in the sheet, as `(column, value)` pairs
fn parse_sheet(xml: &str, shared_strings: &[String]) -> Result<Vec<Vec<(usize, Value)>>> {
    let mut reader = Reader::from_str(xml);
    let mut rows = Vec::new();
    let mut cells: Vec<(usize, Value)> = Vec::new();
    let mut cell: Option<Cell> = None;
    let mut capture = false;
    let mut next_column = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    cells = Vec::new();
                    next_column = 0;
                }
                b"c" => {
                    let column = cell_column(&e, next_column)?;
                    cell = Some(Cell {
                        column,
                        cell_type: attribute(&e, b"t"),
                        raw: None,
                    });
                }
                b"v" | b"t" => capture = cell.is_some(),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"c" => {
                next_column = cell_column(&e, next_column)? + 1;
            }
            Ok(Event::Text(t)) if capture => {
                let text = t.unescape().map_err(|e| xml_error("worksheet", e))?;
                if let Some(cell) = cell.as_mut() {
                    cell.raw.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    if let Some(done) = cell.take() {
                        let column = done.column;
                        next_column = column + 1;
                        if let Some(value) = done.value(shared_strings)? {
                            cells.push((column, value));
                        }
                    }
                }
                b"row" => rows.push(std::mem::take(&mut cells)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_error("worksheet", e)),
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Build a minimal single-sheet workbook from rows of inline cell XML
    fn workbook(shared: &[&str], rows: &[&str]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("xl/workbook.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Data" sheetId="1" r:id="rId7"/></sheets></workbook>"#,
        )
        .unwrap();

        zip.start_file("xl/_rels/workbook.xml.rels", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId7" Type="worksheet" Target="worksheets/data.xml"/></Relationships>"#,
        )
        .unwrap();

        let strings: String = shared
            .iter()
            .map(|s| format!("<si><t>{}</t></si>", s))
            .collect();
        zip.start_file("xl/sharedStrings.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(format!("<sst>{}</sst>", strings).as_bytes())
            .unwrap();

        let body: String = rows
            .iter()
            .enumerate()
            .map(|(i, cells)| format!(r#"<row r="{}">{}</row>"#, i + 1, cells))
            .collect();
        zip.start_file("xl/worksheets/data.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(format!("<worksheet><sheetData>{}</sheetData></worksheet>", body).as_bytes())
            .unwrap();

        zip.finish().unwrap().into_inner()
    }

    fn parse(bytes: Vec<u8>) -> Result<Vec<Row>> {
        ExcelParser.parse(Box::new(Cursor::new(bytes)))?.collect()
    }

    #[test]
    fn test_header_and_typed_cells() {
        let bytes = workbook(
            &["Name", "Age", "Alice", "Bob"],
            &[
                r#"<c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c>"#,
                r#"<c r="A2" t="s"><v>2</v></c><c r="B2"><v>30</v></c><c r="C2" t="b"><v>1</v></c>"#,
                r#"<c r="A3" t="s"><v>3</v></c><c r="B3"><v>25.5</v></c>"#,
            ],
        );
        let rows = parse(bytes).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Name"), Some(&Value::from("Alice")));
        assert_eq!(rows[0].get("Age"), Some(&Value::Integer(30)));
        assert!(!rows[0].contains_key("C"), "cells without a header are dropped");
        assert_eq!(rows[1].get("Age"), Some(&Value::Decimal(25.5)));
    }

    #[test]
    fn test_blank_rows_are_not_used() {
        let bytes = workbook(
            &["id"],
            &[
                r#"<c r="A1"><v></v></c>"#,
                r#"<c r="A2" t="s"><v>0</v></c>"#,
                r#"<c r="A3" t="inlineStr"><is><t>x-1</t></is></c>"#,
            ],
        );
        let rows = parse(bytes).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::from("x-1")));
    }

    #[test]
    fn test_fewer_than_two_used_rows_is_empty() {
        let bytes = workbook(&["only"], &[r#"<c r="A1" t="s"><v>0</v></c>"#]);
        assert!(parse(bytes).unwrap().is_empty());
        assert!(parse(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_not_a_container_is_format_error() {
        let err = parse(b"PK\x03\x04 truncated".to_vec()).unwrap_err();
        assert!(err.is_format_error());
        assert!(err.to_string().contains("spreadsheet container"));
    }

    #[test]
    fn test_legacy_workbook_is_format_error() {
        let mut bytes = CFB_MAGIC.to_vec();
        bytes.extend_from_slice(&[0; 64]);
        let err = parse(bytes).unwrap_err();
        assert!(err.to_string().contains(".xls"));
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A1").unwrap(), Some(0));
        assert_eq!(column_index("z9").unwrap(), Some(25));
        assert_eq!(column_index("AA12").unwrap(), Some(26));
        assert_eq!(column_index("XFD1").unwrap(), Some(16_383));
        assert_eq!(column_index("12").unwrap(), None);
    }

    #[test]
    fn test_oversized_cell_reference_is_format_error() {
        assert!(column_index("XFE1").unwrap_err().is_format_error());
        assert!(column_index("ZZZZZZZZZZZZZZZZ1").unwrap_err().is_format_error());

        let bytes = workbook(
            &["id"],
            &[
                r#"<c r="A1" t="s"><v>0</v></c>"#,
                r#"<c r="ZZZZZZZZZZZZZZZZ2"><v>1</v></c>"#,
            ],
        );
        let err = parse(bytes).unwrap_err();
        assert!(err.is_format_error());
        assert!(err.to_string().contains("ZZZZZZZZZZZZZZZZ2"));
    }
}
