//! CSV parser

use std::io::Read;

use super::{Parser, RowIter};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::value::{Row, Value};

/// Reads delimited text; the first non-blank line is the header
#[derive(Debug, Clone)]
pub struct CsvParser {
    delimiter: u8,
}

impl CsvParser {
    /// Create a parser for the given delimiter. Non-ASCII delimiters fall back to `,`.
    pub fn new(delimiter: char) -> Self {
        let delimiter = u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .unwrap_or(b',');
        Self { delimiter }
    }
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new(',')
    }
}

impl Parser for CsvParser {
    fn format(&self) -> Format {
        Format::Csv
    }

    fn parse<'a>(&self, reader: Box<dyn Read + 'a>) -> Result<RowIter<'a>> {
        let records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(reader)
            .into_records();

        Ok(Box::new(CsvRows {
            records,
            header: None,
            failed: false,
        }))
    }
}

struct CsvRows<R> {
    records: csv::StringRecordsIntoIter<R>,
    header: Option<Vec<String>>,
    failed: bool,
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(Error::format(Format::Csv, e.to_string())));
                }
            };

            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }

            let Some(header) = self.header.as_ref() else {
                self.header = Some(
                    record
                        .iter()
                        .map(|name| name.trim_start_matches('\u{feff}').trim().to_string())
                        .collect(),
                );
                continue;
            };

            if record.len() > header.len() {
                self.failed = true;
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                return Some(Err(Error::format(
                    Format::Csv,
                    format!(
                        "line {} has {} fields but the header has {}",
                        line,
                        record.len(),
                        header.len()
                    ),
                )));
            }

            let row = header
                .iter()
                .zip(record.iter())
                .map(|(name, value)| (name.clone(), Value::String(value.to_string())))
                .collect();
            return Some(Ok(row));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Vec<Row>> {
        CsvParser::default()
            .parse(Box::new(input.as_bytes()))?
            .collect()
    }

    #[test]
    fn test_header_and_rows() {
        let rows = parse("Name,Age\nAlice,30\nBob,25\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Name"), Some(&Value::from("Alice")));
        assert_eq!(rows[0].get("Age"), Some(&Value::from("30")));
        assert_eq!(rows[1].get("Name"), Some(&Value::from("Bob")));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let rows = parse("\n\nName,Age\n\nAlice,30\n   \nBob,25\n\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("Age"), Some(&Value::from("25")));
    }

    #[test]
    fn test_empty_input_yields_no_rows() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("Name,Age\n").unwrap().is_empty());
    }

    #[test]
    fn test_values_stay_raw_strings() {
        let rows = parse("flag,when\ntrue,2024-01-05\n").unwrap();
        assert_eq!(rows[0].get("flag"), Some(&Value::from("true")));
        assert_eq!(rows[0].get("when"), Some(&Value::from("2024-01-05")));
    }

    #[test]
    fn test_quoted_fields() {
        let rows = parse("name,notes\n\"Smith, J\",\"said \"\"hi\"\"\"\n").unwrap();
        assert_eq!(rows[0].get("name"), Some(&Value::from("Smith, J")));
        assert_eq!(rows[0].get("notes"), Some(&Value::from("said \"hi\"")));
    }

    #[test]
    fn test_short_row_omits_trailing_fields() {
        let rows = parse("a,b,c\n1,2\n").unwrap();
        assert_eq!(rows[0].len(), 2);
        assert!(!rows[0].contains_key("c"));
    }

    #[test]
    fn test_wide_row_is_format_error() {
        let err = parse("a,b\n1,2,3\n").unwrap_err();
        assert!(err.is_format_error());
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_error_ends_sequence() {
        let mut rows = CsvParser::default()
            .parse(Box::new("a\n1,2\n3\n".as_bytes()))
            .unwrap();
        assert!(rows.next().unwrap().is_err());
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_semicolon_delimiter() {
        let rows: Vec<Row> = CsvParser::new(';')
            .parse(Box::new("a;b\n1;2\n".as_bytes()))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows[0].get("b"), Some(&Value::from("2")));
    }

    #[test]
    fn test_byte_order_mark_is_not_part_of_header() {
        let rows = parse("\u{feff}id,name\n1,x\n").unwrap();
        assert!(rows[0].contains_key("id"));
    }
}
