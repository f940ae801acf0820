//! Format parsers
//!
//! Every parser turns a byte stream into a sequence of [`Row`]s. Parsers hold
//! no state between calls; structural problems surface as
//! [`Error::Format`](crate::Error::Format) and end the sequence.
//!
//! # Example
//!
//! ```rust,ignore
//! use reshape_core::parsers::{ParseOptions, parser_for};
//! use reshape_core::Format;
//!
//! let parser = parser_for(Format::Csv, &ParseOptions::default());
//! for row in parser.parse(Box::new(std::fs::File::open("people.csv")?))? {
//!     println!("{:?}", row?);
//! }
//! ```

mod delimited;
mod json;
mod spreadsheet;
mod xml;

pub use delimited::CsvParser;
pub use json::JsonParser;
pub use spreadsheet::ExcelParser;
pub use xml::XmlParser;

use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::error::Result;
use crate::format::{Format, detect};
use crate::value::Row;

/// Lazily produced rows
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

/// A format parser
pub trait Parser: Send + Sync {
    /// Format this parser reads
    fn format(&self) -> Format;

    /// Parse a byte stream into rows
    fn parse<'a>(&self, reader: Box<dyn Read + 'a>) -> Result<RowIter<'a>>;
}

/// Parser options that depend on the input rather than the format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Field delimiter for CSV input
    #[serde(default = "default_csv_delimiter")]
    pub csv_delimiter: char,

    /// Name of the repeating record element in XML input
    #[serde(default = "default_xml_record_element")]
    pub xml_record_element: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            csv_delimiter: default_csv_delimiter(),
            xml_record_element: default_xml_record_element(),
        }
    }
}

fn default_csv_delimiter() -> char {
    ','
}

fn default_xml_record_element() -> String {
    "record".to_string()
}

/// Construct the parser for a format
pub fn parser_for(format: Format, options: &ParseOptions) -> Box<dyn Parser> {
    match format {
        Format::Csv => Box::new(CsvParser::new(options.csv_delimiter)),
        Format::Json => Box::new(JsonParser),
        Format::Xml => Box::new(XmlParser::new(options.xml_record_element.clone())),
        Format::Excel => Box::new(ExcelParser),
    }
}

/// Detect the format of an in-memory payload and parse all of its rows
pub fn parse_bytes(bytes: &[u8], hint: Option<&str>, options: &ParseOptions) -> Result<Vec<Row>> {
    let format = detect(bytes, hint);
    tracing::debug!(%format, len = bytes.len(), "parsing payload");
    parser_for(format, options).parse(Box::new(bytes))?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_parse_bytes_detects_json() {
        let rows = parse_bytes(br#"[{"a": 1}, {"a": 2}]"#, None, &ParseOptions::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("a"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_parse_bytes_uses_hint() {
        let rows = parse_bytes(b"x\n{y}\n", Some("weird.csv"), &ParseOptions::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("x"), Some(&Value::from("{y}")));
    }

    #[test]
    fn test_parse_options_defaults_from_yaml() {
        let options: ParseOptions = serde_yaml::from_str("csv_delimiter: ';'").unwrap();
        assert_eq!(options.csv_delimiter, ';');
        assert_eq!(options.xml_record_element, "record");
    }

    #[test]
    fn test_parser_for_reports_format() {
        for format in Format::ALL {
            assert_eq!(parser_for(format, &ParseOptions::default()).format(), format);
        }
    }
}
