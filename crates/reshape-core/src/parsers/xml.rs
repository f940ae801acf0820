//! XML parser
//!
//! Records are elements with a configured name, found at any depth. Each
//! immediate child element of a record becomes one field whose value is the
//! child's text content.

use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{BufRead, BufReader, Read};

use super::{Parser, RowIter};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::value::{Row, Value};

/// Reads repeating record elements
#[derive(Debug, Clone)]
pub struct XmlParser {
    record_element: String,
}

impl XmlParser {
    /// Create a parser for records named `record_element`
    pub fn new(record_element: impl Into<String>) -> Self {
        Self {
            record_element: record_element.into(),
        }
    }
}

impl Parser for XmlParser {
    fn format(&self) -> Format {
        Format::Xml
    }

    fn parse<'a>(&self, reader: Box<dyn Read + 'a>) -> Result<RowIter<'a>> {
        let mut reader = Reader::from_reader(BufReader::new(reader));
        reader.config_mut().trim_text(true);

        Ok(Box::new(XmlRows {
            reader,
            buf: Vec::new(),
            record_element: self.record_element.as_bytes().to_vec(),
            depth: 0,
            done: false,
        }))
    }
}

struct XmlRows<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    record_element: Vec<u8>,
    depth: usize,
    done: bool,
}

enum Step {
    Record,
    EmptyRecord,
    Enter,
    Leave,
    Eof,
    Skip,
}

fn error_at<R>(reader: &Reader<R>, message: impl std::fmt::Display) -> Error {
    Error::format(
        Format::Xml,
        format!("{} (at byte {})", message, reader.buffer_position()),
    )
}

impl<R: BufRead> XmlRows<R> {
    /// Read the children of a record whose start tag was just consumed
    fn read_record(&mut self) -> Result<Row> {
        let mut row = Row::new();
        let mut level = 0usize;
        let mut field: Option<(String, String)> = None;

        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => return Err(error_at(&self.reader, e)),
            };

            match event {
                Event::Start(e) => {
                    if level == 0 {
                        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                        field = Some((name, String::new()));
                    }
                    level += 1;
                }
                Event::Empty(e) => {
                    if level == 0 {
                        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                        row.insert(name, Value::String(String::new()));
                    }
                }
                Event::Text(t) => {
                    if let Some((_, text)) = field.as_mut() {
                        match t.unescape() {
                            Ok(unescaped) => text.push_str(&unescaped),
                            Err(e) => return Err(error_at(&self.reader, e)),
                        }
                    }
                }
                Event::CData(c) => {
                    if let Some((_, text)) = field.as_mut() {
                        text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::End(_) => {
                    if level == 0 {
                        return Ok(row);
                    }
                    level -= 1;
                    if level == 0 {
                        if let Some((name, text)) = field.take() {
                            row.insert(name, Value::String(text));
                        }
                    }
                }
                Event::Eof => {
                    return Err(error_at(&self.reader, "document ended inside a record"));
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for XmlRows<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) if e.local_name().as_ref() == self.record_element => {
                    Step::Record
                }
                Ok(Event::Empty(e)) if e.local_name().as_ref() == self.record_element => {
                    Step::EmptyRecord
                }
                Ok(Event::Start(_)) => Step::Enter,
                Ok(Event::End(_)) => Step::Leave,
                Ok(Event::Eof) => Step::Eof,
                Ok(_) => Step::Skip,
                Err(e) => {
                    self.done = true;
                    return Some(Err(error_at(&self.reader, e)));
                }
            };

            match step {
                Step::Record => {
                    let record = self.read_record();
                    self.done = record.is_err();
                    return Some(record);
                }
                Step::EmptyRecord => return Some(Ok(Row::new())),
                Step::Enter => self.depth += 1,
                Step::Leave => self.depth = self.depth.saturating_sub(1),
                Step::Eof => {
                    self.done = true;
                    if self.depth > 0 {
                        return Some(Err(error_at(
                            &self.reader,
                            "unclosed element at end of document",
                        )));
                    }
                    return None;
                }
                Step::Skip => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(record: &str, input: &str) -> Result<Vec<Row>> {
        XmlParser::new(record)
            .parse(Box::new(input.as_bytes()))?
            .collect()
    }

    const PEOPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<export>
  <meta><generated>2024-01-05</generated></meta>
  <people>
    <person id="1">
      <name>Alice</name>
      <age>30</age>
    </person>
    <person id="2">
      <name>Bob &amp; Co</name>
      <age>25</age>
      <notes><![CDATA[likes <tags>]]></notes>
    </person>
  </people>
</export>"#;

    #[test]
    fn test_records_at_any_depth() {
        let rows = parse("person", PEOPLE).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&Value::from("Alice")));
        assert_eq!(rows[0].get("age"), Some(&Value::from("30")));
        assert_eq!(rows[1].get("name"), Some(&Value::from("Bob & Co")));
        assert_eq!(rows[1].get("notes"), Some(&Value::from("likes <tags>")));
    }

    #[test]
    fn test_no_matching_records_is_empty() {
        assert!(parse("order", PEOPLE).unwrap().is_empty());
    }

    #[test]
    fn test_empty_document_is_empty() {
        assert!(parse("record", "").unwrap().is_empty());
    }

    #[test]
    fn test_child_text_includes_descendants() {
        let rows = parse(
            "record",
            "<rows><record><address><city>Oslo</city></address><zip/></record></rows>",
        )
        .unwrap();
        assert_eq!(rows[0].get("address"), Some(&Value::from("Oslo")));
        assert_eq!(rows[0].get("zip"), Some(&Value::from("")));
    }

    #[test]
    fn test_mismatched_tags_are_format_error() {
        let err = parse("record", "<rows><record><a>1</b></record></rows>").unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_truncated_document_is_format_error() {
        let err = parse("record", "<rows><record><a>1</a>").unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_namespaced_records_match_local_name() {
        let rows = parse(
            "item",
            r#"<feed xmlns:d="urn:x"><d:item><d:sku>A-1</d:sku></d:item></feed>"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("sku"), Some(&Value::from("A-1")));
    }
}
