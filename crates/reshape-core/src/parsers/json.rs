//! JSON parser
//!
//! Input must be a top-level array of objects. `null` and an empty document
//! both mean "no rows".

use std::io::Read;

use super::{Parser, RowIter};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::value::{Row, Value};

/// Reads a JSON array of flat objects
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn format(&self) -> Format {
        Format::Json
    }

    fn parse<'a>(&self, mut reader: Box<dyn Read + 'a>) -> Result<RowIter<'a>> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Box::new(std::iter::empty()));
        }

        let document: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| Error::format(Format::Json, e.to_string()))?;

        let elements = match document {
            serde_json::Value::Null => return Ok(Box::new(std::iter::empty())),
            serde_json::Value::Array(elements) => elements,
            other => {
                return Err(Error::format(
                    Format::Json,
                    format!("expected a top-level array, found {}", json_type(&other)),
                ));
            }
        };

        let mut objects = Vec::with_capacity(elements.len());
        for (index, element) in elements.into_iter().enumerate() {
            match element {
                serde_json::Value::Object(object) => objects.push(object),
                other => {
                    return Err(Error::format(
                        Format::Json,
                        format!("element {} is {}, not an object", index, json_type(&other)),
                    ));
                }
            }
        }

        Ok(Box::new(objects.into_iter().map(|object| {
            Ok(object
                .into_iter()
                .map(|(key, value)| (key, convert(value)))
                .collect::<Row>())
        })))
    }
}

fn convert(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map(Value::Decimal).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::String(s),
        nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
            Value::String(nested.to_string())
        }
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
