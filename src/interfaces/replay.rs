use crate::error::{OrderError, Result};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

/// One message to publish: a subject and its payload. String payloads are
/// sent as raw text; any other JSON value is sent serialized.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReplayRecord {
    pub subject: String,
    pub payload: serde_json::Value,
}

impl ReplayRecord {
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        match &self.payload {
            serde_json::Value::String(text) => Ok(text.clone().into_bytes()),
            other => Ok(serde_json::to_vec(other)?),
        }
    }
}

/// Reads replay records from a JSON-lines source, skipping blank lines.
pub struct ReplayReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> ReplayReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Lazily parses one record per non-blank line. A malformed line yields
    /// an error naming its line number and does not stop the iteration.
    pub fn records(self) -> impl Iterator<Item = Result<ReplayRecord>> {
        self.reader
            .lines()
            .enumerate()
            .filter(|(_, line)| !matches!(line, Ok(l) if l.trim().is_empty()))
            .map(|(index, line)| {
                let line = line?;
                serde_json::from_str(&line).map_err(|e| {
                    OrderError::DecodeFailure(format!("line {}: {}", index + 1, e))
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = concat!(
            r#"{"subject":"orders.created","payload":{"id":"order-101","items":["a","b"],"status":""}}"#,
            "\n\n",
            r#"{"subject":"orders.created","payload":"order-3"}"#,
            "\n"
        );
        let records: Vec<Result<ReplayRecord>> = ReplayReader::new(data.as_bytes()).records().collect();

        assert_eq!(records.len(), 2);
        let first = records[0].as_ref().unwrap();
        assert_eq!(first.subject, "orders.created");
        let bytes = first.payload_bytes().unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded["id"], "order-101");

        let second = records[1].as_ref().unwrap();
        assert_eq!(second.payload_bytes().unwrap(), b"order-3");
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "not json\n{\"subject\":\"orders.process\",\"payload\":\"order-1\"}";
        let records: Vec<Result<ReplayRecord>> = ReplayReader::new(data.as_bytes()).records().collect();

        assert!(matches!(&records[0], Err(OrderError::DecodeFailure(m)) if m.starts_with("line 1")));
        assert!(records[1].is_ok());
    }
}
