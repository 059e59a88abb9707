//! Streaming source reader
//!
//! Hybrid reading strategy for the SAT extract files: raw byte lines are
//! buffered natively, decoded with a permissive cp1252 strategy, and handed
//! to the row parser as sanitized memory chunks. The goal is continuity of
//! the stream even in the presence of corrupt bytes or mixed encodings that
//! would stop a standard CSV reader.
//!
//! All fields surface as raw text; type inference is deferred so that corrupt
//! numeric and date strings can still be repaired as text first.

use encoding_rs::WINDOWS_1252;
use satetl_common::{Batch, Result, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Field separator used by every annex variant
const FIELD_SEPARATOR: u8 = b'|';

/// Forward-only batched reader over one annex extract file.
///
/// Owns the file handle for its lifetime and releases it exactly once when
/// the stream is exhausted. Never seeks backward.
pub struct StreamReader {
    source: Option<BufReader<File>>,
    /// Decoded header line, re-attached to every chunk so the row parser can
    /// reconstruct column identity per batch
    header: String,
    batch_size: usize,
}

impl StreamReader {
    /// Open a source file and capture its header line.
    ///
    /// Undecodable byte sequences are substituted with the Unicode
    /// replacement character rather than raising; the repair stage deals
    /// with the artifacts downstream.
    pub fn open(path: impl AsRef<Path>, batch_size: usize) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut source = BufReader::new(file);

        let mut raw_header = Vec::new();
        source.read_until(b'\n', &mut raw_header)?;
        let header = decode_permissive(&raw_header).trim_end_matches(['\r', '\n']).to_string();

        debug!(path = %path.as_ref().display(), batch_size, "opened source stream");

        Ok(StreamReader {
            source: Some(source),
            header,
            batch_size,
        })
    }

    /// Read the next batch of raw-text rows.
    ///
    /// Returns `Ok(None)` as the end-of-stream sentinel once no lines remain;
    /// the underlying handle is closed at that point and every later call
    /// returns the sentinel again without touching the file.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };

        let mut raw_lines = Vec::new();
        let mut lines_read = 0usize;
        while lines_read < self.batch_size {
            let start = raw_lines.len();
            let n = source.read_until(b'\n', &mut raw_lines)?;
            if n == 0 {
                raw_lines.truncate(start);
                break;
            }
            lines_read += 1;
        }

        if lines_read == 0 {
            // Exhausted: drop the handle exactly once.
            self.source = None;
            return Ok(None);
        }

        // Re-attach the preserved header so column identity survives batching.
        let mut chunk = String::with_capacity(self.header.len() + raw_lines.len() + 1);
        chunk.push_str(&self.header);
        chunk.push('\n');
        chunk.push_str(&decode_permissive(&raw_lines));

        // Idempotent double-safety net: force the buffer through a lossy
        // round trip so the row parser can never see an invalid sequence.
        let chunk = String::from_utf8_lossy(chunk.as_bytes()).into_owned();

        Ok(Some(parse_chunk(&chunk)))
    }
}

/// Decode a cp1252 byte buffer, substituting anything undecodable.
fn decode_permissive(bytes: &[u8]) -> String {
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    text.into_owned()
}

/// Parse one sanitized chunk (header line + data lines) into a raw batch.
///
/// Tolerant policy: records longer than the header are truncated to fit,
/// records shorter than the header or failing to parse are dropped from the
/// batch silently. This is accepted forward-progress behavior, not a bug:
/// the files are known to contain ragged lines and the pipeline trades that
/// loss for never aborting a batch.
fn parse_chunk(chunk: &str) -> Batch {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(FIELD_SEPARATOR)
        .has_headers(true)
        .flexible(true)
        .from_reader(chunk.as_bytes());

    let columns: Vec<String> = match reader.headers() {
        Ok(headers) => headers.iter().map(|h| h.trim().to_string()).collect(),
        Err(_) => Vec::new(),
    };
    let width = columns.len();
    let mut batch = Batch::new(columns);
    if width == 0 {
        return batch;
    }

    let mut dropped = 0usize;
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(_) => {
                dropped += 1;
                continue;
            }
        };
        if record.len() < width {
            dropped += 1;
            continue;
        }
        let row: Vec<Value> = record
            .iter()
            .take(width)
            .map(Value::from_raw_field)
            .collect();
        batch.rows.push(row);
    }

    if dropped > 0 {
        debug!(dropped, rows = batch.len(), "dropped unparseable rows from batch");
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn source_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn batches_share_the_header_columns() {
        let file = source_file(b"UUID|NOMBRE|TOTAL\na|x|1\nb|y|2\nc|z|3\n");
        let mut reader = StreamReader::open(file.path(), 2).unwrap();

        let first = reader.next_batch().unwrap().unwrap();
        assert_eq!(first.columns, vec!["UUID", "NOMBRE", "TOTAL"]);
        assert_eq!(first.len(), 2);

        let second = reader.next_batch().unwrap().unwrap();
        assert_eq!(second.columns, vec!["UUID", "NOMBRE", "TOTAL"]);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn final_partial_batch_then_sentinel_exactly_once() {
        let file = source_file(b"UUID|NOMBRE\na|x\nb|y\nc|z\n");
        let mut reader = StreamReader::open(file.path(), 2).unwrap();

        assert_eq!(reader.next_batch().unwrap().unwrap().len(), 2);
        let partial = reader.next_batch().unwrap().unwrap();
        assert_eq!(partial.len(), 1);
        assert!(!partial.is_empty());

        assert!(reader.next_batch().unwrap().is_none());
        // Sentinel is stable afterward; the handle is already gone.
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn ragged_long_lines_truncate_and_short_lines_drop() {
        let file = source_file(b"UUID|NOMBRE|TOTAL\na|x|1|EXTRA|JUNK\nb|only-one-field\nc|z|3\n");
        let mut reader = StreamReader::open(file.path(), 10).unwrap();

        let batch = reader.next_batch().unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.value_at(0, "TOTAL"), Some(&Value::Text("1".into())));
        assert_eq!(batch.value_at(1, "UUID"), Some(&Value::Text("c".into())));
    }

    #[test]
    fn corrupt_bytes_survive_as_text_for_repair() {
        // 0xC3 0xB1 is UTF-8 for n-tilde mis-written into a cp1252 file; the
        // permissive decode must surface it as mojibake text, not an error.
        let file = source_file(b"UUID|NOMBRE\na|GARC\xC3\xB1A\n");
        let mut reader = StreamReader::open(file.path(), 10).unwrap();

        let batch = reader.next_batch().unwrap().unwrap();
        let name = batch.value_at(0, "NOMBRE").unwrap().as_text().unwrap();
        assert!(name.contains("Ã±"), "got: {name}");
    }

    #[test]
    fn empty_fields_become_null() {
        let file = source_file(b"UUID|NOMBRE|TOTAL\na||1\n");
        let mut reader = StreamReader::open(file.path(), 10).unwrap();

        let batch = reader.next_batch().unwrap().unwrap();
        assert_eq!(batch.value_at(0, "NOMBRE"), Some(&Value::Null));
    }

    #[test]
    fn header_only_file_yields_the_sentinel_immediately() {
        let file = source_file(b"UUID|NOMBRE\n");
        let mut reader = StreamReader::open(file.path(), 10).unwrap();
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn empty_file_is_not_an_error() {
        let file = source_file(b"");
        let mut reader = StreamReader::open(file.path(), 10).unwrap();
        assert!(reader.next_batch().unwrap().is_none());
    }
}
