//! Writers for conversion output.
//!
//! Field assignments are written either as NDJSON, one assignment per line,
//! or as a single JSON array.

use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use crate::field::FieldAssignment;

/// Error type for output writing
#[derive(Debug)]
pub enum SerializationError {
    Json(serde_json::Error),
    Io(io::Error),
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::Json(e) => write!(f, "Cannot encode record: {}", e),
            SerializationError::Io(e) => write!(f, "Cannot write output: {}", e),
        }
    }
}

impl std::error::Error for SerializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializationError::Json(e) => Some(e),
            SerializationError::Io(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::Json(err)
    }
}

impl From<io::Error> for SerializationError {
    fn from(err: io::Error) -> Self {
        SerializationError::Io(err)
    }
}

/// Writes one JSON record per line.
pub struct NdjsonWriter<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(mut self) -> Result<W, SerializationError> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Writes records as the elements of one JSON array.
///
/// The opening bracket is written on creation; [`JsonArrayWriter::finish`]
/// closes the array.
pub struct JsonArrayWriter<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> JsonArrayWriter<W> {
    pub fn new(mut out: W) -> Result<Self, SerializationError> {
        out.write_all(b"[")?;
        Ok(Self { out, written: 0 })
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        if self.written > 0 {
            self.out.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.out, record)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> Result<W, SerializationError> {
        self.out.write_all(b"]")?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Output layout of [`write_fields`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Ndjson,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ndjson" | "jsonl" => Ok(OutputFormat::Ndjson),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// Write field assignments in the given layout.
pub fn write_fields<W: Write>(
    out: W,
    fields: &[FieldAssignment],
    format: OutputFormat,
) -> Result<(), SerializationError> {
    match format {
        OutputFormat::Ndjson => {
            let mut writer = NdjsonWriter::new(out);
            for field in fields {
                writer.write(field)?;
            }
            writer.into_inner()?;
        }
        OutputFormat::Json => {
            let mut writer = JsonArrayWriter::new(out)?;
            for field in fields {
                writer.write(field)?;
            }
            writer.finish()?;
        }
    }
    Ok(())
}
