//! Append-only CSV trace sink.
//!
//! ```text
//! function_name,start_timestamp,end_timestamp,<event1>,<event2>,...
//! <name>,<sec>.<nsec>,<sec>.<nsec>,<v1>,<v2>,...
//! ```
//!
//! One header row, then one row per completed invocation in completion order.
//! Every row is flushed as soon as it is written so a trace survives an abrupt
//! exit of the instrumented program.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::{ConfigError, Error};
use crate::event::EventSpec;
use crate::stack::FrameRecord;

/// Fixed leading columns of every trace.
pub const FIXED_COLUMNS: [&str; 3] = ["function_name", "start_timestamp", "end_timestamp"];

#[derive(Debug)]
pub struct Recorder<W: Write> {
    writer: csv::Writer<W>,
    width: usize,
    rows: u64,
}

impl Recorder<File> {
    /// Create (truncating) the trace file at `path`.
    pub fn create(path: &Path) -> Result<Self, ConfigError> {
        let file = File::create(path).map_err(|source| ConfigError::OpenOutput {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(file))
    }
}

impl<W: Write> Recorder<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .flexible(false)
            .from_writer(sink);
        Self {
            writer,
            width: 0,
            rows: 0,
        }
    }

    /// Write the header row. Must be called exactly once, before any row.
    pub fn write_header(&mut self, events: &EventSpec) -> Result<(), Error> {
        let fields = FIXED_COLUMNS.into_iter().chain(events.names());
        self.writer.write_record(fields)?;
        self.writer.flush().map_err(csv::Error::from)?;
        self.width = events.len();
        Ok(())
    }

    /// Write one completed frame and flush.
    pub fn write_row(&mut self, record: &FrameRecord) -> Result<(), Error> {
        debug_assert_eq!(record.values.len(), self.width, "row width must match header");
        self.writer.write_field(&record.name)?;
        self.writer.write_field(record.start.to_string())?;
        self.writer.write_field(record.end.to_string())?;
        for value in &record.values {
            self.writer.write_field(value.to_string())?;
        }
        self.writer.write_record(None::<&[u8]>)?;
        self.writer.flush().map_err(csv::Error::from)?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush and hand back the underlying sink.
    pub fn into_inner(self) -> Result<W, Error> {
        self.writer.into_inner().map_err(|e| {
            let io = std::io::Error::new(e.error().kind(), e.error().to_string());
            Error::Record(csv::Error::from(io))
        })
    }
}
