//! Sinks for detection records.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::detector::DetectionRecord;
use crate::error::Result;

pub const TSV_HEADER: &str =
    "window_id\trho\tthreshold\tstate\talert\tpartial\treads\tcard_S\tcard_union\tcard_R\tseconds";

/// Consumer of detection records in emission order.
pub trait RecordSink {
    fn write_record(&mut self, record: &DetectionRecord) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl RecordSink for Vec<DetectionRecord> {
    fn write_record(&mut self, record: &DetectionRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Tab-separated table of detection records. The threshold column is empty while calibrating.
pub struct TsvSink<W: Write> {
    writer: W,
}

impl TsvSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        TsvSink::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> TsvSink<W> {
    pub fn new(mut writer: W) -> Result<Self> {
        writeln!(writer, "{TSV_HEADER}")?;
        Ok(TsvSink { writer })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for TsvSink<W> {
    fn write_record(&mut self, record: &DetectionRecord) -> Result<()> {
        let threshold = record
            .threshold
            .map(|tau| format!("{tau:.6}"))
            .unwrap_or_default();

        writeln!(
            self.writer,
            "{}\t{:.6}\t{}\t{}\t{}\t{}\t{}\t{:.0}\t{:.0}\t{:.0}\t{:.3}",
            record.window_id,
            record.rho,
            threshold,
            record.state,
            record.alert,
            record.partial,
            record.reads,
            record.card_window,
            record.card_union,
            record.card_catalog,
            record.elapsed.as_secs_f64()
        )?;

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
