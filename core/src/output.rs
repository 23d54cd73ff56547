use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use transfer_common::Result;
use transfer_common::manifest::TransferRecord;

/// Destination for the records of completed transfers.
pub trait RecordSink {
    fn append(&mut self, record: &TransferRecord) -> Result<()>;
}

impl RecordSink for Vec<TransferRecord> {
    fn append(&mut self, record: &TransferRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Appends records to a file as JSON Lines.
///
/// Each record is flushed as soon as it is written, so an interrupted run
/// leaves every completed transfer on disk.
pub struct MetadataSink {
    writer: BufWriter<File>,
    path: PathBuf,
    written: usize,
}

impl MetadataSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl RecordSink for MetadataSink {
    fn append(&mut self, record: &TransferRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
