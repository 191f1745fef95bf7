use std::io::{self, prelude::*, BufWriter, SeekFrom};
use std::path::Path;

use keiba_crawler::Record;

/// Append-only newline delimited file.
///
/// Opening a file whose last line was cut short terminates that line first, so the
/// next appended line always starts on a line of its own.
#[derive(Debug)]
pub struct AppendFile {
    writer: BufWriter<fs_err::File>,
}

impl AppendFile {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = fs_err::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path.as_ref())?;

        if file.metadata()?.len() > 0 {
            file.seek(SeekFrom::End(-1))?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                log::warn!("Terminating partial last line of {}", path.as_ref().display());
                file.write_all(b"\n")?;
                file.sync_data()?;
            }
        }

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn append_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")
    }

    /// Writes `record` as one JSON line, non-ASCII text is kept verbatim.
    pub fn append_record(&mut self, record: &Record) -> io::Result<()> {
        let line = serde_json::to_string(record)?;
        self.append_line(&line)
    }

    /// Flushes buffered lines and waits for them to reach the disk.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}
