//! Reading and writing operation logs.
//!
//! A log is plain text: one header line naming the [`LOG_COLUMNS`], followed
//! by one line per [`OperationRecord`]. Writers flush after every record so
//! that a log stays usable if the recording process dies.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use log::debug;
use thiserror::Error;

use crate::record::{LogRow, OperationRecord, LOG_COLUMNS};

/// Errors encountered when a log cannot be read as a whole.
#[derive(Debug, Error)]
pub enum LogReadError {
    /// The log file could not be opened or read.
    #[error("Failed to read operation log {path:?}: {source}")]
    Io {
        /// Path of the log.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The log holds a header at most.
    #[error("Operation log {0:?} has no data rows")]
    Empty(PathBuf),
}

/// Appends records to a log sink.
#[derive(Debug)]
pub struct OperationLogWriter<W: Write> {
    sink: W,
    rows_written: usize,
}

impl OperationLogWriter<File> {
    /// Opens a log file for appending, creating it if needed.
    ///
    /// The header is only written when the file is new or empty, so reopening
    /// an existing log continues it. A last line cut short by a crash is
    /// terminated first so that it stays a row of its own.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path.as_ref())?;
        let len = file.metadata()?.len();
        let needs_header = len == 0;

        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                debug!("Terminating partial last line of {:?}", path.as_ref());
                file.write_all(b"\n")?;
            }
        }

        debug!(
            "Opened operation log {:?} (new: {})",
            path.as_ref(),
            needs_header
        );

        let mut writer = Self {
            sink: file,
            rows_written: 0,
        };
        if needs_header {
            writer.write_header()?;
        }

        Ok(writer)
    }
}

impl<W: Write> OperationLogWriter<W> {
    /// Wraps a fresh sink and writes the header to it.
    pub fn new(sink: W) -> io::Result<Self> {
        let mut writer = Self {
            sink,
            rows_written: 0,
        };
        writer.write_header()?;

        Ok(writer)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.sink, "{}", LOG_COLUMNS.join(","))?;
        self.sink.flush()
    }

    /// Writes one record and flushes.
    pub fn append(&mut self, record: &OperationRecord) -> io::Result<()> {
        writeln!(self.sink, "{}", record)?;
        self.sink.flush()?;
        self.rows_written += 1;

        Ok(())
    }

    /// Writes several records, flushing once at the end.
    pub fn append_all<'a, I>(&mut self, records: I) -> io::Result<()>
    where
        I: IntoIterator<Item = &'a OperationRecord>,
    {
        for record in records {
            writeln!(self.sink, "{}", record)?;
            self.rows_written += 1;
        }

        self.sink.flush()
    }

    /// Number of records written through this writer.
    pub const fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flushes and hands back the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

/// Reads the rows of a log lazily.
#[derive(Debug)]
pub struct OperationLogReader<R: BufRead> {
    source: R,
}

impl OperationLogReader<BufReader<File>> {
    /// Opens a log file.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> OperationLogReader<R> {
    /// Reads from any buffered source.
    pub const fn new(source: R) -> Self {
        Self { source }
    }

    /// Iterates over the data rows.
    ///
    /// The header, lines with fewer than six columns and lines that are not
    /// UTF-8 are skipped. I/O errors are yielded and end nothing by
    /// themselves.
    pub fn rows(self) -> impl Iterator<Item = io::Result<LogRow>> {
        self.source.split(b'\n').filter_map(|line| match line {
            Ok(line) => match std::str::from_utf8(&line) {
                Ok(line) => LogRow::parse_line(line)
                    .filter(|row| !row.is_header())
                    .map(Ok),
                Err(e) => {
                    debug!("Skipping log line that is not UTF-8: {}", e);
                    None
                }
            },
            Err(e) => Some(Err(e)),
        })
    }

    /// Iterates over the rows that decode to records, dropping the others.
    pub fn records(self) -> impl Iterator<Item = io::Result<OperationRecord>> {
        self.rows().filter_map(|row| match row {
            Ok(row) => row.decode().ok().map(Ok),
            Err(e) => Some(Err(e)),
        })
    }
}

/// Reads every data row of a log file.
///
/// Fails if the file cannot be read or holds no data rows.
pub fn read_log_rows<P: AsRef<Path>>(path: P) -> Result<Vec<LogRow>, LogReadError> {
    let path = path.as_ref();
    let io_err = |source| LogReadError::Io {
        path: path.to_path_buf(),
        source,
    };

    let rows = OperationLogReader::open(path)
        .map_err(io_err)?
        .rows()
        .collect::<io::Result<Vec<_>>>()
        .map_err(io_err)?;

    if rows.is_empty() {
        return Err(LogReadError::Empty(path.to_path_buf()));
    }

    debug!("Read {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use hex_literal::hex;

    use super::{read_log_rows, LogReadError, OperationLogReader, OperationLogWriter};
    use crate::record::{OpKind, OperationRecord};

    fn put_record(key: &[u8], value: &[u8]) -> OperationRecord {
        OperationRecord::classified(OpKind::Put, key, Some(value)).unwrap()
    }

    #[test]
    fn new_writer_starts_with_the_header() {
        let mut writer = OperationLogWriter::new(Vec::new()).unwrap();
        writer
            .append(&put_record(&hex!("4101"), &hex!("c0")))
            .unwrap();
        let out = String::from_utf8(writer.finish().unwrap()).unwrap();

        assert_eq!(
            out,
            "Operation,KeyHex,ValueHex,KeySize,ValueSize,Type\n\
             PUT,4101,c0,2,1,PATH_ACCOUNT_TRIE\n"
        );
    }

    #[test]
    fn reopening_a_log_does_not_repeat_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.csv");

        for key in [hex!("4101"), hex!("4102")] {
            let mut writer = OperationLogWriter::open(&path).unwrap();
            writer.append(&put_record(&key, &hex!("c0"))).unwrap();
            writer.finish().unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Operation,KeyHex").count(), 1);
        assert_eq!(read_log_rows(&path).unwrap().len(), 2);
    }

    #[test]
    fn empty_existing_file_gets_a_header() {
        let file = tempfile::NamedTempFile::new().unwrap();
        OperationLogWriter::open(file.path()).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("Operation,"));
    }

    #[test]
    fn reader_skips_header_and_short_rows() {
        let text = "Operation,KeyHex,ValueHex,KeySize,ValueSize,Type\n\
                    PUT,4101,c0,2,1,PATH_ACCOUNT_TRIE\n\
                    PUT,4101\n\
                    \n\
                    GET,0x4101,0xc0,2,1,PATH_ACCOUNT_TRIE\n";
        let rows: Vec<_> = OperationLogReader::new(Cursor::new(text))
            .rows()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].operation, "PUT");
        assert_eq!(rows[1].key_hex, "0x4101");
    }

    #[test]
    fn rows_that_are_not_utf8_are_skipped() {
        let mut text = b"Operation,KeyHex,ValueHex,KeySize,ValueSize,Type\n\
                         PUT,4101,c0,2,1,PATH_ACCOUNT_TRIE\n"
            .to_vec();
        text.extend_from_slice(b"PUT,41\xff02,c0,2,1,PATH_ACCOUNT_TRIE\n");
        text.extend_from_slice(b"PUT,4103,c0,2,1,PATH_ACCOUNT_TRIE\n");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.csv");
        std::fs::write(&path, &text).unwrap();

        let rows = read_log_rows(&path).unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.key_hex.as_str()).collect();
        assert_eq!(keys, vec!["4101", "4103"]);
    }

    #[test]
    fn appending_after_a_partial_line_starts_a_new_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.csv");
        std::fs::write(
            &path,
            "Operation,KeyHex,ValueHex,KeySize,ValueSize,Type\nPUT,41",
        )
        .unwrap();

        let mut writer = OperationLogWriter::open(&path).unwrap();
        writer
            .append(&put_record(&hex!("4102"), &hex!("c0")))
            .unwrap();
        writer.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("\nPUT,41\nPUT,4102,c0,2,1,PATH_ACCOUNT_TRIE\n"));
        let rows = read_log_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key_hex, "4102");
    }

    #[test]
    fn records_drop_rows_that_do_not_decode() {
        let text = "PUT,4101,c0,2,1,PATH_ACCOUNT_TRIE\n\
                    PUT,41zz,c0,2,1,PATH_ACCOUNT_TRIE\n";
        let records: Vec<_> = OperationLogReader::new(Cursor::new(text))
            .records()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records, vec![put_record(&hex!("4101"), &hex!("c0"))]);
    }

    #[test]
    fn missing_or_empty_logs_are_errors() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            read_log_rows(dir.path().join("absent.csv")),
            Err(LogReadError::Io { .. })
        ));

        let header_only = dir.path().join("header.csv");
        let mut f = std::fs::File::create(&header_only).unwrap();
        writeln!(f, "Operation,KeyHex,ValueHex,KeySize,ValueSize,Type").unwrap();
        assert!(matches!(
            read_log_rows(&header_only),
            Err(LogReadError::Empty(_))
        ));
    }
}
