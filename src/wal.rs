use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read `buf.len()` bytes. `Ok(false)` means the log ended (cleanly or mid-record).
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decode the next record. `Ok(None)` on end of log, truncation, or corruption.
fn decode_next(reader: &mut impl Read) -> io::Result<Option<Event>> {
    let mut len_buf = [0u8; 4];
    if !read_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    if !read_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_or_eof(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload).ok())
}

/// Storage under the log. `File` in production.
pub trait LogFile: Write {
    fn sync(&self) -> io::Result<()>;
    /// Cut the log back to `len` bytes; later writes continue from there.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append-only write-ahead log of scheduling events.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn last entry (crash mid-write) is discarded on replay.
/// - A failed append is cut off again before the next one, so only
///   acknowledged events are ever replayed.
pub struct Wal<F: LogFile = File> {
    file: F,
    path: PathBuf,
    /// Bytes of acknowledged records.
    len: u64,
    appends_since_compact: u64,
    /// Set when a failed append could not be rolled back.
    broken: Option<String>,
}

impl<F: LogFile> Wal<F> {
    fn with_file(file: F, path: PathBuf, len: u64) -> Self {
        Self { file, path, len, appends_since_compact: 0, broken: None }
    }

    /// Write and fsync one event. On failure the partial record is truncated
    /// away; if that fails too, every later append is refused.
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        if let Some(reason) = &self.broken {
            return Err(io::Error::other(format!("WAL unusable until restart: {reason}")));
        }
        let mut record = Vec::new();
        encode_event(&mut record, event)?;
        match self.file.write_all(&record).and_then(|()| self.file.sync()) {
            Ok(()) => {
                self.len += record.len() as u64;
                self.appends_since_compact += 1;
                Ok(())
            }
            Err(e) => {
                if let Err(undo) = self.file.truncate(self.len) {
                    tracing::error!("WAL rollback to {} bytes failed: {undo}", self.len);
                    self.broken = Some(undo.to_string());
                }
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self::with_file(file, path.to_path_buf(), len))
    }

    /// Write the compacted event list to `<wal>.tmp` and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let file = File::create(path.with_extension("wal.tmp"))?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the temp file over the live log and reopen for appending.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(self.path.with_extension("wal.tmp"), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.len = file.metadata()?.len();
        self.file = file;
        self.appends_since_compact = 0;
        self.broken = None;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Read every intact event from disk. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        read_events(BufReader::new(file))
    }
}

fn read_events(mut reader: impl Read) -> io::Result<Vec<Event>> {
    let mut events = Vec::new();
    while let Some(event) = decode_next(&mut reader)? {
        events.push(event);
    }
    Ok(events)
}
