//! Text input layer
//!
//! Every record source (intervals, alignment summaries, tags, chains,
//! mapping tables, WIG) is opened with [`open_text`], which sniffs gzip and
//! bzip2 magic bytes and maps large plain files instead of buffering them.
//! Record readers walk their input through [`RecordLines`], which numbers
//! lines and turns parse failures into [`RecordError`]s.

use crate::core::error::{EngineError, RecordError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read};
use std::path::Path;

/// Buffer size for decoders, buffered inputs and outputs (128KB)
pub const BUFFER_SIZE: usize = 128 * 1024;

/// Plain inputs at least this large are memory mapped (100MB)
pub const MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Compression of a text input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCompression {
    Plain,
    Gzip,
    Bzip2,
}

impl InputCompression {
    /// Classify from the first bytes of a file
    pub fn from_magic(magic: &[u8]) -> Self {
        match magic {
            [0x1f, 0x8b, ..] => InputCompression::Gzip,
            [b'B', b'Z', b'h', ..] => InputCompression::Bzip2,
            _ => InputCompression::Plain,
        }
    }
}

/// Sniff the compression of a file from its magic bytes
pub fn detect_compression(path: &Path) -> io::Result<InputCompression> {
    let mut magic = [0u8; 3];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < magic.len() {
        match file.read(&mut magic[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(InputCompression::from_magic(&magic[..filled]))
}

/// An uncompressed input file, buffered or memory mapped
pub enum PlainInput {
    Buffered(BufReader<File>),
    Mapped { map: Mmap, offset: usize },
}

impl PlainInput {
    /// Open a plain file, mapping it when it reaches [`MMAP_THRESHOLD`]
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        if file.metadata()?.len() >= MMAP_THRESHOLD {
            // SAFETY: inputs are not modified while they are being read
            let map = unsafe { Mmap::map(&file)? };
            Ok(PlainInput::Mapped { map, offset: 0 })
        } else {
            Ok(PlainInput::Buffered(BufReader::with_capacity(BUFFER_SIZE, file)))
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, PlainInput::Mapped { .. })
    }
}

impl Read for PlainInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PlainInput::Buffered(reader) => reader.read(buf),
            PlainInput::Mapped { map, offset } => {
                let rest = &map[*offset..];
                let n = rest.len().min(buf.len());
                buf[..n].copy_from_slice(&rest[..n]);
                *offset += n;
                Ok(n)
            }
        }
    }
}

impl BufRead for PlainInput {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            PlainInput::Buffered(reader) => reader.fill_buf(),
            PlainInput::Mapped { map, offset } => Ok(&map[*offset..]),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            PlainInput::Buffered(reader) => reader.consume(amt),
            PlainInput::Mapped { map, offset } => *offset = (*offset + amt).min(map.len()),
        }
    }
}

/// Open a text input, transparently decompressing gzip and bzip2
pub fn open_text<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    Ok(match detect_compression(path)? {
        InputCompression::Gzip => {
            let decoder = flate2::read::MultiGzDecoder::new(File::open(path)?);
            Box::new(BufReader::with_capacity(BUFFER_SIZE, decoder))
        }
        InputCompression::Bzip2 => {
            let decoder = bzip2::read::MultiBzDecoder::new(File::open(path)?);
            Box::new(BufReader::with_capacity(BUFFER_SIZE, decoder))
        }
        InputCompression::Plain => Box::new(PlainInput::open(path)?),
    })
}

/// Create a buffered text output
pub fn create_text<P: AsRef<Path>>(path: P) -> io::Result<BufWriter<File>> {
    Ok(BufWriter::with_capacity(BUFFER_SIZE, File::create(path)?))
}

/// Numbered lines of one record input
///
/// The line buffer is reused between calls. Errors raised through
/// [`RecordLines::error`] point at the line last returned.
pub struct RecordLines<R: BufRead> {
    reader: R,
    buffer: Vec<u8>,
    line: usize,
    format: &'static str,
    source: String,
}

impl RecordLines<Box<dyn BufRead + Send>> {
    /// Open a (possibly compressed) file of `format` records
    pub fn open<P: AsRef<Path>>(path: P, format: &'static str) -> Result<Self> {
        let path = path.as_ref();
        Ok(Self::new(open_text(path)?, format, path.display().to_string()))
    }
}

impl<R: BufRead> RecordLines<R> {
    pub fn new(reader: R, format: &'static str, source: impl Into<String>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(4096),
            line: 0,
            format,
            source: source.into(),
        }
    }

    fn advance(&mut self) -> Option<io::Result<()>> {
        self.buffer.clear();
        match self.reader.read_until(b'\n', &mut self.buffer) {
            Ok(0) => None,
            Ok(_) => {
                self.line += 1;
                if self.buffer.last() == Some(&b'\n') {
                    self.buffer.pop();
                    if self.buffer.last() == Some(&b'\r') {
                        self.buffer.pop();
                    }
                }
                Some(Ok(()))
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// Next line without its terminator; `None` at end of input
    pub fn next_bytes(&mut self) -> Option<Result<&[u8]>> {
        match self.advance()? {
            Ok(()) => Some(Ok(&self.buffer)),
            Err(e) => Some(Err(e.into())),
        }
    }

    /// Next line as text; invalid UTF-8 is a record error
    pub fn next_text(&mut self) -> Option<Result<&str>> {
        if let Err(e) = self.advance()? {
            return Some(Err(e.into()));
        }
        match std::str::from_utf8(&self.buffer) {
            Ok(text) => Some(Ok(text)),
            Err(e) => Some(Err(self.error(e))),
        }
    }

    /// 1-based number of the line last returned
    pub fn line_number(&self) -> usize {
        self.line
    }

    /// Record error at the line last returned
    pub fn error(&self, message: impl std::fmt::Display) -> EngineError {
        RecordError::new(self.format, self.source.clone(), self.line, message.to_string()).into()
    }
}
