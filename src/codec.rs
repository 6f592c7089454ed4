use crate::error::{Error, Result};
use flate2::{Compress, Compression, Crc, FlushCompress, Status};
use std::io::{self, Write};

/// The content-coding produced by this crate.
pub const GZIP: &str = "gzip";

const OUTPUT_BUFFER_SIZE: usize = 32 * 1024; // 32KB output buffer

/// Gzip compression level.
///
/// `Default` is kept apart from the numeric levels even though it compresses
/// like one of them, so that it owns its own slot in the codec pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    /// The codec's default trade-off.
    #[default]
    Default,
    /// An explicit level in `1..=9`.
    Precise(u32),
}

impl Level {
    /// Fastest compression.
    pub const BEST_SPEED: Level = Level::Precise(1);
    /// Smallest output.
    pub const BEST_COMPRESSION: Level = Level::Precise(9);

    /// Checks that a precise level lies within `1..=9`.
    pub fn validate(self) -> Result<Self> {
        match self {
            Level::Default => Ok(self),
            Level::Precise(n) if (1..=9).contains(&n) => Ok(self),
            Level::Precise(n) => Err(Error::InvalidLevel(n)),
        }
    }

    fn compression(self) -> Compression {
        match self {
            Level::Default => Compression::default(),
            Level::Precise(n) => Compression::new(n),
        }
    }

    /// XFL byte of the gzip member header.
    fn extra_flags(self) -> u8 {
        let level = self.compression().level();
        if level >= Compression::best().level() {
            2
        } else if level <= Compression::fast().level() {
            4
        } else {
            0
        }
    }
}

/// A resettable streaming gzip encoder.
///
/// The encoder does not own its output; every call takes the writer the
/// compressed bytes go to, which lets one instance serve many responses.
pub struct GzipEncoder {
    level: Level,
    deflate: Compress,
    crc: Crc,
    header_written: bool,
    output: Vec<u8>,
}

impl GzipEncoder {
    /// Creates an encoder at `level`. The level must already be validated.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            deflate: Compress::new(level.compression(), false),
            crc: Crc::new(),
            header_written: false,
            output: vec![0u8; OUTPUT_BUFFER_SIZE],
        }
    }

    /// Returns the level this encoder compresses at.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Discards all stream state so a new gzip member can be started.
    pub fn reset(&mut self) {
        self.deflate.reset();
        self.crc.reset();
        self.header_written = false;
    }

    /// Compresses `input` into `out`, returning the number of bytes consumed.
    pub fn write<W: Write + ?Sized>(&mut self, out: &mut W, input: &[u8]) -> io::Result<usize> {
        self.write_header(out)?;

        let mut consumed = 0;
        while consumed < input.len() {
            let (read, written, _) = self.step(&input[consumed..], FlushCompress::None)?;
            out.write_all(&self.output[..written])?;

            if read == 0 && written == 0 {
                return Err(io::Error::other("deflate made no progress"));
            }
            consumed += read;
        }

        self.crc.update(input);
        Ok(input.len())
    }

    /// Emits everything compressed so far, ending with a sync marker.
    pub fn flush<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        self.write_header(out)?;

        let (_, written, _) = self.step(&[], FlushCompress::Sync)?;
        out.write_all(&self.output[..written])?;

        loop {
            let (_, written, _) = self.step(&[], FlushCompress::None)?;
            if written == 0 {
                return Ok(());
            }
            out.write_all(&self.output[..written])?;
        }
    }

    /// Terminates the deflate stream and writes the gzip trailer.
    pub fn finish<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        self.write_header(out)?;

        loop {
            let (_, written, status) = self.step(&[], FlushCompress::Finish)?;
            out.write_all(&self.output[..written])?;
            if status == Status::StreamEnd || written == 0 {
                break;
            }
        }

        let mut trailer = [0u8; 8];
        trailer[..4].copy_from_slice(&self.crc.sum().to_le_bytes());
        trailer[4..].copy_from_slice(&self.crc.amount().to_le_bytes());
        out.write_all(&trailer)
    }

    fn write_header<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }
        // magic, deflate, no flags, zero mtime, XFL, unknown OS
        let header = [0x1f, 0x8b, 8, 0, 0, 0, 0, 0, self.level.extra_flags(), 255];
        out.write_all(&header)?;
        self.header_written = true;
        Ok(())
    }

    /// Runs one deflate step into the output buffer, returning bytes read,
    /// bytes produced and the codec status.
    fn step(&mut self, input: &[u8], flush: FlushCompress) -> io::Result<(usize, usize, Status)> {
        let before_in = self.deflate.total_in();
        let before_out = self.deflate.total_out();
        let status = self
            .deflate
            .compress(input, &mut self.output, flush)
            .map_err(io::Error::other)?;
        let read = (self.deflate.total_in() - before_in) as usize;
        let written = (self.deflate.total_out() - before_out) as usize;
        Ok((read, written, status))
    }
}

impl std::fmt::Debug for GzipEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipEncoder")
            .field("level", &self.level)
            .field("header_written", &self.header_written)
            .finish_non_exhaustive()
    }
}
