//! Baseline JPEG decoding engine.
//!
//! A session is driven the same way every time: [`Decompress::read_header`],
//! [`Decompress::calc_output_dimensions`], [`Decompress::start_decompress`], one
//! [`Decompress::read_scanlines`] per row, [`Decompress::finish_decompress`], then
//! [`Decompress::destroy`]. Calls out of order fail with [`Error::BadState`].

mod header;
pub(crate) mod jpeg_core;
pub(crate) mod jpeg_reader;

use log::debug;

use crate::{error::Error, error_context::ErrorContext, source::SourceManager};
use header::HeaderInfo;
use jpeg_core::ScanDecoder;
use jpeg_reader::JPEGParser;

/// Result of an engine call.
pub type Result<T> = core::result::Result<T, Error>;

/// Pixel component interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Not recognised
    Unknown,
    /// One luminance channel
    Grayscale,
    /// Red, green, blue
    Rgb,
    /// Luminance and two chroma channels
    YCbCr,
    /// Cyan, magenta, yellow, black
    Cmyk,
    /// YCbCr plus black
    Ycck,
}

impl ColorSpace {
    /// Samples per pixel.
    pub fn components(self) -> usize {
        match self {
            ColorSpace::Unknown => 0,
            ColorSpace::Grayscale => 1,
            ColorSpace::Rgb | ColorSpace::YCbCr => 3,
            ColorSpace::Cmyk | ColorSpace::Ycck => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecompressState {
    Start,
    HeaderRead,
    Ready,
    Scanning,
    Finished,
    Destroyed,
}

impl DecompressState {
    fn name(self) -> &'static str {
        match self {
            DecompressState::Start => "Start",
            DecompressState::HeaderRead => "HeaderRead",
            DecompressState::Ready => "Ready",
            DecompressState::Scanning => "Scanning",
            DecompressState::Finished => "Finished",
            DecompressState::Destroyed => "Destroyed",
        }
    }
}

/// One decompression session over a data source.
pub struct Decompress<'a, S> {
    reader: JPEGParser<'a, S>,
    state: DecompressState,
    header: Option<HeaderInfo>,
    scan: Option<ScanDecoder>,
    output_size: (u32, u32),
    output_scanline: u32,
}

impl<'a, S: SourceManager> Decompress<'a, S> {
    /// Creates a session reading from `src` and reporting through `err`.
    pub fn new(src: S, err: ErrorContext<'a>) -> Self {
        Self {
            reader: JPEGParser::new(src, err),
            state: DecompressState::Start,
            header: None,
            scan: None,
            output_size: (0, 0),
            output_scanline: 0,
        }
    }

    fn expect_state(&self, allowed: &[DecompressState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::BadState(self.state.name()))
        }
    }

    /// Reads everything up to the first scan.
    pub fn read_header(&mut self) -> Result<()> {
        self.expect_state(&[DecompressState::Start])?;
        self.reader.init_source();

        let header = HeaderInfo::read_header_info(&mut self.reader).map_err(|err| {
            if self.reader.err().ran_dry() {
                Error::Malformed("Premature end of JPEG file")
            } else {
                err
            }
        })?;
        debug!(
            "header read at offset {}: {}x{}, {}-bit, {} components, {:?}",
            self.reader.position(),
            header.frame_info.image_size.0,
            header.frame_info.image_size.1,
            header.frame_info.precision,
            header.frame_info.components.len(),
            header.jpeg_color_space()
        );
        self.header = Some(header);
        self.state = DecompressState::HeaderRead;
        Ok(())
    }

    /// Computes the output size. There is no scaling, so it matches the image size.
    pub fn calc_output_dimensions(&mut self) -> Result<()> {
        self.expect_state(&[DecompressState::HeaderRead, DecompressState::Ready])?;
        let header = self.header.as_ref().ok_or(Error::BadState("HeaderRead"))?;
        let (width, height) = header.frame_info.image_size;
        self.output_size = (width as u32, height as u32);
        self.state = DecompressState::Ready;
        Ok(())
    }

    /// Color space of the encoded components, [`ColorSpace::Unknown`] before the header is read.
    pub fn jpeg_color_space(&self) -> ColorSpace {
        self.header
            .as_ref()
            .map_or(ColorSpace::Unknown, HeaderInfo::jpeg_color_space)
    }

    /// Color space scanlines come out in.
    pub fn out_color_space(&self) -> ColorSpace {
        self.header
            .as_ref()
            .map_or(ColorSpace::Unknown, HeaderInfo::default_out_color_space)
    }

    /// Width of each output scanline in pixels.
    pub fn output_width(&self) -> u32 {
        self.output_size.0
    }

    /// Number of output scanlines.
    pub fn output_height(&self) -> u32 {
        self.output_size.1
    }

    /// Number of scanlines handed out so far.
    pub fn output_scanline(&self) -> u32 {
        self.output_scanline
    }

    /// Validates tables and sets up the scan. Only RGB output is produced.
    pub fn start_decompress(&mut self) -> Result<()> {
        self.expect_state(&[DecompressState::Ready])?;
        if self.out_color_space() != ColorSpace::Rgb {
            return Err(Error::UnsupportedFeature("color conversion to RGB"));
        }

        let header = self.header.as_ref().ok_or(Error::BadState("Ready"))?;
        self.scan = Some(ScanDecoder::new(header)?);
        self.output_scanline = 0;
        self.state = DecompressState::Scanning;
        Ok(())
    }

    /// Decodes the next scanline into `row`, which must hold `output_width * 3` bytes.
    /// Returns the number of rows written, 0 once every row has been read.
    pub fn read_scanlines(&mut self, row: &mut [u8]) -> Result<usize> {
        self.expect_state(&[DecompressState::Scanning])?;
        if self.output_scanline >= self.output_size.1 {
            return Ok(0);
        }

        let scan = self.scan.as_mut().ok_or(Error::BadState("Scanning"))?;
        scan.read_row(&mut self.reader, row)?;
        self.output_scanline += 1;
        Ok(1)
    }

    /// Reads through EOI. Every scanline must have been read.
    pub fn finish_decompress(&mut self) -> Result<()> {
        self.expect_state(&[DecompressState::Scanning])?;
        if self.output_scanline < self.output_size.1 {
            return Err(Error::BadState("Scanning, too few scanlines read"));
        }

        let scan = self.scan.as_mut().ok_or(Error::BadState("Scanning"))?;
        scan.finish(&mut self.reader)?;
        self.reader.term_source();
        self.state = DecompressState::Finished;
        Ok(())
    }

    /// Releases everything the session allocated. Returns `false` if it was already released.
    pub fn destroy(&mut self) -> bool {
        if self.state == DecompressState::Destroyed {
            return false;
        }
        debug!("releasing decompressor in state {}", self.state.name());
        self.scan = None;
        self.header = None;
        self.state = DecompressState::Destroyed;
        true
    }

    /// Whether [`destroy`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.state == DecompressState::Destroyed
    }

    /// The error context of this session.
    pub fn err(&self) -> &ErrorContext<'a> {
        self.reader.err()
    }

    /// Mutable access to the error context.
    pub fn err_mut(&mut self) -> &mut ErrorContext<'a> {
        self.reader.err_mut()
    }
}
