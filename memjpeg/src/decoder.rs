//! Drives one decode from encoded bytes to an [`Image`].

use log::{debug, trace};

use crate::{
    error::{DecodeError, Result},
    error_context::{ErrorContext, MessageSink},
    image::{allocate_pixels, Image, CHANNELS},
    jpeg::{self, ColorSpace, Decompress},
    source::MemorySource,
};

/// Settings applied to every decode made by a [`Decoder`].
#[derive(Debug, Clone, Default)]
pub struct DecoderOptions {
    /// Largest image, in pixels, a pixel buffer is allocated for. `None` means no limit.
    pub max_pixels: Option<u64>,
}

impl DecoderOptions {
    /// Sets the pixel limit.
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = Some(max_pixels);
        self
    }
}

/// Where a decode session is. Any state can move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Created,
    SourceInstalled,
    HeaderRead,
    DimensionsComputed,
    ColorSpaceChecked,
    BufferAllocated,
    ScanlineLoop,
    Finished,
    Failed,
}

/// Ties the engine, its memory source, and its error context together for one call.
/// Dropping it releases the engine, whichever way the call ended.
struct DecodeSession<'a> {
    cinfo: Decompress<'a, MemorySource<'a>>,
    state: DecodeState,
}

impl<'a> DecodeSession<'a> {
    fn new(buffer: &'a [u8], err: ErrorContext<'a>) -> Self {
        let mut session = Self {
            cinfo: Decompress::new(MemorySource::new(buffer), err),
            state: DecodeState::Created,
        };
        session.advance(DecodeState::SourceInstalled);
        session
    }

    fn advance(&mut self, next: DecodeState) {
        if self.state != next {
            trace!("decode state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Runs one engine call, routing a failure through the error context.
    fn engine<T>(
        &mut self,
        next: DecodeState,
        step: impl FnOnce(&mut Decompress<'a, MemorySource<'a>>) -> jpeg::Result<T>,
    ) -> Result<T> {
        match step(&mut self.cinfo) {
            Ok(value) => {
                self.advance(next);
                Ok(value)
            }
            Err(err) => {
                self.advance(DecodeState::Failed);
                Err(self.cinfo.err_mut().error_exit(err))
            }
        }
    }

    fn fail(&mut self, err: DecodeError) -> DecodeError {
        self.advance(DecodeState::Failed);
        self.cinfo.err_mut().raise(err)
    }

    fn run(&mut self, options: &DecoderOptions) -> Result<Image> {
        self.engine(DecodeState::HeaderRead, |cinfo| cinfo.read_header())?;
        self.engine(DecodeState::DimensionsComputed, |cinfo| {
            cinfo.calc_output_dimensions()
        })?;

        let color_space = self.cinfo.out_color_space();
        if color_space != ColorSpace::Rgb {
            return Err(self.fail(DecodeError::UnsupportedColorSpace(color_space)));
        }
        self.advance(DecodeState::ColorSpaceChecked);

        let (width, height) = (self.cinfo.output_width(), self.cinfo.output_height());
        let mut pixels = match allocate_pixels(width, height, options.max_pixels) {
            Ok(pixels) => pixels,
            Err(err) => return Err(self.fail(err)),
        };
        self.advance(DecodeState::BufferAllocated);

        self.engine(DecodeState::ScanlineLoop, |cinfo| cinfo.start_decompress())?;
        let row_stride = width as usize * CHANNELS;
        for row in pixels.chunks_exact_mut(row_stride) {
            let rows = self.engine(DecodeState::ScanlineLoop, |cinfo| {
                cinfo.read_scanlines(row)
            })?;
            if rows != 1 {
                return Err(self.fail(DecodeError::EngineInternalError(
                    "decoder returned no scanline".to_string(),
                )));
            }
        }
        self.engine(DecodeState::Finished, |cinfo| cinfo.finish_decompress())?;
        self.cinfo.destroy();

        if self.cinfo.err().num_warnings() > 0 {
            debug!(
                "decoded {}x{} with {} warnings",
                width,
                height,
                self.cinfo.err().num_warnings()
            );
        }
        Ok(Image::new(width, height, pixels))
    }
}

impl Drop for DecodeSession<'_> {
    fn drop(&mut self) {
        if self.cinfo.destroy() {
            debug!("decode session torn down in state {:?}", self.state);
        }
    }
}

/// Decodes baseline JPEG images held in memory.
///
/// Every call to [`decode`](Decoder::decode) builds a fresh session, so a `Decoder` can be
/// reused for any number of images.
#[derive(Default)]
pub struct Decoder<'s> {
    options: DecoderOptions,
    sink: Option<&'s mut dyn MessageSink>,
}

impl<'s> Decoder<'s> {
    /// A decoder with default options that reports messages through `log`.
    pub fn new() -> Self {
        Self::default()
    }

    /// A decoder with the given options.
    pub fn with_options(options: DecoderOptions) -> Self {
        Self {
            options,
            sink: None,
        }
    }

    /// Sends warnings and errors to `sink` instead of `log`.
    pub fn with_message_sink(mut self, sink: &'s mut dyn MessageSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The options in effect.
    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Decodes the JPEG in `buffer`. The buffer is only borrowed for the call.
    ///
    /// On failure nothing is left allocated: the engine and any partial pixel buffer are
    /// released before the error is returned.
    pub fn decode(&mut self, buffer: &[u8]) -> Result<Image> {
        let err = match self.sink.as_mut() {
            Some(sink) => ErrorContext::with_sink(&mut **sink),
            None => ErrorContext::new(),
        };

        let mut session = DecodeSession::new(buffer, err);
        session.run(&self.options)
    }
}

impl core::fmt::Debug for Decoder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Decoder")
            .field("options", &self.options)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

/// Decodes the JPEG in `buffer` with default options.
pub fn decode(buffer: &[u8]) -> Result<Image> {
    Decoder::new().decode(buffer)
}
