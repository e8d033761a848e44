//! Data sources feeding the decoding engine.

use log::debug;

use crate::{error::Warning, error_context::ErrorContext};

/// Inserted when the real data runs out so the engine can wind down instead of failing.
static FAKE_EOI: [u8; 2] = [0xFF, 0xD9];

/// The pull protocol the engine reads its input through.
///
/// The engine consumes bytes from [`window`](SourceManager::window) and calls
/// [`fill_input_buffer`](SourceManager::fill_input_buffer) whenever the window is empty.
pub trait SourceManager {
    /// Called when header reading starts, before any data is read.
    fn init_source(&mut self);

    /// Reloads the window. Returns `false` to ask for suspension, which means no data is
    /// available right now.
    fn fill_input_buffer(&mut self, err: &mut ErrorContext<'_>) -> bool;

    /// Skips `num_bytes` of uninteresting data. Values `<= 0` are ignored.
    fn skip_input_data(&mut self, num_bytes: i64);

    /// Called after the last byte of the image has been read. Not called on failure.
    fn term_source(&mut self);

    /// Bytes available right now.
    fn window(&self) -> &[u8];

    /// Marks `count` bytes of the window as read.
    fn consume(&mut self, count: usize);
}

/// Presents a resident byte buffer to the engine. The buffer is borrowed, never copied or written.
#[derive(Debug)]
pub struct MemorySource<'data> {
    buffer: &'data [u8],
    window: &'data [u8],
    start_of_file: bool,
}

impl<'data> MemorySource<'data> {
    /// Binds a source to `buffer`. The first fill exposes all of it.
    pub fn new(buffer: &'data [u8]) -> Self {
        Self {
            buffer,
            window: &[],
            start_of_file: true,
        }
    }

    /// Total length of the bound buffer.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the bound buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl SourceManager for MemorySource<'_> {
    fn init_source(&mut self) {
        // The window is left alone, only the flag is reset.
        self.start_of_file = true;
    }

    fn fill_input_buffer(&mut self, err: &mut ErrorContext<'_>) -> bool {
        if self.start_of_file {
            self.window = self.buffer;
        } else {
            err.warn(Warning::JpegEof);
            self.window = &FAKE_EOI;
        }
        self.start_of_file = false;

        true
    }

    fn skip_input_data(&mut self, num_bytes: i64) {
        if num_bytes <= 0 {
            return;
        }

        let requested = usize::try_from(num_bytes).unwrap_or(usize::MAX);
        if requested > self.window.len() {
            debug!(
                "skip of {} bytes runs past the {} buffered bytes",
                requested,
                self.window.len()
            );
        }
        self.consume(requested);
    }

    fn term_source(&mut self) {}

    fn window(&self) -> &[u8] {
        self.window
    }

    fn consume(&mut self, count: usize) {
        let count = count.min(self.window.len());
        self.window = &self.window[count..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fill_exposes_whole_buffer() {
        let data = [0xFF, 0xD8, 0xFF, 0xE0, 0x00];
        let mut err = ErrorContext::new();
        let mut src = MemorySource::new(&data);
        src.init_source();
        assert!(src.window().is_empty());

        assert!(src.fill_input_buffer(&mut err));
        assert_eq!(src.window(), &data);
        assert_eq!(err.num_warnings(), 0);
    }

    #[test]
    fn later_fills_insert_fake_eoi_and_warn() {
        let data = [0xFF, 0xD8];
        let mut err = ErrorContext::new();
        let mut src = MemorySource::new(&data);
        src.init_source();
        assert!(src.fill_input_buffer(&mut err));
        src.consume(2);

        for round in 1..=3 {
            assert!(src.fill_input_buffer(&mut err));
            assert_eq!(src.window(), &FAKE_EOI);
            assert_eq!(err.num_warnings(), round);
            src.consume(2);
        }
        assert!(!err.has_fired());
        assert_eq!(data, [0xFF, 0xD8]);
    }

    #[test]
    fn empty_buffer_goes_straight_to_eoi() {
        let mut err = ErrorContext::new();
        let mut src = MemorySource::new(&[]);
        assert!(src.is_empty());
        src.init_source();
        assert!(src.fill_input_buffer(&mut err));
        assert!(src.window().is_empty());
        assert!(src.fill_input_buffer(&mut err));
        assert_eq!(src.window(), &FAKE_EOI);
    }

    #[test]
    fn skip_advances_and_ignores_non_positive_counts() {
        let data: Vec<u8> = (0..10).collect();
        let mut err = ErrorContext::new();
        let mut src = MemorySource::new(&data);
        src.init_source();
        src.fill_input_buffer(&mut err);

        src.skip_input_data(3);
        assert_eq!(src.window()[0], 3);
        assert_eq!(src.window().len(), 7);

        src.skip_input_data(0);
        src.skip_input_data(-5);
        assert_eq!(src.window().len(), 7);

        src.skip_input_data(100);
        assert!(src.window().is_empty());
        assert_eq!(src.len(), 10);
    }
}
