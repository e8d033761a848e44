#![warn(missing_docs)]

//! Decodes baseline JPEG images held in memory into packed 8-bit RGB.
//!
//! ```no_run
//! let bytes = std::fs::read("photo.jpg").unwrap();
//! let image = memjpeg::decode(&bytes).unwrap();
//! assert_eq!(image.pixels().len(), image.width() as usize * image.height() as usize * 3);
//! ```
mod bitstream;
mod decoder;
mod error;
mod error_context;
/// C interface to the decoder
pub mod ffi;
mod image;
/// Pull-based JPEG decoding engine
pub mod jpeg;
mod source;

pub use decoder::{decode, Decoder, DecoderOptions};
pub use error::{DecodeError, Error, Result, Warning};
pub use error_context::{ErrorContext, MessageLevel, MessageSink, PendingCleanup};
pub use image::{Image, CHANNELS};
pub use jpeg::ColorSpace;
pub use source::{MemorySource, SourceManager};
