use crate::jpeg::ColorSpace;

/// Result of a decode call.
pub type Result<T> = core::result::Result<T, DecodeError>;

/// Why a decode call failed. Every failure is terminal for the call.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Header or marker parsing failed, or the input is not a JPEG at all.
    #[error("corrupt JPEG stream: {0}")]
    CorruptStream(String),
    /// The header resolved to an output color space other than RGB.
    #[error("unsupported output color space {0:?}, only RGB is decoded")]
    UnsupportedColorSpace(ColorSpace),
    /// The pixel buffer could not be allocated (or exceeds the configured limit).
    #[error("unable to allocate {bytes} bytes for the pixel buffer")]
    OutOfMemory {
        /// Size of the refused allocation.
        bytes: usize,
    },
    /// The engine reported a fault that is not a corrupt stream.
    #[error("decoder engine failure: {0}")]
    EngineInternalError(String),
}

/// Fatal conditions raised by the decoding engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The image is malformed in some way. The string describes how.
    #[error("{0}")]
    Malformed(&'static str),
    /// A feature is not supported by the decoder
    #[error("unsupported JPEG feature: {0}")]
    UnsupportedFeature(&'static str),
    /// An engine call was made out of order
    #[error("improper call in state {0}")]
    BadState(&'static str),
    /// The data source asked to suspend, which the engine can't do
    #[error("data source suspended")]
    Suspended,
}

impl From<Error> for DecodeError {
    fn from(err: Error) -> Self {
        match err {
            Error::Malformed(_) => DecodeError::CorruptStream(err.to_string()),
            Error::UnsupportedFeature(_) | Error::BadState(_) | Error::Suspended => {
                DecodeError::EngineInternalError(err.to_string())
            }
        }
    }
}

/// Non-fatal conditions. They are reported through the output-message hook and decode goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// The source ran dry and a fake EOI marker was inserted.
    JpegEof,
    /// The entropy-coded segment ended before the image was complete.
    HitMarker,
    /// Garbage bytes were skipped while looking for a marker.
    ExtraneousData {
        /// Number of bytes skipped
        bytes: usize,
        /// Marker code found after them
        marker: u8,
    },
    /// A Huffman code didn't match any table entry.
    BadHuffmanCode,
    /// A restart marker arrived out of sequence.
    UnexpectedRestart {
        /// Restart index that was expected
        expected: u8,
        /// Marker code actually found
        found: u8,
    },
}

impl core::fmt::Display for Warning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Warning::JpegEof => write!(f, "Premature end of JPEG data"),
            Warning::HitMarker => write!(f, "Corrupt JPEG data: premature end of data segment"),
            Warning::ExtraneousData { bytes, marker } => write!(
                f,
                "Corrupt JPEG data: {} extraneous bytes before marker 0x{:02x}",
                bytes, marker
            ),
            Warning::BadHuffmanCode => write!(f, "Corrupt JPEG data: bad Huffman code"),
            Warning::UnexpectedRestart { expected, found } => write!(
                f,
                "Corrupt JPEG data: found marker 0x{:02x} instead of RST{}",
                found, expected
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_maps_to_corrupt_stream() {
        let err: DecodeError = Error::Malformed("Not a JPEG file").into();
        assert!(matches!(err, DecodeError::CorruptStream(ref msg) if msg == "Not a JPEG file"));
    }

    #[test]
    fn other_engine_faults_map_to_internal_error() {
        for err in [
            Error::UnsupportedFeature("progressive JPEG"),
            Error::BadState("Ready"),
            Error::Suspended,
        ] {
            let decode_err: DecodeError = err.into();
            assert!(matches!(decode_err, DecodeError::EngineInternalError(_)));
        }
    }
}
