use byteorder::{BigEndian, ByteOrder};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use super::Result;
use crate::{
    error::{Error, Warning},
    error_context::ErrorContext,
    source::SourceManager,
};

#[allow(non_camel_case_types)]
#[repr(u16)]
#[derive(PartialEq, Eq, PartialOrd, FromPrimitive, Debug, Clone, Copy)]
pub enum JPEGMarker {
    SOF0 = 0xFFC0, // Baseline DCT
    SOF1 = 0xFFC1, // Extended sequential, decoded like baseline
    SOF2 = 0xFFC2,
    SOF3 = 0xFFC3,
    DHT = 0xFFC4,
    SOF5 = 0xFFC5,
    SOF6 = 0xFFC6,
    SOF7 = 0xFFC7,
    JPG = 0xFFC8,
    SOF9 = 0xFFC9,
    SOF10 = 0xFFCA,
    SOF11 = 0xFFCB,
    DAC = 0xFFCC,
    SOF13 = 0xFFCD,
    SOF14 = 0xFFCE,
    SOF15 = 0xFFCF,

    RST0 = 0xFFD0,
    RST1 = 0xFFD1,
    RST2 = 0xFFD2,
    RST3 = 0xFFD3,
    RST4 = 0xFFD4,
    RST5 = 0xFFD5,
    RST6 = 0xFFD6,
    RST7 = 0xFFD7,

    SOI = 0xFFD8,
    EOI = 0xFFD9,
    SOS = 0xFFDA,
    DQT = 0xFFDB,
    DNL = 0xFFDC,
    DRI = 0xFFDD,
    DHP = 0xFFDE,
    EXP = 0xFFDF,

    APP0 = 0xFFE0,
    APP1 = 0xFFE1,
    APP2 = 0xFFE2,
    APP3 = 0xFFE3,
    APP4 = 0xFFE4,
    APP5 = 0xFFE5,
    APP6 = 0xFFE6,
    APP7 = 0xFFE7,
    APP8 = 0xFFE8,
    APP9 = 0xFFE9,
    APP10 = 0xFFEA,
    APP11 = 0xFFEB,
    APP12 = 0xFFEC,
    APP13 = 0xFFED,
    APP14 = 0xFFEE,
    APP15 = 0xFFEF,

    JPG0 = 0xFFF0,
    JPG1 = 0xFFF1,
    JPG2 = 0xFFF2,
    JPG3 = 0xFFF3,
    JPG4 = 0xFFF4,
    JPG5 = 0xFFF5,
    JPG6 = 0xFFF6,
    JPG7 = 0xFFF7,
    JPG8 = 0xFFF8,
    JPG9 = 0xFFF9,
    JPG10 = 0xFFFA,
    JPG11 = 0xFFFB,
    JPG12 = 0xFFFC,
    JPG13 = 0xFFFD,
    COM = 0xFFFE,

    TEM = 0xFF01,
}

impl JPEGMarker {
    /// Maps the second byte of a marker to its type.
    pub fn from_code(code: u8) -> Result<JPEGMarker> {
        JPEGMarker::from_u16(0xFF00 | code as u16).ok_or(Error::Malformed("Unsupported marker type"))
    }

    /// Markers that stand alone, without a length field after them.
    pub fn is_standalone(self) -> bool {
        (self >= JPEGMarker::RST0 && self <= JPEGMarker::EOI) || self == JPEGMarker::TEM
    }

    pub fn is_restart(self) -> bool {
        self >= JPEGMarker::RST0 && self <= JPEGMarker::RST7
    }
}

/// Reads the JPEG datastream through a [`SourceManager`], reporting through the session's
/// [`ErrorContext`].
pub struct JPEGParser<'a, S> {
    src: S,
    err: ErrorContext<'a>,
    position: u64,
}

impl<'a, S: SourceManager> JPEGParser<'a, S> {
    pub fn new(src: S, err: ErrorContext<'a>) -> Self {
        Self {
            src,
            err,
            position: 0,
        }
    }

    pub fn init_source(&mut self) {
        self.src.init_source();
    }

    pub fn term_source(&mut self) {
        self.src.term_source();
    }

    pub fn read_next_byte(&mut self) -> Result<u8> {
        loop {
            if let Some(&byte) = self.src.window().first() {
                self.src.consume(1);
                self.position += 1;
                return Ok(byte);
            }

            if !self.src.fill_input_buffer(&mut self.err) {
                return Err(Error::Suspended);
            }
        }
    }

    pub fn read_next_word(&mut self) -> Result<u16> {
        let bytes = [self.read_next_byte()?, self.read_next_byte()?];
        Ok(BigEndian::read_u16(&bytes))
    }

    /// Reads the SOI marker, which has to be the very first two bytes.
    pub fn read_first_marker(&mut self) -> Result<JPEGMarker> {
        let first = self.read_next_byte()?;
        let second = self.read_next_byte()?;
        if first != 0xFF || second != 0xD8 {
            return Err(Error::Malformed("Not a JPEG file: missing SOI marker"));
        }
        Ok(JPEGMarker::SOI)
    }

    /// Finds the next marker and returns its code byte. Garbage in front of the marker is
    /// skipped with a warning.
    pub fn read_next_marker_code(&mut self) -> Result<u8> {
        let mut discarded = 0;
        loop {
            let mut byte = self.read_next_byte()?;
            while byte != 0xFF {
                discarded += 1;
                byte = self.read_next_byte()?;
            }

            // Any number of fill bytes may precede the marker code.
            while byte == 0xFF {
                byte = self.read_next_byte()?;
            }

            if byte != 0x00 {
                if discarded > 0 {
                    self.warn(Warning::ExtraneousData {
                        bytes: discarded,
                        marker: byte,
                    });
                }
                return Ok(byte);
            }

            // A stuffed zero is data, keep looking.
            discarded += 2;
        }
    }

    pub fn read_next_marker(&mut self) -> Result<JPEGMarker> {
        let code = self.read_next_marker_code()?;
        JPEGMarker::from_code(code)
    }

    /// Reads a segment length and returns how many bytes of payload follow it.
    pub fn read_segment_length(&mut self) -> Result<usize> {
        let length = self.read_next_word()?;
        length
            .checked_sub(2)
            .map(usize::from)
            .ok_or(Error::Malformed("Bogus marker length"))
    }

    pub fn skip_marker_with_length(&mut self) -> Result<()> {
        let byte_length = self.read_segment_length()?;
        self.skip(byte_length);
        Ok(())
    }

    /// Skips `count` bytes without reading them.
    pub fn skip(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let skipped = count.min(self.src.window().len());
        self.src
            .skip_input_data(i64::try_from(count).unwrap_or(i64::MAX));
        self.position += skipped as u64;
    }

    pub fn warn(&mut self, warning: Warning) {
        self.err.warn(warning);
    }

    pub fn err(&self) -> &ErrorContext<'a> {
        &self.err
    }

    pub fn err_mut(&mut self) -> &mut ErrorContext<'a> {
        &mut self.err
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[rustfmt::skip]
    static TEST_HEADER: [u8; 28] = [
        0xFF, 0xD8, // Start of image
        0xFF, 0xC0, // Start of frame
        0, 17,          // Length
        8,              // Precision
        0, 128,         // Height
        0, 128,         // Width
        3,              // Component count
        0, 0, 0,
        0, 0, 0,
        0, 0, 0,        // Component data
        0xFF, 0xFE, // Commment
        0, 3,           // Length
        65,             // Content
        0xFF, 0xD9  // End of image
    ];

    fn parser(data: &[u8]) -> JPEGParser<'static, MemorySource<'_>> {
        JPEGParser::new(MemorySource::new(data), ErrorContext::new())
    }

    #[test]
    fn read_words() {
        let mut reader = parser(&TEST_HEADER);
        assert_eq!(reader.read_next_byte().unwrap(), 0xFF);
        assert_eq!(reader.read_next_byte().unwrap(), 0xD8);

        assert_eq!(reader.read_next_word().unwrap(), 0xFFC0);
        assert_eq!(reader.position(), 4);
    }

    #[test]
    fn read_markers() {
        let mut reader = parser(&TEST_HEADER);
        assert_eq!(reader.read_first_marker().unwrap(), JPEGMarker::SOI);
        assert_eq!(reader.read_next_marker().unwrap(), JPEGMarker::SOF0);
        assert!(reader.skip_marker_with_length().is_ok());
        assert_eq!(reader.read_next_marker().unwrap(), JPEGMarker::COM);
        assert!(reader.skip_marker_with_length().is_ok());
        assert_eq!(reader.read_next_marker().unwrap(), JPEGMarker::EOI);
        assert_eq!(reader.err().num_warnings(), 0);
    }

    #[test]
    fn missing_soi_is_rejected() {
        let mut reader = parser(&TEST_HEADER[2..]);
        assert_eq!(
            reader.read_first_marker(),
            Err(Error::Malformed("Not a JPEG file: missing SOI marker"))
        );
    }

    #[test]
    fn garbage_before_marker_is_skipped_with_warning() {
        let data = [0x12, 0x34, 0xFF, 0x00, 0xFF, 0xFF, 0xDB];
        let mut reader = parser(&data);
        assert_eq!(reader.read_next_marker().unwrap(), JPEGMarker::DQT);
        assert_eq!(reader.err().num_warnings(), 1);
    }

    #[test]
    fn reading_past_the_end_yields_fake_eoi() {
        let data = [0xFF, 0xD8];
        let mut reader = parser(&data);
        reader.read_first_marker().unwrap();
        assert_eq!(reader.read_next_marker().unwrap(), JPEGMarker::EOI);
        assert_eq!(reader.read_next_marker().unwrap(), JPEGMarker::EOI);
        assert_eq!(reader.err().num_warnings(), 2);
    }

    #[test]
    fn short_segment_length_is_malformed() {
        let data = [0x00, 0x01];
        let mut reader = parser(&data);
        assert_eq!(
            reader.skip_marker_with_length(),
            Err(Error::Malformed("Bogus marker length"))
        );
    }

    #[test]
    fn unknown_marker_codes_are_rejected() {
        assert!(JPEGMarker::from_code(0x02).is_err());
        assert_eq!(JPEGMarker::from_code(0xD3).unwrap(), JPEGMarker::RST3);
        assert!(JPEGMarker::RST3.is_restart());
        assert!(JPEGMarker::EOI.is_standalone());
        assert!(!JPEGMarker::SOS.is_standalone());
    }
}
