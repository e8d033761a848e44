use crate::{
    error::{Error, Warning},
    jpeg::{jpeg_reader::JPEGParser, Result},
    source::SourceManager,
};

/// Bit reader over the entropy-coded segment. Undoes byte stuffing and stops at the first
/// marker, after which it supplies zero bits.
#[derive(Debug, Default)]
pub struct Bitstream {
    bit_buffer: u64,
    bits_left: u32,
    unread_marker: Option<u8>,
    insufficient_data: bool,
}

impl Bitstream {
    /// Creates a new bitstream.
    pub fn new() -> Self {
        Self::default()
    }

    fn fill<S: SourceManager>(&mut self, reader: &mut JPEGParser<S>, bits: u32) -> Result<()> {
        while self.bits_left < bits {
            let byte = match self.unread_marker {
                Some(_) => None,
                None => {
                    let byte = reader.read_next_byte()?;
                    if byte != 0xFF {
                        Some(byte)
                    } else {
                        let mut next = reader.read_next_byte()?;
                        while next == 0xFF {
                            next = reader.read_next_byte()?;
                        }
                        if next == 0x00 {
                            Some(0xFF)
                        } else {
                            self.unread_marker = Some(next);
                            None
                        }
                    }
                }
            };

            let byte = match byte {
                Some(byte) => byte,
                None => {
                    if !self.insufficient_data {
                        reader.warn(Warning::HitMarker);
                        self.insufficient_data = true;
                    }
                    0
                }
            };

            self.bit_buffer = (self.bit_buffer << 8) | byte as u64;
            self.bits_left += 8;
        }
        Ok(())
    }

    /// Reads up to 16 bits out of the bitstream, most significant first.
    pub fn read_bits<S: SourceManager>(
        &mut self,
        reader: &mut JPEGParser<S>,
        bits: u32,
    ) -> Result<u32> {
        if bits == 0 {
            return Ok(0);
        }
        if bits > 16 {
            return Err(Error::BadState("Can't read more than 16 bits at a time"));
        }

        self.fill(reader, bits)?;
        self.bits_left -= bits;
        let value = (self.bit_buffer >> self.bits_left) & ((1u64 << bits) - 1);
        Ok(value as u32)
    }

    /// Drops the bits of the current byte. Used at restart markers and at the end of the scan.
    pub fn discard_buffer(&mut self) {
        self.bit_buffer = 0;
        self.bits_left = 0;
    }

    /// Marker that ended the segment, if one was hit.
    pub fn take_unread_marker(&mut self) -> Option<u8> {
        self.unread_marker.take()
    }

    /// Puts back a marker that was read but not handled.
    pub fn set_unread_marker(&mut self, marker: u8) {
        self.unread_marker = Some(marker);
    }

    /// Whether the segment ended early and zeros are being supplied.
    pub fn insufficient_data(&self) -> bool {
        self.insufficient_data
    }

    /// Clears the early-end state after a proper restart marker.
    pub fn resume(&mut self) {
        self.insufficient_data = false;
    }
}
