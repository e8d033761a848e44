use std::io::{self, Write};

use memjpeg::Image;

/// Binary (P6) PPM encoder
pub struct PPMEncoder<'image> {
    image: &'image Image,
}

impl<'image> PPMEncoder<'image> {
    pub fn new(image: &'image Image) -> Self {
        Self { image }
    }

    /// Writes the header and the raw RGB samples row by row.
    pub fn encode<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "P6\n{} {}\n255\n", self.image.width(), self.image.height())?;
        for y in 0..self.image.height() {
            if let Some(row) = self.image.row(y) {
                out.write_all(row)?;
            }
        }
        out.flush()
    }
}
