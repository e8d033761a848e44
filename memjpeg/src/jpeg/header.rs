use std::collections::HashMap;

use super::{
    jpeg_reader::{JPEGMarker, JPEGParser},
    ColorSpace, Result,
};
use crate::{error::Error, source::SourceManager};

/// Most components a frame may declare.
pub const MAX_COMPONENTS: usize = 10;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanTableType {
    #[default]
    Ac,
    Dc,
}

/// Defines a JPEG huffman table
#[derive(Debug, Default, Clone)]
pub struct HuffmanTable {
    pub table_type: HuffmanTableType,
    pub destination_id: u8,
    pub bitcode_counts: [u8; 16],
    pub symbols: Vec<u8>,
    /// Largest code of each length, -1 if there is none. Indexed by length.
    maxcode: [i32; 17],
    /// Added to a code of a given length to get its index into `symbols`.
    valoffset: [i32; 17],
}

impl HuffmanTable {
    fn generate_codes(&mut self) -> Result<()> {
        let mut code: i32 = 0;
        let mut index: i32 = 0;
        for length in 1..=16 {
            let count = self.bitcode_counts[length - 1] as i32;
            if count == 0 {
                self.maxcode[length] = -1;
            } else {
                self.valoffset[length] = index - code;
                code += count;
                index += count;
                self.maxcode[length] = code - 1;
            }

            if code > (1 << length) {
                return Err(Error::Malformed("Bogus Huffman table definition"));
            }
            code <<= 1;
        }
        Ok(())
    }

    /// Symbol for `code` if it is a complete code of `length` bits.
    pub fn lookup(&self, length: usize, code: i32) -> Option<u8> {
        if code > *self.maxcode.get(length)? {
            return None;
        }
        let index = usize::try_from(code + self.valoffset[length]).ok()?;
        self.symbols.get(index).copied()
    }
}

/// Quantization values, kept in zigzag order like they are stored.
#[derive(Debug, Clone)]
pub struct QuantizationTable {
    pub table: [u16; 64],
}

#[derive(Debug, Default, Clone)]
pub struct FrameComponent {
    pub identifier: u8,
    pub xy_sampling_factor: (u8, u8),
    pub qtable_id: u8,
}

#[derive(Debug, Default, Clone)]
pub struct ScanComponent {
    /// Position of the component in the frame header.
    pub component_index: usize,
    pub dc_table: u8,
    pub ac_table: u8,
}

#[derive(Debug, Default)]
pub struct ScanInfo {
    pub components: Vec<ScanComponent>,
    pub spectral_selection: (u8, u8),
    pub successive_approximation: u8,
}

#[derive(Debug, Default)]
pub struct FrameInfo {
    pub precision: u8,
    pub image_size: (u16, u16),
    pub components: Vec<FrameComponent>,
}

/// Everything up to and including the first SOS marker.
#[derive(Debug, Default)]
pub struct HeaderInfo {
    pub frame_info: FrameInfo,
    pub scan_info: ScanInfo,
    pub ac_huff_tables: HashMap<u8, HuffmanTable>,
    pub dc_huff_tables: HashMap<u8, HuffmanTable>,
    pub quant_tables: HashMap<u8, QuantizationTable>,
    pub restart_interval: u16,
    pub saw_jfif: bool,
    pub adobe_transform: Option<u8>,
}

impl HeaderInfo {
    fn read_start_of_frame<S: SourceManager>(reader: &mut JPEGParser<S>) -> Result<FrameInfo> {
        let struct_size = reader.read_segment_length()?;

        let precision = reader.read_next_byte()?;

        let height = reader.read_next_word()?;
        let width = reader.read_next_word()?;

        let component_count = reader.read_next_byte()?;

        if struct_size != 6 + 3 * component_count as usize {
            return Err(Error::Malformed("Bogus marker length"));
        }
        if precision != 8 {
            return Err(Error::UnsupportedFeature("only 8-bit samples are supported"));
        }
        if width == 0 || height == 0 || component_count == 0 {
            return Err(Error::Malformed("Empty JPEG image (DNL not supported)"));
        }
        if component_count as usize > MAX_COMPONENTS {
            return Err(Error::UnsupportedFeature("too many color components"));
        }

        let mut components: Vec<FrameComponent> = Vec::with_capacity(component_count as usize);

        for _ in 0..component_count {
            let identifier = reader.read_next_byte()?;
            if components.iter().any(|c| c.identifier == identifier) {
                return Err(Error::Malformed("Duplicate component identifier"));
            }

            let sample_factors = reader.read_next_byte()?;
            let xy_sampling_factor = (sample_factors >> 4, sample_factors & 0x0F);
            if !(1..=4).contains(&xy_sampling_factor.0) || !(1..=4).contains(&xy_sampling_factor.1)
            {
                return Err(Error::Malformed("Bogus sampling factors"));
            }

            let qtable_id = reader.read_next_byte()?;
            if qtable_id > 3 {
                return Err(Error::Malformed("Bogus quantization table index"));
            }

            components.push(FrameComponent {
                identifier,
                xy_sampling_factor,
                qtable_id,
            })
        }

        Ok(FrameInfo {
            precision,
            image_size: (width, height),
            components,
        })
    }

    fn read_quantization_tables<S: SourceManager>(
        reader: &mut JPEGParser<S>,
    ) -> Result<HashMap<u8, QuantizationTable>> {
        let mut remaining = reader.read_segment_length()?;

        let mut quant_tables: HashMap<u8, QuantizationTable> = HashMap::new();

        while remaining > 0 {
            let table_info = reader.read_next_byte()?;
            let precision = table_info >> 4;
            let destination_id = table_info & 0x0F;
            if destination_id > 3 {
                return Err(Error::Malformed("Bogus quantization table index"));
            }

            let table_size = match precision {
                0 => 1 + 64,
                1 => 1 + 128,
                _ => return Err(Error::Malformed("Invalid precision value")),
            };
            remaining = remaining
                .checked_sub(table_size)
                .ok_or(Error::Malformed("Bogus marker length"))?;

            let mut table = [0u16; 64];
            for value in table.iter_mut() {
                *value = match precision {
                    0 => reader.read_next_byte()? as u16,
                    _ => reader.read_next_word()?,
                }
            }

            quant_tables.insert(
                destination_id,
                QuantizationTable { table },
            );
        }

        Ok(quant_tables)
    }

    fn read_huffman_tables<S: SourceManager>(
        reader: &mut JPEGParser<S>,
    ) -> Result<Vec<HuffmanTable>> {
        let mut remaining = reader.read_segment_length()?;

        let mut tables = Vec::new();

        while remaining > 0 {
            remaining = remaining
                .checked_sub(17)
                .ok_or(Error::Malformed("Bogus marker length"))?;

            let table_info = reader.read_next_byte()?;
            let table_type = match table_info >> 4 {
                0 => HuffmanTableType::Dc,
                1 => HuffmanTableType::Ac,
                _ => return Err(Error::Malformed("Invalid table type")),
            };

            let destination_id = table_info & 0x0F;
            if destination_id > 3 {
                return Err(Error::Malformed("Bogus Huffman table index"));
            }

            let mut bitcode_counts: [u8; 16] = [0; 16];
            for count in bitcode_counts.iter_mut() {
                *count = reader.read_next_byte()?;
            }

            let size: usize = bitcode_counts
                .iter()
                .fold(0, |total, elem| total + *elem as usize);
            if size > 256 || size > remaining {
                return Err(Error::Malformed("Bogus Huffman table definition"));
            }
            remaining -= size;

            let mut symbols = vec![0u8; size];
            for symbol in symbols.iter_mut() {
                *symbol = reader.read_next_byte()?;
            }

            let mut table = HuffmanTable {
                table_type,
                destination_id,
                bitcode_counts,
                symbols,
                ..Default::default()
            };
            table.generate_codes()?;
            tables.push(table);
        }

        Ok(tables)
    }

    fn read_restart_interval<S: SourceManager>(reader: &mut JPEGParser<S>) -> Result<u16> {
        if reader.read_segment_length()? != 2 {
            return Err(Error::Malformed("Bogus marker length"));
        }
        reader.read_next_word()
    }

    /// Reads up to `want` bytes of an APPn payload and skips the rest.
    fn read_app_prefix<S: SourceManager>(
        reader: &mut JPEGParser<S>,
        want: usize,
    ) -> Result<Vec<u8>> {
        let length = reader.read_segment_length()?;
        let take = want.min(length);
        let mut prefix = Vec::with_capacity(take);
        for _ in 0..take {
            prefix.push(reader.read_next_byte()?);
        }
        reader.skip(length - take);
        Ok(prefix)
    }

    /// Reads data from the scan header, leaving the cursor at the start of the scan stream.
    fn read_start_of_scan<S: SourceManager>(
        reader: &mut JPEGParser<S>,
        frame: &FrameInfo,
    ) -> Result<ScanInfo> {
        let struct_size = reader.read_segment_length()?;

        let component_count = reader.read_next_byte()?;
        if struct_size != 4 + 2 * component_count as usize
            || component_count == 0
            || component_count > 4
        {
            return Err(Error::Malformed("Bogus marker length"));
        }

        let mut components: Vec<ScanComponent> = Vec::with_capacity(component_count as usize);
        for _ in 0..component_count {
            let selector = reader.read_next_byte()?;
            let component_index = frame
                .components
                .iter()
                .position(|c| c.identifier == selector)
                .ok_or(Error::Malformed("Invalid component ID in SOS"))?;
            if components
                .iter()
                .any(|c| c.component_index == component_index)
            {
                return Err(Error::Malformed("Invalid component ID in SOS"));
            }

            let tables = reader.read_next_byte()?;
            let dc_table = tables >> 4;
            let ac_table = tables & 0x0F;
            if dc_table > 3 || ac_table > 3 {
                return Err(Error::Malformed("Bogus Huffman table index"));
            }

            components.push(ScanComponent {
                component_index,
                dc_table,
                ac_table,
            });
        }

        let spectral_selection_start = reader.read_next_byte()?;
        let spectral_selection_end = reader.read_next_byte()?;

        let successive_approximation = reader.read_next_byte()?;

        if spectral_selection_start != 0
            || spectral_selection_end != 63
            || successive_approximation != 0
        {
            return Err(Error::Malformed(
                "Invalid progression parameters for a sequential scan",
            ));
        }
        if components.len() != frame.components.len() {
            return Err(Error::UnsupportedFeature("multi-scan sequential JPEG"));
        }

        Ok(ScanInfo {
            components,
            spectral_selection: (spectral_selection_start, spectral_selection_end),
            successive_approximation,
        })
    }

    /// Reads header info through a JPEGParser positioned at the start of a JPEG data stream.
    /// It returns when it finds the start of scan marker, reads its header, and leaves the
    /// cursor at the scan stream.
    pub fn read_header_info<S: SourceManager>(reader: &mut JPEGParser<S>) -> Result<Self> {
        reader.read_first_marker()?;

        let mut result: Self = Default::default();
        let mut frame: Option<FrameInfo> = None;

        loop {
            let marker = reader.read_next_marker()?;

            match marker {
                JPEGMarker::SOF0 | JPEGMarker::SOF1 => {
                    if frame.is_some() {
                        return Err(Error::Malformed("Invalid JPEG file structure: two SOF markers"));
                    }
                    frame = Some(Self::read_start_of_frame(reader)?);
                }
                JPEGMarker::SOF2 | JPEGMarker::SOF6 | JPEGMarker::SOF10 | JPEGMarker::SOF14 => {
                    return Err(Error::UnsupportedFeature("progressive JPEG"));
                }
                JPEGMarker::SOF3 | JPEGMarker::SOF7 | JPEGMarker::SOF11 | JPEGMarker::SOF15 => {
                    return Err(Error::UnsupportedFeature("lossless JPEG"));
                }
                JPEGMarker::SOF5 | JPEGMarker::SOF9 | JPEGMarker::SOF13 | JPEGMarker::DAC => {
                    return Err(Error::UnsupportedFeature("arithmetic or hierarchical JPEG"));
                }
                JPEGMarker::DHP | JPEGMarker::EXP => {
                    return Err(Error::UnsupportedFeature("hierarchical JPEG"));
                }
                JPEGMarker::DHT => {
                    for table in Self::read_huffman_tables(reader)? {
                        match table.table_type {
                            HuffmanTableType::Ac => {
                                result.ac_huff_tables.insert(table.destination_id, table)
                            }
                            HuffmanTableType::Dc => {
                                result.dc_huff_tables.insert(table.destination_id, table)
                            }
                        };
                    }
                }
                JPEGMarker::DQT => {
                    result
                        .quant_tables
                        .extend(Self::read_quantization_tables(reader)?);
                }
                JPEGMarker::DRI => {
                    result.restart_interval = Self::read_restart_interval(reader)?;
                }
                JPEGMarker::APP0 => {
                    let prefix = Self::read_app_prefix(reader, 5)?;
                    if prefix == b"JFIF\0" {
                        result.saw_jfif = true;
                    }
                }
                JPEGMarker::APP14 => {
                    let prefix = Self::read_app_prefix(reader, 12)?;
                    if prefix.len() == 12 && prefix.starts_with(b"Adobe") {
                        result.adobe_transform = Some(prefix[11]);
                    }
                }
                JPEGMarker::SOI => {
                    return Err(Error::Malformed("Invalid JPEG file structure: two SOI markers"));
                }
                JPEGMarker::EOI => {
                    return Err(Error::Malformed("JPEG datastream contains no image"));
                }
                JPEGMarker::SOS => {
                    let frame = frame.ok_or(Error::Malformed(
                        "Invalid JPEG file structure: SOS before SOF",
                    ))?;
                    result.scan_info = Self::read_start_of_scan(reader, &frame)?;
                    result.frame_info = frame;
                    return Ok(result);
                }
                marker if marker.is_standalone() => {} // Stray RSTn or TEM
                _ => {
                    reader.skip_marker_with_length()?; // APPn, COM, DNL, JPGn
                }
            }
        }
    }

    /// Color space the components are encoded in.
    pub fn jpeg_color_space(&self) -> ColorSpace {
        let components = &self.frame_info.components;
        match components.len() {
            1 => ColorSpace::Grayscale,
            3 => {
                if self.saw_jfif {
                    ColorSpace::YCbCr
                } else if let Some(transform) = self.adobe_transform {
                    if transform == 0 {
                        ColorSpace::Rgb
                    } else {
                        ColorSpace::YCbCr
                    }
                } else if components[0].identifier == b'R'
                    && components[1].identifier == b'G'
                    && components[2].identifier == b'B'
                {
                    ColorSpace::Rgb
                } else {
                    ColorSpace::YCbCr
                }
            }
            4 => match self.adobe_transform {
                Some(2) => ColorSpace::Ycck,
                _ => ColorSpace::Cmyk,
            },
            _ => ColorSpace::Unknown,
        }
    }

    /// Color space decoded pixels come out in unless told otherwise.
    pub fn default_out_color_space(&self) -> ColorSpace {
        match self.jpeg_color_space() {
            ColorSpace::Grayscale => ColorSpace::Grayscale,
            ColorSpace::YCbCr | ColorSpace::Rgb => ColorSpace::Rgb,
            ColorSpace::Cmyk | ColorSpace::Ycck => ColorSpace::Cmyk,
            ColorSpace::Unknown => ColorSpace::Unknown,
        }
    }
}
