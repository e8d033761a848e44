use std::f32::consts::PI;

use super::{
    header::{HeaderInfo, HuffmanTable},
    jpeg_reader::{JPEGMarker, JPEGParser},
    ColorSpace, Result,
};
use crate::{
    bitstream::Bitstream,
    error::{Error, Warning},
    source::SourceManager,
};

#[rustfmt::skip]
pub const ZIGZAG_MAP: &[(u8, u8)] =
    &[(0, 0), (0, 1), (1, 0), (2, 0), (1, 1), (0, 2), (0, 3), (1, 2),
          (2, 1), (3, 0), (4, 0), (3, 1), (2, 2), (1, 3), (0, 4), (0, 5),
          (1, 4), (2, 3), (3, 2), (4, 1), (5, 0), (6, 0), (5, 1), (4, 2),
          (3, 3), (2, 4), (1, 5), (0, 6), (0, 7), (1, 6), (2, 5), (3, 4),
          (4, 3), (5, 2), (6, 1), (7, 0), (7, 1), (6, 2), (5, 3), (4, 4),
          (3, 5), (2, 6), (1, 7), (2, 7), (3, 6), (4, 5), (5, 4), (6, 3),
          (7, 2), (7, 3), (6, 4), (5, 5), (4, 6), (3, 7), (4, 7), (5, 6),
          (6, 5), (7, 4), (7, 5), (6, 6), (5, 7), (6, 7), (7, 6), (7, 7)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorTransform {
    YCbCrToRgb,
    RgbToRgb,
}

/// Per-component decoding state. Samples for one MCU row live in `plane`.
#[derive(Debug)]
struct ComponentState {
    xy_sampling_factor: (usize, usize),
    qtable: [u16; 64],
    dc_table: HuffmanTable,
    ac_table: HuffmanTable,
    dc_prediction: i32,
    plane: Vec<u8>,
    stride: usize,
}

/// Decodes the entropy-coded scan one MCU row at a time and hands out RGB scanlines.
#[derive(Debug)]
pub struct ScanDecoder {
    components: Vec<ComponentState>,
    scan_order: Vec<usize>,
    transform: ColorTransform,
    image_size: (usize, usize),
    max_xy_sampling_factor: (usize, usize),
    mcus_per_row: usize,
    mcu_rows_decoded: usize,
    restart_interval: u16,
    restarts_to_go: u16,
    next_restart_num: u8,
    bitstream: Bitstream,
    rows: Vec<u8>,
    rows_in_buffer: usize,
    next_row: usize,
    idct_table: [[f32; 8]; 8],
}

impl ScanDecoder {
    pub fn new(header: &HeaderInfo) -> Result<Self> {
        let transform = match header.jpeg_color_space() {
            ColorSpace::YCbCr => ColorTransform::YCbCrToRgb,
            ColorSpace::Rgb => ColorTransform::RgbToRgb,
            _ => return Err(Error::UnsupportedFeature("color conversion to RGB")),
        };

        let frame = &header.frame_info;
        let mut components = Vec::with_capacity(frame.components.len());
        for component in &frame.components {
            let qtable = header
                .quant_tables
                .get(&component.qtable_id)
                .ok_or(Error::Malformed("Quantization table was not defined"))?
                .table;
            components.push((component, qtable));
        }

        let max_xy_sampling_factor = frame.components.iter().fold((1, 1), |max, c| {
            (
                max.0.max(c.xy_sampling_factor.0 as usize),
                max.1.max(c.xy_sampling_factor.1 as usize),
            )
        });

        let image_size = (
            frame.image_size.0 as usize,
            frame.image_size.1 as usize,
        );
        let mcu_size = (8 * max_xy_sampling_factor.0, 8 * max_xy_sampling_factor.1);
        let mcus_per_row = image_size.0.div_ceil(mcu_size.0);

        let mut states: Vec<Option<ComponentState>> = Vec::new();
        states.resize_with(components.len(), || None);
        let mut scan_order = Vec::with_capacity(header.scan_info.components.len());
        for scan in &header.scan_info.components {
            let (component, qtable) = components[scan.component_index];
            let dc_table = header
                .dc_huff_tables
                .get(&scan.dc_table)
                .ok_or(Error::Malformed("Huffman table was not defined"))?
                .clone();
            let ac_table = header
                .ac_huff_tables
                .get(&scan.ac_table)
                .ok_or(Error::Malformed("Huffman table was not defined"))?
                .clone();

            let xy_sampling_factor = (
                component.xy_sampling_factor.0 as usize,
                component.xy_sampling_factor.1 as usize,
            );
            let stride = mcus_per_row * xy_sampling_factor.0 * 8;
            states[scan.component_index] = Some(ComponentState {
                xy_sampling_factor,
                qtable,
                dc_table,
                ac_table,
                dc_prediction: 0,
                plane: vec![0; stride * xy_sampling_factor.1 * 8],
                stride,
            });
            scan_order.push(scan.component_index);
        }
        let components = states
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(Error::UnsupportedFeature("multi-scan sequential JPEG"))?;

        Ok(Self {
            components,
            scan_order,
            transform,
            image_size,
            max_xy_sampling_factor,
            mcus_per_row,
            mcu_rows_decoded: 0,
            restart_interval: header.restart_interval,
            restarts_to_go: header.restart_interval,
            next_restart_num: 0,
            bitstream: Bitstream::new(),
            rows: vec![0; mcu_size.1 * image_size.0 * 3],
            rows_in_buffer: 0,
            next_row: 0,
            idct_table: idct_table(),
        })
    }

    /// Copies the next scanline into `row`, decoding another MCU row when the buffered ones
    /// are used up.
    pub fn read_row<S: SourceManager>(
        &mut self,
        reader: &mut JPEGParser<S>,
        row: &mut [u8],
    ) -> Result<()> {
        let row_stride = self.image_size.0 * 3;
        if row.len() < row_stride {
            return Err(Error::BadState("scanline buffer too short"));
        }

        if self.next_row == self.rows_in_buffer {
            self.decode_mcu_row(reader)?;
        }

        let start = self.next_row * row_stride;
        row[..row_stride].copy_from_slice(&self.rows[start..start + row_stride]);
        self.next_row += 1;
        Ok(())
    }

    fn decode_mcu_row<S: SourceManager>(&mut self, reader: &mut JPEGParser<S>) -> Result<()> {
        let mcu_height = 8 * self.max_xy_sampling_factor.1;
        let first_row = self.mcu_rows_decoded * mcu_height;
        if first_row >= self.image_size.1 {
            return Err(Error::BadState("all scanlines already decoded"));
        }

        for mcu_x in 0..self.mcus_per_row {
            if self.restart_interval != 0 {
                if self.restarts_to_go == 0 {
                    self.process_restart(reader)?;
                }
                self.restarts_to_go -= 1;
            }

            for &index in &self.scan_order {
                let component = &mut self.components[index];
                let (h, v) = component.xy_sampling_factor;
                for block_y in 0..v {
                    for block_x in 0..h {
                        let mut coefficients = [0i32; 64];
                        if !self.bitstream.insufficient_data() {
                            decode_block(
                                &mut self.bitstream,
                                reader,
                                &component.dc_table,
                                &component.ac_table,
                                &mut component.dc_prediction,
                                &mut coefficients,
                            )?;
                        }

                        let samples = idct(&coefficients, &component.qtable, &self.idct_table);

                        let base_x = (mcu_x * h + block_x) * 8;
                        let base_y = block_y * 8;
                        for (y, line) in samples.chunks_exact(8).enumerate() {
                            let start = (base_y + y) * component.stride + base_x;
                            component.plane[start..start + 8].copy_from_slice(line);
                        }
                    }
                }
            }
        }

        let rows = mcu_height.min(self.image_size.1 - first_row);
        self.color_convert(rows);
        self.mcu_rows_decoded += 1;
        self.rows_in_buffer = rows;
        self.next_row = 0;
        Ok(())
    }

    fn color_convert(&mut self, rows: usize) {
        let (max_h, max_v) = self.max_xy_sampling_factor;
        let width = self.image_size.0;
        for y in 0..rows {
            let out = &mut self.rows[y * width * 3..(y + 1) * width * 3];
            for (x, pixel) in out.chunks_exact_mut(3).enumerate() {
                // Subsampled components are stretched by repeating samples.
                let mut sample = [0u8; 3];
                for (value, component) in sample.iter_mut().zip(&self.components) {
                    let (h, v) = component.xy_sampling_factor;
                    let sy = y * v / max_v;
                    let sx = x * h / max_h;
                    *value = component.plane[sy * component.stride + sx];
                }

                let rgb = match self.transform {
                    ColorTransform::YCbCrToRgb => ycbcr_to_rgb(sample),
                    ColorTransform::RgbToRgb => sample,
                };
                pixel.copy_from_slice(&rgb);
            }
        }
    }

    fn process_restart<S: SourceManager>(&mut self, reader: &mut JPEGParser<S>) -> Result<()> {
        self.bitstream.discard_buffer();

        let code = match self.bitstream.take_unread_marker() {
            Some(code) => code,
            None => reader.read_next_marker_code()?,
        };

        let expected = 0xD0 + self.next_restart_num;
        if code == expected {
            self.bitstream.resume();
        } else {
            reader.warn(Warning::UnexpectedRestart {
                expected: self.next_restart_num,
                found: code,
            });
            if JPEGMarker::from_code(code).is_ok_and(JPEGMarker::is_restart) {
                self.bitstream.resume();
            } else {
                // Leave it for the end of the scan and keep filling with zeros.
                self.bitstream.set_unread_marker(code);
            }
        }

        for component in &mut self.components {
            component.dc_prediction = 0;
        }
        self.restarts_to_go = self.restart_interval;
        self.next_restart_num = (self.next_restart_num + 1) & 7;
        Ok(())
    }

    /// Consumes whatever is left of the datastream up to EOI.
    pub fn finish<S: SourceManager>(&mut self, reader: &mut JPEGParser<S>) -> Result<()> {
        self.bitstream.discard_buffer();

        let mut code = match self.bitstream.take_unread_marker() {
            Some(code) => code,
            None => reader.read_next_marker_code()?,
        };

        loop {
            match JPEGMarker::from_code(code)? {
                JPEGMarker::EOI => return Ok(()),
                marker if marker.is_standalone() => {}
                _ => reader.skip_marker_with_length()?,
            }
            code = reader.read_next_marker_code()?;
        }
    }
}

fn decode_huffman<S: SourceManager>(
    bitstream: &mut Bitstream,
    reader: &mut JPEGParser<S>,
    table: &HuffmanTable,
) -> Result<u8> {
    let mut code = bitstream.read_bits(reader, 1)? as i32;

    for length in 1..=16 {
        if let Some(symbol) = table.lookup(length, code) {
            return Ok(symbol);
        }
        if length < 16 {
            code = (code << 1) | bitstream.read_bits(reader, 1)? as i32;
        }
    }

    // Treated as a zero symbol so decoding can go on.
    reader.warn(Warning::BadHuffmanCode);
    Ok(0)
}

/// EXTEND: values with the top bit clear are negative.
fn extend(value: u32, bits: u32) -> i32 {
    let value = value as i32;
    if value < (1 << (bits - 1)) {
        value - (1 << bits) + 1
    } else {
        value
    }
}

/// Decodes one 8x8 block of coefficients, left in zigzag order.
/// https://www.w3.org/Graphics/JPEG/itu-t81.pdf F.2.2 Page 104
fn decode_block<S: SourceManager>(
    bitstream: &mut Bitstream,
    reader: &mut JPEGParser<S>,
    dc_table: &HuffmanTable,
    ac_table: &HuffmanTable,
    dc_prediction: &mut i32,
    coefficients: &mut [i32; 64],
) -> Result<()> {
    let dc_code = decode_huffman(bitstream, reader, dc_table)? as u32;
    if dc_code > 15 {
        return Err(Error::Malformed("Corrupt JPEG data: bad DC coefficient size"));
    }
    let diff = if dc_code == 0 {
        0
    } else {
        extend(bitstream.read_bits(reader, dc_code)?, dc_code)
    };
    *dc_prediction = dc_prediction.wrapping_add(diff);
    coefficients[0] = *dc_prediction;

    let mut k = 1;
    while k < 64 {
        let huffman_val = decode_huffman(bitstream, reader, ac_table)?;
        let run_length = (huffman_val >> 4) as usize;
        let code_length = (huffman_val & 0x0F) as u32;

        if code_length != 0 {
            k += run_length;
            if k > 63 {
                break;
            }
            coefficients[k] = extend(bitstream.read_bits(reader, code_length)?, code_length);
        } else if run_length == 15 {
            k += 15; // ZRL, the 16th zero comes from the increment below
        } else {
            break; // EOB
        }
        k += 1;
    }
    Ok(())
}

/// C(u) * cos((2x + 1) * u * PI / 16), indexed [x][u].
fn idct_table() -> [[f32; 8]; 8] {
    let mut table = [[0f32; 8]; 8];
    for (x, row) in table.iter_mut().enumerate() {
        for (u, value) in row.iter_mut().enumerate() {
            let cu = if u == 0 { 1f32 / 2f32.sqrt() } else { 1f32 };
            *value = cu * f32::cos(((2 * x + 1) as f32 * u as f32 * PI) / 16f32);
        }
    }
    table
}

/// Dequantizes, unzigzags and inverse transforms a block, returning level-shifted samples
/// in row order.
/// https://www.w3.org/Graphics/JPEG/itu-t81.pdf A.3.3 Page 27
fn idct(coefficients: &[i32; 64], qtable: &[u16; 64], table: &[[f32; 8]; 8]) -> [u8; 64] {
    let mut block = [0f32; 64];
    for (i, &(row, col)) in ZIGZAG_MAP.iter().enumerate() {
        block[row as usize * 8 + col as usize] = coefficients[i] as f32 * qtable[i] as f32;
    }

    // Rows first, then columns.
    let mut partial = [0f32; 64];
    for v in 0..8 {
        for x in 0..8 {
            let mut sum = 0f32;
            for u in 0..8 {
                sum += table[x][u] * block[v * 8 + u];
            }
            partial[v * 8 + x] = sum;
        }
    }

    let mut samples = [0u8; 64];
    for x in 0..8 {
        for y in 0..8 {
            let mut sum = 0f32;
            for v in 0..8 {
                sum += table[y][v] * partial[v * 8 + x];
            }
            samples[y * 8 + x] = clamp_sample(sum / 4f32 + 128f32);
        }
    }
    samples
}

fn clamp_sample(value: f32) -> u8 {
    value.round().clamp(0f32, 255f32) as u8
}

fn ycbcr_to_rgb(y_cb_cr: [u8; 3]) -> [u8; 3] {
    let lum = y_cb_cr[0] as f32;
    let cb = y_cb_cr[1] as f32 - 128f32;
    let cr = y_cb_cr[2] as f32 - 128f32;

    let red = lum + cr * (2f32 - 2f32 * 0.299);
    let blue = lum + cb * (2f32 - 2f32 * 0.114);
    let green = (lum - (0.114 * blue) - (0.299 * red)) / 0.587;

    [clamp_sample(red), clamp_sample(green), clamp_sample(blue)]
}
