#![allow(dead_code)]

use image::{codecs::jpeg::JpegEncoder, ExtendedColorType};

/// Encodes an RGB image built from `pixel` at the highest quality.
pub fn encode_rgb(width: u32, height: u32, pixel: impl Fn(u32, u32) -> [u8; 3]) -> Vec<u8> {
    let mut samples = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            samples.extend_from_slice(&pixel(x, y));
        }
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 100)
        .encode(&samples, width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// Encodes a single-component image.
pub fn encode_gray(width: u32, height: u32) -> Vec<u8> {
    let samples: Vec<u8> = (0..width * height).map(|i| (i % 251) as u8).collect();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode(&samples, width, height, ExtendedColorType::L8)
        .unwrap();
    out
}

/// Headers of a four component Adobe JPEG, up to and including SOS.
pub fn cmyk_header(width: u16, height: u16) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xEE, 0x00, 0x0E];
    data.extend_from_slice(b"Adobe");
    data.extend_from_slice(&[0x00, 0x64, 0x00, 0x00, 0x00, 0x00, 0x00]);
    data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x14, 0x08]);
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&width.to_be_bytes());
    data.push(0x04);
    for id in 1..=4 {
        data.extend_from_slice(&[id, 0x11, 0x00]);
    }
    data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x0E, 0x04]);
    for id in 1..=4 {
        data.extend_from_slice(&[id, 0x00]);
    }
    data.extend_from_slice(&[0x00, 0x3F, 0x00]);
    data
}

/// A mid-grey image `8 * mcus` pixels wide and 8 high, built by hand: unit quantization,
/// one-code Huffman tables, every MCU all zeros. With `restart` set, a DRI of one MCU is
/// written and RSTn markers, numbered from the given index, go between the MCUs.
pub fn grey_jpeg(mcus: u16, restart: Option<u8>) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x43, 0x00];
    data.extend_from_slice(&[1; 64]);
    data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x08]);
    data.extend_from_slice(&(mcus * 8).to_be_bytes());
    data.extend_from_slice(&[0x03, 0x01, 0x11, 0x00, 0x02, 0x11, 0x00, 0x03, 0x11, 0x00]);
    for class in [0x00, 0x10] {
        data.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x14, class, 0x01]);
        data.extend_from_slice(&[0; 15]);
        data.push(0x00);
    }
    if restart.is_some() {
        data.extend_from_slice(&[0xFF, 0xDD, 0x00, 0x04, 0x00, 0x01]);
    }
    data.extend_from_slice(&[
        0xFF, 0xDA, 0x00, 0x0C, 0x03, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x3F, 0x00,
    ]);

    // Six zero bits per MCU (DC category 0 then EOB for each component). Each entropy
    // coded segment is padded to a byte with ones.
    match restart {
        Some(first_restart) => {
            for mcu in 0..mcus {
                if mcu > 0 {
                    let index = (first_restart as u16 + mcu - 1) % 8;
                    data.extend_from_slice(&[0xFF, 0xD0 + index as u8]);
                }
                data.push(0x03);
            }
        }
        None => {
            let bits = 6 * mcus as usize;
            let bytes = bits.div_ceil(8);
            let padding = bytes * 8 - bits;
            data.resize(data.len() + bytes - 1, 0x00);
            data.push(((1u16 << padding) - 1) as u8);
        }
    }
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// Largest per-sample difference between two buffers of the same length.
pub fn max_difference(a: &[u8], b: &[u8]) -> u8 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).max().unwrap_or(0)
}
