//! Property tests: no input makes the decoder panic or hand back a short buffer.

mod common;

use std::sync::OnceLock;

use common::{encode_rgb, grey_jpeg};
use memjpeg::{DecodeError, Decoder, DecoderOptions, Image};
use proptest::prelude::*;

/// Random headers can declare huge frames, so keep allocations small.
fn limited_decode(data: &[u8]) -> Result<Image, DecodeError> {
    Decoder::with_options(DecoderOptions::default().with_max_pixels(1 << 16)).decode(data)
}

fn assert_full_size(image: &Image) {
    assert_eq!(
        image.pixels().len(),
        image.width() as usize * image.height() as usize * 3
    );
}

fn sample_jpeg() -> &'static [u8] {
    static JPEG: OnceLock<Vec<u8>> = OnceLock::new();
    JPEG.get_or_init(|| encode_rgb(24, 16, |x, y| [(x * 10) as u8, (y * 15) as u8, 77]))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        if let Ok(image) = limited_decode(&data) {
            assert_full_size(&image);
        }
    }

    #[test]
    fn garbage_after_soi_never_panics(tail in prop::collection::vec(any::<u8>(), 0..1024)) {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&tail);
        if let Ok(image) = limited_decode(&data) {
            assert_full_size(&image);
        }
    }

    #[test]
    fn flipped_scan_bytes_never_panic(index in 0usize..4096, value in any::<u8>()) {
        let mut jpeg = sample_jpeg().to_vec();
        let index = index % jpeg.len();
        jpeg[index] = value;
        if let Ok(image) = limited_decode(&jpeg) {
            assert_full_size(&image);
        }
    }

    #[test]
    fn restart_numbering_only_warns(mcus in 1u16..12, first in 0u8..8) {
        let image = limited_decode(&grey_jpeg(mcus, Some(first))).unwrap();
        prop_assert_eq!(image.width(), mcus as u32 * 8);
        prop_assert!(image.pixels().iter().all(|&sample| sample == 128));
    }
}

#[test]
fn every_truncation_is_full_size_or_corrupt() {
    let jpeg = sample_jpeg();
    for len in 0..jpeg.len() {
        match limited_decode(&jpeg[..len]) {
            Ok(image) => {
                assert_eq!((image.width(), image.height()), (24, 16));
                assert_full_size(&image);
            }
            Err(err) => assert!(
                matches!(err, DecodeError::CorruptStream(_)),
                "truncated at {}: {}",
                len,
                err
            ),
        }
    }
}
