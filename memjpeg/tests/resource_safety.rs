//! Allocation accounting. Lives in its own test binary because it installs a global
//! allocator; counters are per thread so the harness's own allocations don't interfere.

mod common;

use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::Cell,
};

use common::{cmyk_header, encode_rgb};
use memjpeg::{ColorSpace, DecodeError, Decoder};

struct CountingAllocator;

thread_local! {
    static LIVE_BYTES: Cell<isize> = const { Cell::new(0) };
    static TOTAL_BYTES: Cell<usize> = const { Cell::new(0) };
}

fn record_alloc(size: usize) {
    let _ = LIVE_BYTES.try_with(|live| live.set(live.get() + size as isize));
    let _ = TOTAL_BYTES.try_with(|total| total.set(total.get() + size));
}

fn record_dealloc(size: usize) {
    let _ = LIVE_BYTES.try_with(|live| live.set(live.get() - size as isize));
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            record_dealloc(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

fn live_bytes() -> isize {
    LIVE_BYTES.with(Cell::get)
}

fn total_bytes() -> usize {
    TOTAL_BYTES.with(Cell::get)
}

#[test]
fn alternating_decodes_release_everything() {
    let valid = encode_rgb(48, 32, |x, y| [(x * 5) as u8, (y * 7) as u8, 90]);
    let corrupt = {
        let mut data = valid[..valid.len() / 2].to_vec();
        // Break the frame header so the call fails instead of zero-filling.
        let sof = data
            .windows(2)
            .position(|w| w == [0xFF, 0xC0])
            .expect("baseline frame header");
        data[sof + 4] = 12;
        data
    };

    let mut decoder = Decoder::new();
    for _ in 0..4 {
        let _ = decoder.decode(&valid);
        let _ = decoder.decode(&corrupt);
    }

    let before = live_bytes();
    for i in 0..1000 {
        if i % 2 == 0 {
            let image = decoder.decode(&valid).unwrap();
            assert_eq!(image.pixels().len(), 48 * 32 * 3);
        } else {
            assert!(decoder.decode(&corrupt).is_err());
        }
    }
    assert_eq!(live_bytes(), before);
}

#[test]
fn rejected_color_space_never_allocates_pixels() {
    let (width, height) = (1024u16, 1024u16);
    let jpeg = cmyk_header(width, height);
    let mut decoder = Decoder::new();

    let live_before = live_bytes();
    let total_before = total_bytes();
    let result = decoder.decode(&jpeg);
    let allocated = total_bytes() - total_before;

    assert!(matches!(
        result,
        Err(DecodeError::UnsupportedColorSpace(ColorSpace::Cmyk))
    ));
    drop(result);
    assert!(allocated < width as usize * height as usize * 3, "{}", allocated);
    assert_eq!(live_bytes(), live_before);
}
