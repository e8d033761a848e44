//! Plain C entry points. Errors are reported through return codes, with the message kept
//! per thread for [`memjpeg_last_error`].

use std::{
    cell::RefCell,
    ffi::{c_char, c_int, c_void},
    panic::{self, AssertUnwindSafe},
    ptr, slice,
};

use log::error;

use crate::{decoder::decode, image::CHANNELS};

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

fn set_last_error(msg: impl Into<String>) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = msg.into();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| e.borrow_mut().clear());
}

/// Decoded image handed across the C boundary.
///
/// The pixel buffer holds `width * height * 3` bytes and must be released with
/// [`memjpeg_image_free`].
#[repr(C)]
#[derive(Debug)]
pub struct RawImage {
    /// Width in pixels, -1 when nothing was decoded
    pub width: c_int,
    /// Height in pixels, -1 when nothing was decoded
    pub height: c_int,
    /// Interleaved RGB samples, null when nothing was decoded
    pub pixels: *mut c_void,
}

impl RawImage {
    fn reset(&mut self) {
        self.width = -1;
        self.height = -1;
        self.pixels = ptr::null_mut();
    }

    fn byte_len(&self) -> usize {
        self.width.max(0) as usize * self.height.max(0) as usize * CHANNELS
    }
}

/// Decodes the `len` bytes at `buf` into `output`.
///
/// Returns 0 on success and -1 on failure. `output` is set to width -1, height -1 and a null
/// buffer before anything else happens, and stays that way on failure.
///
/// # Safety
/// `buf` must be valid for reads of `len` bytes and `output` must point to a writable
/// `RawImage`.
#[no_mangle]
pub unsafe extern "C" fn memjpeg_decompress(
    buf: *const u8,
    len: usize,
    output: *mut RawImage,
) -> c_int {
    let Some(output) = (unsafe { output.as_mut() }) else {
        set_last_error("output is null");
        return -1;
    };
    output.reset();

    if buf.is_null() && len != 0 {
        set_last_error("input is null");
        return -1;
    }
    let data: &[u8] = if len == 0 {
        &[]
    } else {
        unsafe { slice::from_raw_parts(buf, len) }
    };

    let image = match panic::catch_unwind(AssertUnwindSafe(|| decode(data))) {
        Ok(Ok(image)) => image,
        Ok(Err(err)) => {
            set_last_error(err.to_string());
            return -1;
        }
        Err(_) => {
            error!("panic while decoding {} bytes", len);
            set_last_error("internal panic while decoding");
            return -1;
        }
    };

    let (Ok(width), Ok(height)) = (c_int::try_from(image.width()), c_int::try_from(image.height()))
    else {
        set_last_error("image dimensions do not fit in a C int");
        return -1;
    };

    let pixels = image.into_pixels().into_boxed_slice();
    output.width = width;
    output.height = height;
    output.pixels = Box::into_raw(pixels) as *mut u8 as *mut c_void;
    clear_last_error();
    0
}

/// Releases the pixel buffer of an image filled in by [`memjpeg_decompress`].
///
/// The image is reset afterwards, so calling this twice, or on an image whose decode failed,
/// does nothing.
///
/// # Safety
/// `image` must be null or point to a `RawImage` last written by [`memjpeg_decompress`].
#[no_mangle]
pub unsafe extern "C" fn memjpeg_image_free(image: *mut RawImage) {
    let Some(image) = (unsafe { image.as_mut() }) else {
        return;
    };
    if !image.pixels.is_null() {
        let len = image.byte_len();
        let pixels = ptr::slice_from_raw_parts_mut(image.pixels as *mut u8, len);
        drop(unsafe { Box::from_raw(pixels) });
    }
    image.reset();
}

/// Copies the last error message of this thread into `buffer`, NUL-terminated and truncated
/// to fit.
///
/// Returns the full message length, excluding the terminator. With a null buffer or a size
/// of 0 only the length is returned.
///
/// # Safety
/// The buffer must be valid for writes of `buffer_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn memjpeg_last_error(buffer: *mut c_char, buffer_size: usize) -> usize {
    if buffer.is_null() || buffer_size == 0 {
        return LAST_ERROR.with(|e| e.borrow().len());
    }

    LAST_ERROR.with(|e| {
        let error = e.borrow();
        let bytes = error.as_bytes();
        let copy_len = bytes.len().min(buffer_size - 1);

        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), buffer as *mut u8, copy_len);
            *buffer.add(copy_len) = 0;
        }

        error.len()
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;

    fn blank() -> RawImage {
        RawImage {
            width: 7,
            height: 7,
            pixels: ptr::null_mut(),
        }
    }

    fn last_error() -> String {
        let mut buffer = [0 as c_char; 128];
        unsafe { memjpeg_last_error(buffer.as_mut_ptr(), buffer.len()) };
        unsafe { CStr::from_ptr(buffer.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn failure_resets_output() {
        let data = [0x12, 0x34];
        let mut image = blank();
        let status = unsafe { memjpeg_decompress(data.as_ptr(), data.len(), &mut image) };

        assert_eq!(status, -1);
        assert_eq!((image.width, image.height), (-1, -1));
        assert!(image.pixels.is_null());
        assert!(last_error().contains("Not a JPEG file"));
    }

    #[test]
    fn empty_input_fails() {
        let mut image = blank();
        assert_eq!(unsafe { memjpeg_decompress(ptr::null(), 0, &mut image) }, -1);
        assert!(image.pixels.is_null());
    }

    #[test]
    fn free_is_idempotent() {
        let mut image = RawImage {
            width: 2,
            height: 1,
            pixels: Box::into_raw(vec![0u8; 6].into_boxed_slice()) as *mut u8 as *mut c_void,
        };
        unsafe {
            memjpeg_image_free(&mut image);
            memjpeg_image_free(&mut image);
            memjpeg_image_free(ptr::null_mut());
        }
        assert!(image.pixels.is_null());
        assert_eq!(image.width, -1);
    }

    #[test]
    fn last_error_truncates() {
        set_last_error("abcdef");
        let mut buffer = [0x55 as c_char; 4];
        let len = unsafe { memjpeg_last_error(buffer.as_mut_ptr(), buffer.len()) };
        assert_eq!(len, 6);
        assert_eq!(buffer[3], 0);
        assert_eq!(buffer[0] as u8, b'a');
        assert_eq!(unsafe { memjpeg_last_error(ptr::null_mut(), 0) }, 6);
    }
}
