//! C API for the capture library
//!
//! Exposes one process-wide persistent session plus one-shot captures. Every
//! call reports plain success or failure; the reason of the last failure on
//! any thread can be fetched with [`GetLastCaptureError`].

#![allow(non_snake_case)]

use libc::{c_char, c_int, c_void};
use once_cell::sync::Lazy;
use std::ffi::CString;
use std::panic::{self, AssertUnwindSafe};
use std::slice;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::capture::{platform_backend, PlatformBackend};
use crate::error::{CaptureError, CaptureResult, CODE_SUCCESS};
use crate::host::SessionHost;
use crate::types::{CaptureConfig, CaptureTarget, CropRequest};

// Error codes outside the CaptureError range
pub const ERROR_NULL_POINTER: c_int = -1;
pub const ERROR_INVALID_PARAMETER: c_int = -2;
pub const ERROR_PANIC: c_int = -3;

/// Session counters for C callers
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct capture_stats {
    pub frames_published: u64,
    pub frames_overwritten: u64,
    pub reads_served: u64,
    pub empty_signals: u64,
    pub callback_faults: u64,
}

static HOST: Lazy<SessionHost<PlatformBackend>> =
    Lazy::new(|| SessionHost::new(platform_backend(), CaptureConfig::from_env()));

static LAST_ERROR: AtomicI32 = AtomicI32::new(CODE_SUCCESS);

/// Run `op`, converting errors and panics into `false`
fn guarded<F>(name: &str, op: F) -> bool
where
    F: FnOnce() -> Result<(), c_int>,
{
    let code = match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(())) => CODE_SUCCESS,
        Ok(Err(code)) => code,
        Err(_) => {
            log::error!("{} panicked", name);
            ERROR_PANIC
        }
    };
    LAST_ERROR.store(code, Ordering::Relaxed);
    code == CODE_SUCCESS
}

fn report<T>(name: &str, result: CaptureResult<T>) -> Result<T, c_int> {
    result.map_err(|e| {
        if e.is_recoverable() {
            log::trace!("{}: {}", name, e);
        } else {
            log::warn!("{}: {}", name, e);
        }
        e.to_error_code()
    })
}

fn crop(x: c_int, y: c_int, width: c_int, height: c_int) -> CropRequest {
    CropRequest::new(x, y, width, height)
}

fn dimensions(width: c_int, height: c_int) -> Result<(u32, u32), c_int> {
    if width <= 0 || height <= 0 {
        return Err(ERROR_INVALID_PARAMETER);
    }
    Ok((width as u32, height as u32))
}

fn init(target: CaptureTarget, request: CropRequest) -> Result<(), c_int> {
    report("InitCapture", HOST.init(target, request)).map(|region| {
        log::debug!("Persistent capture of {} running, region {}", target, region);
    })
}

fn one_shot(
    target: CaptureTarget,
    buffer: *mut u8,
    width: c_int,
    height: c_int,
) -> Result<(), c_int> {
    if buffer.is_null() {
        return Err(ERROR_NULL_POINTER);
    }
    let (width, height) = dimensions(width, height)?;
    let len = width as usize * height as usize * 4;
    // SAFETY: the caller provides `height` rows of `width * 4` writable bytes.
    let dst = unsafe { slice::from_raw_parts_mut(buffer, len) };
    report("CaptureWindow", HOST.capture_once(target, dst, width, height)).map(|_| ())
}

/// Start the persistent session on a window, replacing any running one.
///
/// A crop with non-positive width or height captures the whole window.
#[no_mangle]
pub extern "C" fn InitCapture(
    hwnd: *mut c_void,
    crop_x: c_int,
    crop_y: c_int,
    crop_w: c_int,
    crop_h: c_int,
) -> bool {
    guarded("InitCapture", || {
        if hwnd.is_null() {
            return Err(ERROR_NULL_POINTER);
        }
        init(
            CaptureTarget::window(hwnd as isize),
            crop(crop_x, crop_y, crop_w, crop_h),
        )
    })
}

/// Start the persistent session on a monitor, replacing any running one
#[no_mangle]
pub extern "C" fn InitMonitorCapture(
    hmonitor: *mut c_void,
    crop_x: c_int,
    crop_y: c_int,
    crop_w: c_int,
    crop_h: c_int,
) -> bool {
    guarded("InitMonitorCapture", || {
        if hmonitor.is_null() {
            return Err(ERROR_NULL_POINTER);
        }
        init(
            CaptureTarget::monitor(hmonitor as isize),
            crop(crop_x, crop_y, crop_w, crop_h),
        )
    })
}

/// Copy the latest frame as dense BGRA rows.
///
/// Needs `width * height * 4` bytes of the session region. Returns false
/// without writing anything when no frame has arrived yet or the buffer is
/// too small.
#[no_mangle]
pub extern "C" fn GetLatestFrame(output_buffer: *mut u8, buffer_size: c_int) -> bool {
    guarded("GetLatestFrame", || {
        if output_buffer.is_null() {
            return Err(ERROR_NULL_POINTER);
        }
        if buffer_size < 0 {
            return Err(ERROR_INVALID_PARAMETER);
        }
        // SAFETY: the caller guarantees `buffer_size` writable bytes.
        let dst = unsafe { slice::from_raw_parts_mut(output_buffer, buffer_size as usize) };
        report("GetLatestFrame", HOST.get_latest_frame(dst)).map(|_| ())
    })
}

/// Close the persistent session. Safe to call without one.
#[no_mangle]
pub extern "C" fn CleanupCapture() {
    guarded("CleanupCapture", || {
        HOST.cleanup();
        Ok(())
    });
}

/// Capture a single frame of a window into `buffer`.
///
/// `buffer` holds `height` rows of `width * 4` bytes; the top-left corner of
/// the window is copied, clamped to its native size. Waits up to the
/// one-shot timeout (2 seconds by default).
#[no_mangle]
pub extern "C" fn CaptureWindow(
    hwnd: *mut c_void,
    buffer: *mut u8,
    width: c_int,
    height: c_int,
) -> bool {
    guarded("CaptureWindow", || {
        if hwnd.is_null() {
            return Err(ERROR_NULL_POINTER);
        }
        one_shot(CaptureTarget::window(hwnd as isize), buffer, width, height)
    })
}

/// Capture a single frame of a monitor into `buffer`
#[no_mangle]
pub extern "C" fn CaptureMonitor(
    hmonitor: *mut c_void,
    buffer: *mut u8,
    width: c_int,
    height: c_int,
) -> bool {
    guarded("CaptureMonitor", || {
        if hmonitor.is_null() {
            return Err(ERROR_NULL_POINTER);
        }
        one_shot(CaptureTarget::monitor(hmonitor as isize), buffer, width, height)
    })
}

/// Report the resolved region of the persistent session
#[no_mangle]
pub extern "C" fn GetCaptureRegion(
    x: *mut c_int,
    y: *mut c_int,
    width: *mut c_int,
    height: *mut c_int,
) -> bool {
    guarded("GetCaptureRegion", || {
        if x.is_null() || y.is_null() || width.is_null() || height.is_null() {
            return Err(ERROR_NULL_POINTER);
        }
        let region = HOST
            .region()
            .ok_or_else(|| CaptureError::SessionClosed.to_error_code())?;

        unsafe {
            *x = region.x;
            *y = region.y;
            *width = region.width as c_int;
            *height = region.height as c_int;
        }
        Ok(())
    })
}

/// Fill `stats` with the persistent session's counters
#[no_mangle]
pub extern "C" fn GetCaptureStats(stats: *mut capture_stats) -> bool {
    guarded("GetCaptureStats", || {
        if stats.is_null() {
            return Err(ERROR_NULL_POINTER);
        }
        let current = HOST
            .stats()
            .ok_or_else(|| CaptureError::SessionClosed.to_error_code())?;

        unsafe {
            *stats = capture_stats {
                frames_published: current.frames_published,
                frames_overwritten: current.frames_overwritten,
                reads_served: current.reads_served,
                empty_signals: current.empty_signals,
                callback_faults: current.callback_faults,
            };
        }
        Ok(())
    })
}

/// Error code of the most recent call (0 on success)
#[no_mangle]
pub extern "C" fn GetLastCaptureError() -> c_int {
    LAST_ERROR.load(Ordering::Relaxed)
}

/// Get library version
#[no_mangle]
pub extern "C" fn WgcCaptureVersion() -> *const c_char {
    static VERSION: Lazy<CString> =
        Lazy::new(|| CString::new(crate::version()).unwrap_or_default());
    VERSION.as_ptr()
}
