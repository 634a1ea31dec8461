//! Synchronous one-shot capture.
//!
//! Builds a transient full-frame session, waits for its first frame, copies
//! it out and tears the session down again, all within one call.

use crate::capture::traits::CaptureBackend;
use crate::error::{CaptureError, CaptureResult};
use crate::session::CaptureSession;
use crate::types::{CaptureConfig, CaptureTarget, CropRequest, Frame, FrameInfo, BYTES_PER_PIXEL};

/// Capture one frame of `target` into `dst`.
///
/// `dst` holds `height` rows of `width * 4` bytes. The smaller of the
/// requested and native sizes is copied from the top-left corner; bytes
/// outside it are left untouched. Blocks for at most
/// `config.one_shot_timeout`. The returned info carries the copied size.
pub fn capture_once<B: CaptureBackend>(
    backend: &B,
    target: CaptureTarget,
    dst: &mut [u8],
    width: u32,
    height: u32,
    config: &CaptureConfig,
) -> CaptureResult<FrameInfo> {
    if width == 0 || height == 0 {
        return Err(CaptureError::InvalidConfiguration(format!(
            "destination size {}x{} is empty",
            width, height
        )));
    }
    let required = width as usize * height as usize * BYTES_PER_PIXEL;
    if dst.len() < required {
        return Err(CaptureError::BufferTooSmall {
            required,
            provided: dst.len(),
        });
    }

    let mut session = CaptureSession::start(backend, target, CropRequest::none(), config.clone())?;

    let result = session
        .wait_for_frame(0, config.one_shot_timeout)
        .and_then(|_| session.read_latest_into(dst, width, height));

    session.close();

    match &result {
        Ok(info) => log::debug!(
            "One-shot capture of {} copied {}x{}",
            target,
            info.width,
            info.height
        ),
        Err(e) => log::debug!("One-shot capture of {} failed: {}", target, e),
    }
    result
}

/// Capture one full native-size frame of `target`
pub fn capture_once_to_vec<B: CaptureBackend>(
    backend: &B,
    target: CaptureTarget,
    config: &CaptureConfig,
) -> CaptureResult<Frame> {
    let mut session = CaptureSession::start(backend, target, CropRequest::none(), config.clone())?;

    let result = session
        .wait_for_frame(0, config.one_shot_timeout)
        .and_then(|_| session.latest_frame());

    session.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::software::SoftwareBackend;
    use crate::types::Size;
    use std::thread;
    use std::time::{Duration, Instant};

    fn quick_config() -> CaptureConfig {
        CaptureConfig {
            one_shot_timeout: Duration::from_millis(50),
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn test_timeout_when_no_frame_arrives() {
        let backend = SoftwareBackend::new();
        let feed = backend.add_window(7, Size::new(8, 8));
        let mut dst = vec![0u8; 8 * 8 * 4];

        let start = Instant::now();
        let err = capture_once(&backend, feed.target(), &mut dst, 8, 8, &quick_config()).unwrap_err();

        assert!(matches!(err, CaptureError::CaptureTimeout { timeout_ms: 50 }));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(backend.live_resources().is_empty());
        assert_eq!(feed.active_streams(), 0);
    }

    #[test]
    fn test_frame_from_another_thread() {
        let backend = SoftwareBackend::new();
        let feed = backend.add_window(7, Size::new(4, 4));

        let producer = {
            let feed = feed.clone();
            thread::spawn(move || {
                let deadline = Instant::now() + Duration::from_secs(5);
                while feed.active_streams() == 0 && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(1));
                }
                feed.push_solid([10, 20, 30, 255]);
            })
        };

        let config = CaptureConfig {
            one_shot_timeout: Duration::from_secs(5),
            ..CaptureConfig::default()
        };
        let frame = capture_once_to_vec(&backend, feed.target(), &config).unwrap();
        producer.join().unwrap();

        assert_eq!((frame.width, frame.height), (4, 4));
        assert!(frame.data.chunks(4).all(|px| px == [10, 20, 30, 255]));
        assert!(backend.live_resources().is_empty());
    }

    #[test]
    fn test_rejects_short_destination() {
        let backend = SoftwareBackend::new();
        let feed = backend.add_window(7, Size::new(4, 4));
        let mut dst = vec![0u8; 10];
        assert!(matches!(
            capture_once(&backend, feed.target(), &mut dst, 4, 4, &quick_config()),
            Err(CaptureError::BufferTooSmall { required: 64, provided: 10 })
        ));
        assert_eq!(backend.live_resources().devices, 0);
    }
}
