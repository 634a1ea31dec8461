//! Integration tests for the capture library

use serial_test::serial;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use wgc_capture_rust::capture::software::SoftwareBackend;
use wgc_capture_rust::*;

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_concurrent_producer_and_reader() {
        init_logging();
        println!("🧵 Testing concurrent producer and polling reader...");

        let backend = SoftwareBackend::new();
        let feed = backend.add_window(1, Size::new(64, 64));
        let host = Arc::new(SessionHost::new(backend.clone(), CaptureConfig::default()));
        host.init(feed.target(), CropRequest::none()).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let producer = {
            let feed = feed.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut shade = 0u8;
                while !stop.load(Ordering::Relaxed) {
                    shade = shade.wrapping_add(1);
                    feed.push_solid([shade, shade, shade, 255]);
                }
            })
        };

        let mut dst = vec![0u8; 64 * 64 * 4];
        let mut served = 0;
        let mut last_sequence = 0;
        for _ in 0..2000 {
            match host.get_latest_frame(&mut dst) {
                Ok(info) => {
                    served += 1;
                    assert!(info.sequence >= last_sequence);
                    last_sequence = info.sequence;
                    // A frame is never a mix of two publishes
                    let first = dst[0];
                    assert!(dst.chunks(4).all(|px| px == [first, first, first, 255]));
                }
                Err(CaptureError::NoFrameYet) => thread::yield_now(),
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        stop.store(true, Ordering::Relaxed);
        producer.join().unwrap();
        host.cleanup();

        assert!(served > 0);
        assert!(backend.live_resources().is_empty());
    }

    #[test]
    fn test_host_stats_track_session() {
        init_logging();

        let backend = SoftwareBackend::new();
        let feed = backend.add_window(1, Size::new(8, 8));
        let host = SessionHost::new(backend, CaptureConfig::default());

        assert!(host.stats().is_none());
        host.init(feed.target(), CropRequest::new(0, 0, 4, 4)).unwrap();
        assert_eq!(host.region().map(|r| r.size()), Some(Size::new(4, 4)));

        feed.push_solid([0, 0, 0, 0]);
        feed.push_solid([0, 0, 0, 0]);
        feed.signal_empty();
        let mut dst = vec![0u8; 4 * 4 * 4];
        host.get_latest_frame(&mut dst).unwrap();

        let stats = host.stats().unwrap();
        assert_eq!(stats.frames_published, 2);
        assert_eq!(stats.frames_overwritten, 1);
        assert_eq!(stats.reads_served, 1);
        assert_eq!(stats.empty_signals, 1);
        assert!((stats.overwrite_rate() - 50.0).abs() < f64::EPSILON);

        host.cleanup();
        assert!(host.stats().is_none());
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("WGC_CAPTURE_READ_POLICY", "consume"),
            ("WGC_CAPTURE_ONESHOT_TIMEOUT_MS", "250"),
            ("WGC_CAPTURE_NO_BORDER_SUPPRESS", "yes"),
        ]
        .into_iter()
        .collect();

        let config = CaptureConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.read_policy, ReadPolicy::Consume);
        assert_eq!(config.one_shot_timeout, Duration::from_millis(250));
        assert!(!config.suppress_border);
        assert_eq!(config.frame_pool_buffers, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected_before_binding() {
        let backend = SoftwareBackend::new();
        let feed = backend.add_window(1, Size::new(8, 8));
        let config = CaptureConfig {
            frame_pool_buffers: 0,
            ..CaptureConfig::default()
        };

        let result = CaptureSession::start(&backend, feed.target(), CropRequest::none(), config);
        assert!(matches!(result.err(), Some(CaptureError::InvalidConfiguration(_))));
        assert_eq!(backend.live_resources(), Default::default());
    }

    #[cfg(feature = "c-api")]
    #[test]
    #[serial]
    fn test_c_api_init_on_bogus_window_fails_cleanly() {
        use wgc_capture_rust::ffi::*;

        let bogus = 0x7FFF_0000usize as *mut std::ffi::c_void;
        assert!(!InitCapture(bogus, 0, 0, 0, 0));
        assert!(GetLastCaptureError() < 0);

        let mut buffer = vec![0u8; 16];
        assert!(!GetLatestFrame(buffer.as_mut_ptr(), buffer.len() as i32));
        CleanupCapture();
        assert_eq!(GetLastCaptureError(), 0);
    }

    #[cfg(all(feature = "c-api", not(target_os = "windows")))]
    #[test]
    #[serial]
    fn test_c_api_reports_missing_device() {
        use wgc_capture_rust::ffi::*;

        let fake = 0x1000usize as *mut std::ffi::c_void;
        let mut buffer = vec![0u8; 4 * 4 * 4];
        assert!(!CaptureWindow(fake, buffer.as_mut_ptr(), 4, 4));
        assert_eq!(
            GetLastCaptureError(),
            CaptureError::DeviceUnavailable(String::new()).to_error_code()
        );
    }
}
