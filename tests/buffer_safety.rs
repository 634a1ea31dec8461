//! Buffer Safety Tests
//!
//! Destination sizing, no partial writes, and property checks of the row copy
//! and region policy.

use proptest::prelude::*;
use wgc_capture_rust::capture::software::SoftwareBackend;
use wgc_capture_rust::pitch::{copy_rows, RowCopy};
use wgc_capture_rust::region::resolve_region;
use wgc_capture_rust::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_buffer_rejected_without_partial_copy() {
        println!("🔒 Testing buffer-too-small rejection...");

        let backend = SoftwareBackend::new();
        let feed = backend.add_window(1, Size::new(100, 100));
        let session = CaptureSession::start(&backend, feed.target(), CropRequest::none(), CaptureConfig::default())
            .unwrap();
        feed.push_solid([1, 2, 3, 4]);

        let required = 100 * 100 * 4;
        for size in [0, 100, required / 2, required - 1] {
            let mut dst = vec![0x77u8; size];
            let err = session.try_read_latest(&mut dst).err().unwrap();

            match err {
                CaptureError::BufferTooSmall { required: r, provided } => {
                    assert_eq!(r, required);
                    assert_eq!(provided, size);
                }
                other => panic!("unexpected error {:?}", other),
            }
            assert!(dst.iter().all(|b| *b == 0x77), "buffer of {} bytes was written", size);
        }

        // A rejected read leaves the frame available
        let mut dst = vec![0u8; required];
        assert!(session.try_read_latest(&mut dst).is_ok());
    }

    #[test]
    fn test_oversized_buffer_tail_untouched() {
        println!("🔒 Testing oversized destination...");

        let backend = SoftwareBackend::new();
        let feed = backend.add_window(1, Size::new(10, 10));
        let session = CaptureSession::start(&backend, feed.target(), CropRequest::none(), CaptureConfig::default())
            .unwrap();
        feed.push_solid([1, 2, 3, 4]);

        let mut dst = vec![0x99u8; 10 * 10 * 4 + 32];
        session.try_read_latest(&mut dst).unwrap();
        assert!(dst[400..].iter().all(|b| *b == 0x99));
        assert!(dst[..400].chunks(4).all(|px| px == [1, 2, 3, 4]));
    }

    #[test]
    fn test_one_shot_buffer_validation() {
        let backend = SoftwareBackend::new();
        let feed = backend.add_window(1, Size::new(10, 10));

        let mut dst = vec![0u8; 16];
        let config = CaptureConfig::default();
        assert!(matches!(
            capture_once(&backend, feed.target(), &mut dst, 0, 4, &config),
            Err(CaptureError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            capture_once(&backend, feed.target(), &mut dst, 4, 4, &config),
            Err(CaptureError::BufferTooSmall { required: 64, provided: 16 })
        ));
        assert_eq!(feed.active_streams(), 0);
    }
}

proptest! {
    #[test]
    fn prop_copy_rows_strips_padding(
        rows in 1usize..24,
        width in 1usize..40,
        padding in 0usize..64,
        seed in any::<u8>(),
    ) {
        let row_bytes = width * 4;
        let pitch = row_bytes + padding;
        let src: Vec<u8> = (0..pitch * rows)
            .map(|i| if i % pitch < row_bytes { (i as u8).wrapping_add(seed) } else { 0xCD })
            .collect();
        let mut dst = vec![0u8; rows * row_bytes];

        copy_rows(&src, &mut dst, RowCopy::dense(rows, row_bytes, pitch)).unwrap();

        for y in 0..rows {
            prop_assert_eq!(&dst[y * row_bytes..(y + 1) * row_bytes], &src[y * pitch..y * pitch + row_bytes]);
        }
    }

    #[test]
    fn prop_short_destination_never_written(
        rows in 1usize..16,
        row_bytes in 1usize..64,
        missing in 1usize..16,
    ) {
        let src = vec![0xABu8; rows * row_bytes];
        let len = (rows * row_bytes).saturating_sub(missing);
        let mut dst = vec![0u8; len];

        let result = copy_rows(&src, &mut dst, RowCopy::dense(rows, row_bytes, row_bytes));

        let is_too_small = matches!(result, Err(CaptureError::BufferTooSmall { .. }));
        prop_assert!(is_too_small);
        prop_assert!(dst.iter().all(|b| *b == 0));
    }

    #[test]
    fn prop_positive_crop_used_verbatim(
        x in -100i32..100,
        y in -100i32..100,
        w in 1i32..5000,
        h in 1i32..5000,
        native_w in 1u32..5000,
        native_h in 1u32..5000,
    ) {
        let region = resolve_region(CropRequest::new(x, y, w, h), Size::new(native_w, native_h)).unwrap();
        prop_assert!(region.clipped);
        prop_assert_eq!((region.x, region.y, region.width, region.height), (x, y, w as u32, h as u32));
    }

    #[test]
    fn prop_non_positive_crop_means_full_frame(
        x in -100i32..100,
        y in -100i32..100,
        w in -10i32..=0,
        h in -10i32..3000,
        native_w in 1u32..5000,
        native_h in 1u32..5000,
    ) {
        let region = resolve_region(CropRequest::new(x, y, w, h), Size::new(native_w, native_h)).unwrap();
        prop_assert!(!region.clipped);
        prop_assert_eq!((region.x, region.y), (0, 0));
        prop_assert_eq!(region.size(), Size::new(native_w, native_h));
    }
}
