//! Region policy: resolves a requested crop against the source's native size

use crate::error::{CaptureError, CaptureResult};
use crate::types::{CropRequest, Region, Size};

/// Resolve the capture rectangle for a session.
///
/// A request with strictly positive width and height is used verbatim and
/// cropped on the GPU. Anything else captures the full native size. The crop is
/// not clamped against `native`; an out-of-bounds crop surfaces later as a copy
/// failure.
pub fn resolve_region(request: CropRequest, native: Size) -> CaptureResult<Region> {
    if request.is_crop() {
        return Ok(Region {
            x: request.x,
            y: request.y,
            width: request.width as u32,
            height: request.height as u32,
            clipped: true,
        });
    }

    if native.is_empty() {
        return Err(CaptureError::TargetUnavailable(format!(
            "capture source reports an empty size ({}x{})",
            native.width, native.height
        )));
    }

    Ok(Region {
        x: 0,
        y: 0,
        width: native.width,
        height: native.height,
        clipped: false,
    })
}

/// Whether `region` lies entirely inside a surface of `bounds`
pub fn region_within(region: &Region, bounds: Size) -> bool {
    if region.x < 0 || region.y < 0 {
        return false;
    }
    let right = region.x as u64 + region.width as u64;
    let bottom = region.y as u64 + region.height as u64;
    right <= bounds.width as u64 && bottom <= bounds.height as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_request_uses_native_size() {
        let region = resolve_region(CropRequest::none(), Size::new(1920, 1080)).unwrap();
        assert_eq!(
            region,
            Region {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
                clipped: false,
            }
        );
    }

    #[test]
    fn test_non_positive_dimension_means_full_frame() {
        let region = resolve_region(CropRequest::new(5, 5, 100, 0), Size::new(800, 600)).unwrap();
        assert!(!region.clipped);
        assert_eq!(region.size(), Size::new(800, 600));
        assert_eq!((region.x, region.y), (0, 0));
    }

    #[test]
    fn test_crop_used_verbatim_even_when_larger_than_source() {
        let region =
            resolve_region(CropRequest::new(700, 500, 640, 640), Size::new(800, 600)).unwrap();
        assert!(region.clipped);
        assert_eq!((region.x, region.y, region.width, region.height), (700, 500, 640, 640));
    }

    #[test]
    fn test_empty_source_rejected_without_crop() {
        let err = resolve_region(CropRequest::none(), Size::new(0, 0)).unwrap_err();
        assert!(matches!(err, CaptureError::TargetUnavailable(_)));
    }

    #[test]
    fn test_region_within_bounds() {
        let inside = resolve_region(CropRequest::new(10, 10, 90, 90), Size::default()).unwrap();
        assert!(region_within(&inside, Size::new(100, 100)));

        let overhang = resolve_region(CropRequest::new(11, 10, 90, 90), Size::default()).unwrap();
        assert!(!region_within(&overhang, Size::new(100, 100)));

        let negative = resolve_region(CropRequest::new(-1, 0, 10, 10), Size::default()).unwrap();
        assert!(!region_within(&negative, Size::new(100, 100)));
    }
}
