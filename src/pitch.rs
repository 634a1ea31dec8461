//! Strided-to-dense row copy.
//!
//! Mapped GPU surfaces carry a row pitch that may exceed the logical row
//! width. Every export out of a staging surface goes through [`copy_rows`].

use crate::error::{CaptureError, CaptureResult};

/// Geometry of a row copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCopy {
    /// Number of rows to copy
    pub rows: usize,
    /// Bytes copied from each row
    pub row_bytes: usize,
    /// Byte stride between source rows
    pub src_pitch: usize,
    /// Byte stride between destination rows
    pub dst_pitch: usize,
}

impl RowCopy {
    /// Dense copy: destination rows are exactly `row_bytes` apart
    pub fn dense(rows: usize, row_bytes: usize, src_pitch: usize) -> Self {
        Self {
            rows,
            row_bytes,
            src_pitch,
            dst_pitch: row_bytes,
        }
    }

    /// Minimum source length the copy reads
    pub fn src_len(&self) -> Option<usize> {
        span(self.rows, self.src_pitch, self.row_bytes)
    }

    /// Minimum destination length the copy writes
    pub fn dst_len(&self) -> Option<usize> {
        span(self.rows, self.dst_pitch, self.row_bytes)
    }
}

fn span(rows: usize, pitch: usize, row_bytes: usize) -> Option<usize> {
    if rows == 0 {
        return Some(0);
    }
    pitch.checked_mul(rows - 1)?.checked_add(row_bytes)
}

/// Copy `rows` rows of `row_bytes` bytes from `src` to `dst`.
///
/// All bounds are checked before the first byte is written, so a failed call
/// leaves `dst` untouched.
pub fn copy_rows(src: &[u8], dst: &mut [u8], copy: RowCopy) -> CaptureResult<()> {
    if copy.src_pitch < copy.row_bytes {
        return Err(CaptureError::InvalidLayout(format!(
            "source pitch {} is smaller than row width {}",
            copy.src_pitch, copy.row_bytes
        )));
    }
    if copy.dst_pitch < copy.row_bytes {
        return Err(CaptureError::InvalidLayout(format!(
            "destination pitch {} is smaller than row width {}",
            copy.dst_pitch, copy.row_bytes
        )));
    }

    let overflow = || CaptureError::InvalidLayout("row copy size overflows usize".to_string());
    let src_needed = copy.src_len().ok_or_else(overflow)?;
    let dst_needed = copy.dst_len().ok_or_else(overflow)?;

    if src.len() < src_needed {
        return Err(CaptureError::InvalidLayout(format!(
            "mapped surface holds {} bytes, copy reads {}",
            src.len(),
            src_needed
        )));
    }
    if dst.len() < dst_needed {
        return Err(CaptureError::BufferTooSmall {
            required: dst_needed,
            provided: dst.len(),
        });
    }

    if copy.row_bytes == 0 {
        return Ok(());
    }

    if copy.src_pitch == copy.row_bytes && copy.dst_pitch == copy.row_bytes {
        dst[..dst_needed].copy_from_slice(&src[..src_needed]);
        return Ok(());
    }

    for (src_row, dst_row) in src
        .chunks(copy.src_pitch)
        .zip(dst.chunks_mut(copy.dst_pitch))
        .take(copy.rows)
    {
        dst_row[..copy.row_bytes].copy_from_slice(&src_row[..copy.row_bytes]);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded_source(rows: usize, row_bytes: usize, pitch: usize) -> Vec<u8> {
        let mut src = vec![0xEE; pitch * rows];
        for y in 0..rows {
            for x in 0..row_bytes {
                src[y * pitch + x] = (y * 31 + x) as u8;
            }
        }
        src
    }

    #[test]
    fn test_padding_stripped() {
        let src = padded_source(3, 8, 16);
        let mut dst = vec![0u8; 24];

        copy_rows(&src, &mut dst, RowCopy::dense(3, 8, 16)).unwrap();

        assert!(!dst.contains(&0xEE));
        for y in 0..3 {
            assert_eq!(&dst[y * 8..y * 8 + 8], &src[y * 16..y * 16 + 8]);
        }
    }

    #[test]
    fn test_last_row_needs_no_trailing_padding() {
        let src = padded_source(2, 8, 16);
        let truncated = &src[..16 + 8];
        let mut dst = vec![0u8; 16];
        copy_rows(truncated, &mut dst, RowCopy::dense(2, 8, 16)).unwrap();
        assert_eq!(&dst[8..], &src[16..24]);
    }

    #[test]
    fn test_wider_destination_pitch_leaves_gap_untouched() {
        let src = padded_source(2, 4, 8);
        let mut dst = vec![0xAB; 2 * 12];
        let copy = RowCopy {
            rows: 2,
            row_bytes: 4,
            src_pitch: 8,
            dst_pitch: 12,
        };

        copy_rows(&src, &mut dst, copy).unwrap();

        assert_eq!(&dst[0..4], &src[0..4]);
        assert_eq!(&dst[4..12], &[0xAB; 8]);
        assert_eq!(&dst[12..16], &src[8..12]);
    }

    #[test]
    fn test_short_destination_rejected_without_writes() {
        let src = padded_source(4, 16, 16);
        let mut dst = vec![0x55u8; 63];

        let err = copy_rows(&src, &mut dst, RowCopy::dense(4, 16, 16)).unwrap_err();

        assert!(matches!(
            err,
            CaptureError::BufferTooSmall {
                required: 64,
                provided: 63
            }
        ));
        assert!(dst.iter().all(|b| *b == 0x55));
    }

    #[test]
    fn test_pitch_smaller_than_row_rejected() {
        let src = vec![0u8; 64];
        let mut dst = vec![0u8; 64];
        let err = copy_rows(&src, &mut dst, RowCopy::dense(2, 16, 8)).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidLayout(_)));
    }

    #[test]
    fn test_short_source_rejected() {
        let src = vec![0u8; 20];
        let mut dst = vec![0u8; 32];
        let err = copy_rows(&src, &mut dst, RowCopy::dense(2, 16, 16)).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidLayout(_)));
    }

    #[test]
    fn test_zero_rows_is_noop() {
        let mut dst = vec![7u8; 4];
        copy_rows(&[], &mut dst, RowCopy::dense(0, 16, 16)).unwrap();
        assert_eq!(dst, vec![7u8; 4]);
    }
}
