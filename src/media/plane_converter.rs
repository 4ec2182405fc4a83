// SPDX-License-Identifier: MPL-2.0

//! Stride-correct, crop-aware plane conversion
//!
//! All conversions read planes through a [`PlaneCursor`] that behaves like a
//! positioned byte buffer: it starts at the crop origin, reads one row, and
//! before every non-final row skips the padding up to the next row start.
//! Output is full-range (0-255) unless the function name says otherwise.

use super::frame::{FrameBuffer, Plane};
use super::mask::AlphaMask;
use crate::backends::camera::types::ImageFormat;
use crate::errors::{CaptureError, CaptureResult};

/// Sequential reader over one plane's bytes
struct PlaneCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> PlaneCursor<'a> {
    fn at(data: &'a [u8], position: usize) -> Self {
        Self { data, position }
    }

    /// Copy `dst.len()` bytes and advance
    fn read(&mut self, dst: &mut [u8]) {
        let end = self.position + dst.len();
        dst.copy_from_slice(&self.data[self.position..end]);
        self.position = end;
    }

    fn skip(&mut self, count: usize) {
        self.position += count;
    }
}

/// Copy one plane's crop region into `out`
///
/// Samples land at `out[offset]`, `out[offset + output_stride]`, ... in row
/// order. Bytes are copied in bulk when neither side is interleaved,
/// otherwise each sample is picked from a scratch row at `col * pixel_stride`.
fn copy_plane(
    frame: &FrameBuffer,
    index: usize,
    out: &mut [u8],
    mut offset: usize,
    output_stride: usize,
) {
    let plane: &Plane = &frame.planes()[index];
    let region = frame.plane_region(index);
    if region.width == 0 || region.height == 0 {
        return;
    }

    let pixel_stride = plane.pixel_stride();
    let row_stride = plane.row_stride();
    let mut cursor = PlaneCursor::at(
        plane.data(),
        row_stride * region.top + pixel_stride * region.left,
    );
    let direct = pixel_stride == 1 && output_stride == 1;
    // Only the sampled span of a row is ever read; the stride may be far larger
    let row_span = (region.width - 1) * pixel_stride + 1;
    let mut row_data = if direct { Vec::new() } else { vec![0u8; row_span] };

    for row in 0..region.height {
        let length;
        if direct {
            length = region.width;
            cursor.read(&mut out[offset..offset + length]);
            offset += length;
        } else {
            length = row_span;
            cursor.read(&mut row_data);
            for col in 0..region.width {
                out[offset] = row_data[col * pixel_stride];
                offset += output_stride;
            }
        }
        if row < region.height - 1 {
            cursor.skip(row_stride - length);
        }
    }
}

fn require_yuv(frame: &FrameBuffer) -> CaptureResult<()> {
    if frame.format() != ImageFormat::Yuv420Flexible {
        return Err(CaptureError::UnsupportedFormat(frame.format()));
    }
    Ok(())
}

/// Extract the luminance plane as `width * height` full-range samples
pub fn to_luminance(frame: &FrameBuffer) -> CaptureResult<Vec<u8>> {
    require_yuv(frame)?;
    let mut out = vec![0u8; frame.width() as usize * frame.height() as usize];
    copy_plane(frame, 0, &mut out, 0, 1);
    Ok(out)
}

/// Studio-range luminance: `y - 16`, clamped to `0..=219`
///
/// Separate from [`to_luminance`] on purpose; nothing in the capture path
/// uses it implicitly.
pub fn to_luminance_limited_range(frame: &FrameBuffer) -> CaptureResult<Vec<u8>> {
    let mut luma = to_luminance(frame)?;
    for value in luma.iter_mut() {
        *value = value.saturating_sub(16).min(219);
    }
    Ok(luma)
}

/// Repack a YUV 4:2:0 frame as NV21 (Y plane followed by interleaved V, U)
///
/// Output length is `width * height * 3 / 2`.
pub fn to_nv21(frame: &FrameBuffer) -> CaptureResult<Vec<u8>> {
    require_yuv(frame)?;
    let luma_len = frame.width() as usize * frame.height() as usize;
    let mut out = vec![0u8; luma_len * 3 / 2];

    for index in 0..3 {
        let (offset, output_stride) = match index {
            0 => (0, 1),
            1 => (luma_len + 1, 2),
            _ => (luma_len, 2),
        };
        copy_plane(frame, index, &mut out, offset, output_stride);
    }
    Ok(out)
}

/// Luminance reused as a single-channel alpha mask
///
/// Chroma is discarded; the mask is achromatic.
pub fn to_alpha_mask(frame: &FrameBuffer) -> CaptureResult<AlphaMask> {
    let data = to_luminance(frame)?;
    Ok(AlphaMask::new(frame.width(), frame.height(), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::frame::{CropRect, Plane};
    use proptest::prelude::*;

    /// Planar I420-style frame with padded rows
    fn planar_frame(width: u32, height: u32, row_stride: usize) -> FrameBuffer {
        let (w, h) = (width as usize, height as usize);
        let mut y = vec![0xEEu8; row_stride * h];
        for row in 0..h {
            for col in 0..w {
                y[row * row_stride + col] = (row * w + col) as u8;
            }
        }
        let chroma_stride = row_stride / 2;
        let u = vec![0x55u8; chroma_stride * h / 2];
        let v = vec![0xAAu8; chroma_stride * h / 2];
        FrameBuffer::new(
            ImageFormat::Yuv420Flexible,
            width,
            height,
            CropRect::full(width, height),
            vec![
                Plane::new(y, row_stride, 1),
                Plane::new(u, chroma_stride, 1),
                Plane::new(v, chroma_stride, 1),
            ],
        )
        .unwrap()
    }

    /// Semi-planar frame where U and V share one interleaved buffer (UVUV...)
    fn semi_planar_frame(width: u32, height: u32) -> FrameBuffer {
        let (w, h) = (width as usize, height as usize);
        let y: Vec<u8> = (0..w * h).map(|i| i as u8).collect();
        let mut uv = Vec::with_capacity(w * h / 2);
        for i in 0..(w * h / 4) {
            uv.push(100 + i as u8); // U
            uv.push(200 + i as u8); // V
        }
        // Plane 1 starts at U, plane 2 starts at V; both have pixel stride 2
        let u_plane: Vec<u8> = uv[..uv.len() - 1].to_vec();
        let v_plane: Vec<u8> = uv[1..].to_vec();
        FrameBuffer::new(
            ImageFormat::Yuv420Flexible,
            width,
            height,
            CropRect::full(width, height),
            vec![
                Plane::new(y, w, 1),
                Plane::new(u_plane, w, 2),
                Plane::new(v_plane, w, 2),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_luminance_drops_row_padding() {
        let mut y = Vec::new();
        for row in 0..4u8 {
            for col in 0..4u8 {
                y.push(10 + 10 * (row * 4 + col));
            }
            y.extend_from_slice(&[99, 99]);
        }
        let frame = FrameBuffer::new(
            ImageFormat::Yuv420Flexible,
            4,
            4,
            CropRect::full(4, 4),
            vec![
                Plane::new(y, 6, 1),
                Plane::new(vec![128u8; 4], 2, 1),
                Plane::new(vec![128u8; 4], 2, 1),
            ],
        )
        .unwrap();

        let luma = to_luminance(&frame).unwrap();
        assert_eq!(luma.len(), 16);
        assert_eq!(&luma[..8], &[10, 20, 30, 40, 50, 60, 70, 80]);
        assert!(!luma.contains(&99));
    }

    #[test]
    fn test_luminance_respects_crop_origin() {
        let frame = planar_frame(8, 4, 10);
        let y = frame.planes()[0].data().to_vec();
        let cropped = FrameBuffer::new(
            ImageFormat::Yuv420Flexible,
            4,
            2,
            CropRect::new(2, 2, 6, 4),
            frame.planes().to_vec(),
        )
        .unwrap();

        let luma = to_luminance(&cropped).unwrap();
        let expected: Vec<u8> = [2usize, 3]
            .iter()
            .flat_map(|row| y[row * 10 + 2..row * 10 + 6].to_vec())
            .collect();
        assert_eq!(luma, expected);
    }

    #[test]
    fn test_luminance_is_full_range() {
        let frame = FrameBuffer::new(
            ImageFormat::Yuv420Flexible,
            2,
            2,
            CropRect::full(2, 2),
            vec![
                Plane::new(vec![0u8, 15, 16, 255], 2, 1),
                Plane::new(vec![128u8], 1, 1),
                Plane::new(vec![128u8], 1, 1),
            ],
        )
        .unwrap();
        assert_eq!(to_luminance(&frame).unwrap(), vec![0, 15, 16, 255]);
        assert_eq!(
            to_luminance_limited_range(&frame).unwrap(),
            vec![0, 0, 0, 219]
        );
    }

    #[test]
    fn test_nv21_from_planar() {
        let frame = planar_frame(4, 4, 6);
        let nv21 = to_nv21(&frame).unwrap();
        assert_eq!(nv21.len(), 24);
        assert_eq!(&nv21[..16], &to_luminance(&frame).unwrap()[..]);
        // V first, then U, interleaved
        assert_eq!(&nv21[16..], &[0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55]);
    }

    #[test]
    fn test_nv21_from_semi_planar() {
        let frame = semi_planar_frame(4, 4);
        let nv21 = to_nv21(&frame).unwrap();
        assert_eq!(nv21.len(), 24);
        assert_eq!(&nv21[16..], &[200, 100, 201, 101, 202, 102, 203, 103]);
    }

    #[test]
    fn test_alpha_mask_matches_luminance() {
        let frame = planar_frame(4, 2, 4);
        let mask = to_alpha_mask(&frame).unwrap();
        assert_eq!(mask.width(), 4);
        assert_eq!(mask.height(), 2);
        assert_eq!(mask.data(), &to_luminance(&frame).unwrap()[..]);
    }

    #[test]
    fn test_non_yuv_rejected_before_reading() {
        let frame = FrameBuffer::new(
            ImageFormat::Jpeg,
            1,
            1,
            CropRect::full(1, 1),
            vec![Plane::new(vec![0xFFu8], 1, 1)],
        )
        .unwrap();
        assert_eq!(
            to_luminance(&frame),
            Err(CaptureError::UnsupportedFormat(ImageFormat::Jpeg))
        );
        assert!(matches!(
            to_nv21(&frame),
            Err(CaptureError::UnsupportedFormat(_))
        ));
        assert!(to_alpha_mask(&frame).is_err());
    }

    #[test]
    fn test_single_row_ignores_oversized_stride() {
        // One luma row and no chroma rows: the stride is never stepped over
        let frame = FrameBuffer::new(
            ImageFormat::Yuv420Flexible,
            4,
            1,
            CropRect::full(4, 1),
            vec![
                Plane::new(vec![1u8, 2, 3, 4], usize::MAX, 1),
                Plane::new(vec![128u8; 2], 2, 1),
                Plane::new(vec![128u8; 2], 2, 1),
            ],
        )
        .unwrap();
        assert_eq!(to_luminance(&frame).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(to_nv21(&frame).unwrap().len(), 6);
    }

    #[test]
    fn test_interleaved_chroma_row_with_oversized_stride() {
        // 4x2 frame: one chroma row of two samples, pixel stride 2
        let frame = FrameBuffer::new(
            ImageFormat::Yuv420Flexible,
            4,
            2,
            CropRect::full(4, 2),
            vec![
                Plane::new((0u8..8).collect::<Vec<u8>>(), 4, 1),
                Plane::new(vec![10u8, 0, 11], usize::MAX, 2),
                Plane::new(vec![20u8, 0, 21], usize::MAX, 2),
            ],
        )
        .unwrap();
        let nv21 = to_nv21(&frame).unwrap();
        assert_eq!(&nv21[8..], &[20, 10, 21, 11]);
    }

    fn arb_layout() -> impl Strategy<Value = (u32, u32, usize, usize)> {
        (1u32..24, 1u32..24, 0usize..8, 1usize..=2).prop_map(|(w, h, pad, ps)| (w, h, pad, ps))
    }

    /// Frame whose chroma planes use `pixel_stride` and rows padded by `pad`
    fn frame_with_layout(width: u32, height: u32, pad: usize, pixel_stride: usize) -> FrameBuffer {
        let (w, h) = (width as usize, height as usize);
        let row_stride = w + pad;
        let y: Vec<u8> = (0..row_stride * h).map(|i| (i * 7) as u8).collect();
        let (cw, ch) = ((w / 2).max(1), (h / 2).max(1));
        let chroma_stride = cw * pixel_stride + pad;
        let chroma = vec![77u8; chroma_stride * ch];
        FrameBuffer::new(
            ImageFormat::Yuv420Flexible,
            width,
            height,
            CropRect::full(width, height),
            vec![
                Plane::new(y, row_stride, 1),
                Plane::new(chroma.clone(), chroma_stride, pixel_stride),
                Plane::new(chroma, chroma_stride, pixel_stride),
            ],
        )
        .unwrap()
    }

    proptest! {
        #[test]
        fn luminance_length_is_width_times_height((w, h, pad, ps) in arb_layout()) {
            let frame = frame_with_layout(w, h, pad, ps);
            let luma = to_luminance(&frame).unwrap();
            prop_assert_eq!(luma.len(), (w * h) as usize);
            // Row r of the output is exactly the first w bytes of row r of the plane
            let plane = frame.planes()[0].data();
            for row in 0..h as usize {
                let start = row * (w as usize + pad);
                prop_assert_eq!(
                    &luma[row * w as usize..(row + 1) * w as usize],
                    &plane[start..start + w as usize]
                );
            }
        }

        #[test]
        fn nv21_length_for_even_sizes((w, h, pad, ps) in arb_layout()) {
            let (w, h) = (w * 2, h * 2);
            let frame = frame_with_layout(w, h, pad, ps);
            let nv21 = to_nv21(&frame).unwrap();
            prop_assert_eq!(nv21.len(), (w * h * 3 / 2) as usize);
            prop_assert!(nv21[(w * h) as usize..].iter().all(|&b| b == 77));
        }

        #[test]
        fn mismatched_crop_width_always_fails(declared in 1u32..64, actual in 1u32..64) {
            prop_assume!(declared != actual);
            let result = FrameBuffer::new(
                ImageFormat::Yuv420Flexible,
                declared,
                2,
                CropRect::full(actual, 2),
                vec![
                    Plane::new(vec![0u8; 256], 128, 1),
                    Plane::new(vec![0u8; 128], 64, 1),
                    Plane::new(vec![0u8; 128], 64, 1),
                ],
            );
            prop_assert!(matches!(result, Err(CaptureError::Format(_))));
        }
    }
}
