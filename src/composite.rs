//! Autocrop, fit transform and black/white alpha recovery.
//!
//! Two renders of the same frame, one cleared to black and one to white,
//! are enough to recover per-pixel transparency:
//!
//! ```text
//! black = C * a
//! white = C * a + (1 - a)
//! a     = 1 - (white - black)
//! C     = black / a
//! ```
//!
//! The subject is found in the black render, cropped to a square around its
//! bounding box, padded, and resampled onto the output canvas in one step.

use image::{Rgb32FImage, Rgba, RgbaImage};
use log::debug;

use crate::error::{IconError, Result};
use crate::icon::{Background, BoundingBox, RawRenderBuffer, SizePx};
use crate::math::Vec2;

/// Sampling stride used when searching for the subject.
pub const SCAN_STRIDE: u32 = 5;

/// Minimum R+G+B sum, on a `[0, 1]` scale, for a pixel to count as foreground.
pub const BRIGHTNESS_EPSILON: f32 = 0.01;

/// Alpha at or below which a pixel is written as transparent black.
pub const ALPHA_EPSILON: f32 = 1.0 / 512.0;

// ============================================================================
// Autocrop
// ============================================================================

/// Scans the black-background render every `stride` pixels and returns the
/// smallest box around bright samples, grown by `2 * stride` on each side
/// and clamped to the buffer. `None` if nothing is brighter than the threshold.
pub fn scan_foreground(black: &Rgb32FImage, stride: u32) -> Option<BoundingBox> {
    let stride = stride.max(1);
    let (width, height) = black.dimensions();

    let mut found: Option<(u32, u32, u32, u32)> = None;
    for x in (0..width).step_by(stride as usize) {
        for y in (0..height).step_by(stride as usize) {
            let [r, g, b] = black.get_pixel(x, y).0;
            if r + g + b <= BRIGHTNESS_EPSILON {
                continue;
            }
            found = Some(match found {
                None => (x, y, x, y),
                Some((l, t, r, b)) => (l.min(x), t.min(y), r.max(x), b.max(y)),
            });
        }
    }

    let (left, top, right, bottom) = found?;
    let margin = stride * 2;
    Some(BoundingBox::new(
        left.saturating_sub(margin),
        top.saturating_sub(margin),
        (right + margin).min(width),
        (bottom + margin).min(height),
    ))
}

/// Bounding box of the subject, or the whole buffer when none is found.
pub fn autocrop(black: &Rgb32FImage, stride: u32) -> BoundingBox {
    scan_foreground(black, stride).unwrap_or_else(|| {
        debug!("no foreground found, using the full buffer");
        BoundingBox::full(black.width(), black.height())
    })
}

// ============================================================================
// Fit transform
// ============================================================================

/// Maps canvas UV to source-buffer UV: `src = canvas * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitTransform {
    pub scale: f32,
    pub offset: Vec2,
}

impl FitTransform {
    /// The identity mapping.
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            offset: Vec2::zeros(),
        }
    }

    /// Source UV for a canvas UV.
    pub fn apply(&self, uv: Vec2) -> Vec2 {
        uv * self.scale + self.offset
    }
}

/// Computes the transform that fits `bounds` into the canvas.
///
/// The dominant axis of the box fills the canvas, the other axis is
/// centered, then `padding` (a fraction of the box size) is added on every
/// side and `offset` shifts the result in the same units.
pub fn fit_transform(bounds: &BoundingBox, buffer_width: u32, padding: f32, offset: Vec2) -> FitTransform {
    let w = buffer_width.max(1) as f32;
    let size = Vec2::new(bounds.width() as f32, bounds.height() as f32);
    let max_size = size.x.max(size.y);
    let scale = max_size / w;
    let padding_amount = scale * padding * 2.0;

    let aspect_pad = (Vec2::new(max_size, max_size) - size) * 0.5;
    let top_left = Vec2::new(bounds.left as f32, bounds.top as f32);
    let scaled_offset = (top_left - aspect_pad) / w;
    let additional = offset * scale + Vec2::new(padding, padding) * scale;

    FitTransform {
        scale: scale + padding_amount,
        offset: scaled_offset - additional,
    }
}

// ============================================================================
// Alpha recovery
// ============================================================================

/// Recovers straight-alpha RGBA from a pixel rendered over black and white.
///
/// Alpha uses the largest per-channel difference, so channel noise can only
/// make a pixel more transparent. Colors are unpremultiplied and clamped.
pub fn recover_pixel(black: [f32; 3], white: [f32; 3]) -> [f32; 4] {
    let diff = (0..3).map(|i| white[i] - black[i]).fold(f32::NEG_INFINITY, f32::max);
    let alpha = (1.0 - diff).clamp(0.0, 1.0);
    if alpha <= ALPHA_EPSILON {
        return [0.0; 4];
    }
    [
        (black[0] / alpha).clamp(0.0, 1.0),
        (black[1] / alpha).clamp(0.0, 1.0),
        (black[2] / alpha).clamp(0.0, 1.0),
        alpha,
    ]
}

/// Bilinear sample with clamp-to-edge addressing, UV in `[0, 1]` over the image.
pub fn sample_bilinear(image: &Rgb32FImage, uv: Vec2) -> [f32; 3] {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return [0.0; 3];
    }
    let x = (uv.x * width as f32 - 0.5).clamp(0.0, (width - 1) as f32);
    let y = (uv.y * height as f32 - 0.5).clamp(0.0, (height - 1) as f32);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(width - 1), (y0 + 1).min(height - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let p = |x, y| image.get_pixel(x, y).0;
    let (a, b, c, d) = (p(x0, y0), p(x1, y0), p(x0, y1), p(x1, y1));
    [0, 1, 2].map(|i| {
        let top = a[i] + (b[i] - a[i]) * fx;
        let bottom = c[i] + (d[i] - c[i]) * fx;
        top + (bottom - top) * fy
    })
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Resamples the black/white pair through `fit` and writes recovered RGBA
/// into `target`, which must already have the canvas size.
pub fn composite_into(black: &RawRenderBuffer, white: &RawRenderBuffer, fit: &FitTransform, target: &mut RgbaImage) -> Result<()> {
    if black.background != Background::Black || white.background != Background::White {
        return Err(IconError::RenderBackendFailure(
            "alpha recovery needs one black and one white render".into(),
        ));
    }
    if black.image.dimensions() != white.image.dimensions() {
        return Err(IconError::RenderBackendFailure(format!(
            "render pair size mismatch: {:?} vs {:?}",
            black.image.dimensions(),
            white.image.dimensions()
        )));
    }

    let (cw, ch) = target.dimensions();
    for (x, y, pixel) in target.enumerate_pixels_mut() {
        let uv = Vec2::new((x as f32 + 0.5) / cw as f32, (y as f32 + 0.5) / ch as f32);
        let src = fit.apply(uv);
        let rgba = recover_pixel(sample_bilinear(&black.image, src), sample_bilinear(&white.image, src));
        *pixel = Rgba(rgba.map(to_u8));
    }
    Ok(())
}

/// Autocrops, fits and recovers alpha in one call, producing a new canvas.
pub fn composite(
    black: &RawRenderBuffer,
    white: &RawRenderBuffer,
    canvas: SizePx,
    padding: f32,
    offset: Vec2,
) -> Result<RgbaImage> {
    if canvas.is_empty() {
        return Err(IconError::InvalidResolution {
            width: canvas.width,
            height: canvas.height,
        });
    }
    let bounds = autocrop(&black.image, SCAN_STRIDE);
    let fit = fit_transform(&bounds, black.width(), padding, offset);
    debug!("autocrop {bounds:?} -> fit {fit:?}");
    let mut target = RgbaImage::new(canvas.width, canvas.height);
    composite_into(black, white, &fit, &mut target)?;
    Ok(target)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb;

    fn pair_with_square(size: u32, rect: (u32, u32, u32, u32), color: [f32; 3], alpha: f32) -> (RawRenderBuffer, RawRenderBuffer) {
        let mut black = RawRenderBuffer::cleared(size, size, Background::Black);
        let mut white = RawRenderBuffer::cleared(size, size, Background::White);
        let (l, t, r, b) = rect;
        for y in t..b {
            for x in l..r {
                black.image.put_pixel(x, y, Rgb(color.map(|c| c * alpha)));
                white.image.put_pixel(x, y, Rgb(color.map(|c| c * alpha + (1.0 - alpha))));
            }
        }
        (black, white)
    }

    #[test]
    fn alpha_recovery_matches_half_transparent_red() {
        let rgba = recover_pixel([0.5, 0.0, 0.0], [0.75, 0.5, 0.5]);
        assert_relative_eq!(rgba[3], 0.5, epsilon = 1e-6);
        assert_relative_eq!(rgba[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(rgba[1], 0.0);
        assert_relative_eq!(rgba[2], 0.0);
    }

    #[test]
    fn alpha_recovery_roundtrips_composited_colors() {
        for (color, alpha) in [([1.0, 0.0, 0.0], 0.5), ([0.2, 0.4, 0.8], 0.25), ([0.9, 0.9, 0.1], 1.0)] {
            let black = color.map(|c: f32| c * alpha);
            let white = color.map(|c: f32| c * alpha + (1.0 - alpha));
            let rgba = recover_pixel(black, white);
            assert_relative_eq!(rgba[3], alpha, epsilon = 1e-5);
            for i in 0..3 {
                assert_relative_eq!(rgba[i], color[i], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn background_pixels_become_transparent_black() {
        assert_eq!(recover_pixel([0.0; 3], [1.0; 3]), [0.0; 4]);
    }

    #[test]
    fn scan_finds_subject_with_margin() {
        let (black, _) = pair_with_square(100, (40, 30, 61, 51), [1.0, 1.0, 1.0], 1.0);
        let bounds = scan_foreground(&black.image, 5).unwrap();
        assert_eq!(bounds, BoundingBox::new(30, 20, 70, 60));
    }

    #[test]
    fn scan_margin_is_clamped_to_buffer() {
        let (black, _) = pair_with_square(50, (0, 0, 3, 3), [1.0, 1.0, 1.0], 1.0);
        let bounds = scan_foreground(&black.image, 5).unwrap();
        assert_eq!(bounds, BoundingBox::new(0, 0, 10, 10));
        assert!(bounds.fits_within(50, 50));
    }

    #[test]
    fn dim_pixels_are_background() {
        let (black, _) = pair_with_square(20, (5, 5, 15, 15), [0.003, 0.003, 0.003], 1.0);
        assert!(scan_foreground(&black.image, 5).is_none());
    }

    #[test]
    fn empty_buffer_autocrops_to_full_canvas() {
        let black = RawRenderBuffer::cleared(64, 48, Background::Black);
        let bounds = autocrop(&black.image, SCAN_STRIDE);
        assert_eq!(bounds, BoundingBox::full(64, 48));
        assert!(bounds.left <= bounds.right && bounds.top <= bounds.bottom);

        // Full square box with no padding maps the canvas onto the whole buffer.
        let fit = fit_transform(&BoundingBox::full(64, 64), 64, 0.0, Vec2::zeros());
        assert_eq!(fit, FitTransform::identity());
    }

    #[test]
    fn fit_centers_the_short_axis() {
        let bounds = BoundingBox::new(20, 40, 60, 60);
        let fit = fit_transform(&bounds, 100, 0.0, Vec2::zeros());
        assert_relative_eq!(fit.scale, 0.4);
        // 40 wide, 20 tall: 10 px of vertical padding on each side.
        assert_relative_eq!(fit.offset, Vec2::new(0.2, 0.3), epsilon = 1e-6);
        assert_relative_eq!(fit.apply(Vec2::new(1.0, 1.0)), Vec2::new(0.6, 0.7), epsilon = 1e-6);
    }

    #[test]
    fn padding_grows_the_window_symmetrically() {
        let bounds = BoundingBox::new(20, 20, 60, 60);
        let fit = fit_transform(&bounds, 100, 0.1, Vec2::zeros());
        assert_relative_eq!(fit.scale, 0.4 + 0.08, epsilon = 1e-6);
        assert_relative_eq!(fit.apply(Vec2::zeros()), Vec2::new(0.16, 0.16), epsilon = 1e-6);
        assert_relative_eq!(fit.apply(Vec2::new(1.0, 1.0)), Vec2::new(0.64, 0.64), epsilon = 1e-6);
    }

    #[test]
    fn offset_shifts_in_subject_units() {
        let bounds = BoundingBox::new(20, 20, 60, 60);
        let fit = fit_transform(&bounds, 100, 0.0, Vec2::new(0.5, 0.0));
        assert_relative_eq!(fit.offset, Vec2::new(0.2 - 0.2, 0.2), epsilon = 1e-6);
    }

    #[test]
    fn bilinear_sampling_clamps_to_edge() {
        let mut img = Rgb32FImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([0.0, 0.0, 0.0]));
        img.put_pixel(1, 0, Rgb([1.0, 1.0, 1.0]));
        assert_relative_eq!(sample_bilinear(&img, Vec2::new(0.5, 0.5))[0], 0.5);
        assert_relative_eq!(sample_bilinear(&img, Vec2::new(-3.0, 0.5))[0], 0.0);
        assert_relative_eq!(sample_bilinear(&img, Vec2::new(4.0, 0.5))[0], 1.0);
    }

    #[test]
    fn composite_fills_canvas_with_subject() {
        let (black, white) = pair_with_square(200, (50, 50, 150, 150), [0.2, 0.6, 0.4], 1.0);
        let icon = composite(&black, &white, SizePx::new(64, 64), 0.0, Vec2::zeros()).unwrap();
        assert_eq!(icon.dimensions(), (64, 64));

        let center = icon.get_pixel(32, 32).0;
        assert_eq!(center[3], 255);
        assert_eq!(&center[..3], &[51, 153, 102]);
    }

    #[test]
    fn composite_padding_leaves_transparent_border() {
        let (black, white) = pair_with_square(200, (50, 50, 150, 150), [1.0, 1.0, 1.0], 1.0);
        let icon = composite(&black, &white, SizePx::new(64, 64), 0.2, Vec2::zeros()).unwrap();
        assert_eq!(icon.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(icon.get_pixel(63, 63).0, [0, 0, 0, 0]);
        assert_eq!(icon.get_pixel(32, 32).0[3], 255);
    }

    #[test]
    fn composite_preserves_partial_alpha() {
        let (black, white) = pair_with_square(100, (0, 0, 100, 100), [1.0, 0.0, 0.0], 0.5);
        let icon = composite(&black, &white, SizePx::new(8, 8), 0.0, Vec2::zeros()).unwrap();
        let p = icon.get_pixel(4, 4).0;
        assert_eq!(p, [255, 0, 0, 128]);
    }

    #[test]
    fn mismatched_pair_is_rejected() {
        let black = RawRenderBuffer::cleared(10, 10, Background::Black);
        let white = RawRenderBuffer::cleared(12, 12, Background::White);
        let err = composite(&black, &white, SizePx::new(4, 4), 0.0, Vec2::zeros()).unwrap_err();
        assert!(matches!(err, IconError::RenderBackendFailure(_)));

        let err = composite(&black, &black, SizePx::new(4, 4), 0.0, Vec2::zeros()).unwrap_err();
        assert!(matches!(err, IconError::RenderBackendFailure(_)));

        let err = composite(&black, &black, SizePx::new(0, 4), 0.0, Vec2::zeros()).unwrap_err();
        assert!(matches!(err, IconError::InvalidResolution { .. }));
    }
}
