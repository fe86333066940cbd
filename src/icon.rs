//! Buffer and icon types exchanged between pipeline stages.
//!
//! Raw renders are linear float RGB images tagged with the background they
//! were cleared to; final icons are 8-bit RGBA at the configured canvas size.

use image::{Rgb32FImage, RgbaImage};
use palette::Srgb;

/// A 2D size in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct SizePx {
    pub width: u32,
    pub height: u32,
}

impl SizePx {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if width equals height.
    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    /// Returns true if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Integer pixel rectangle in buffer space.
///
/// `right` and `bottom` are edge coordinates, so a box covering a whole
/// `w`x`h` buffer is `(0, 0, w, h)`. Always satisfies `left <= right` and
/// `top <= bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    /// Creates a box, swapping coordinates if given in the wrong order.
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left: left.min(right),
            top: top.min(bottom),
            right: left.max(right),
            bottom: top.max(bottom),
        }
    }

    /// A box covering an entire buffer.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Returns true if the box has no area.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Returns true if the box lies inside a `width`x`height` buffer.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right <= width && self.bottom <= height
    }
}

/// Clear color used for one of the two raw renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    Black,
    White,
}

impl Background {
    /// The clear color.
    pub fn color(self) -> Srgb<f32> {
        match self {
            Self::Black => Srgb::new(0.0, 0.0, 0.0),
            Self::White => Srgb::new(1.0, 1.0, 1.0),
        }
    }
}

/// A raw offscreen render with channels in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRenderBuffer {
    pub image: Rgb32FImage,
    pub background: Background,
}

impl RawRenderBuffer {
    pub fn new(image: Rgb32FImage, background: Background) -> Self {
        Self { image, background }
    }

    /// A buffer filled with its background color.
    pub fn cleared(width: u32, height: u32, background: Background) -> Self {
        let c = background.color();
        let image = Rgb32FImage::from_pixel(width, height, image::Rgb([c.red, c.green, c.blue]));
        Self { image, background }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A finished RGBA icon at canvas size.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalIcon {
    pub data: RgbaImage,
}

impl FinalIcon {
    pub fn new(data: RgbaImage) -> Self {
        Self { data }
    }

    /// Returns the pixel dimensions of the icon.
    pub fn dimensions(&self) -> SizePx {
        SizePx::new(self.data.width(), self.data.height())
    }

    /// Number of pixels with non-zero alpha.
    pub fn coverage(&self) -> usize {
        self.data.pixels().filter(|p| p[3] > 0).count()
    }
}

/// The output of one render call: the icon plus the optional faction mask.
#[derive(Debug, Clone, PartialEq)]
pub struct IconPair {
    pub icon: FinalIcon,
    pub mask: Option<FinalIcon>,
}

impl IconPair {
    /// Iterates the produced icons, mask last.
    pub fn iter(&self) -> impl Iterator<Item = &FinalIcon> {
        std::iter::once(&self.icon).chain(self.mask.iter())
    }
}
