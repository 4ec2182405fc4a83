// SPDX-License-Identifier: MPL-2.0

//! Achromatic alpha mask and stencil compositing

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Opaque colour used when painting a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StencilColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl StencilColor {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    fn channels(&self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }
}

/// Single-colour stencil painted over a solid background
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stencil {
    pub foreground: StencilColor,
    pub background: StencilColor,
}

impl Default for Stencil {
    /// White on black
    fn default() -> Self {
        Self {
            foreground: StencilColor::WHITE,
            background: StencilColor::BLACK,
        }
    }
}

/// Luminance reinterpreted as per-pixel alpha
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl AlphaMask {
    pub(crate) fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major alpha values, `width * height` bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Paint the stencil's foreground through the mask onto its background
    ///
    /// The result is fully opaque; each pixel is the background blended
    /// toward the foreground by `alpha / 255`.
    pub fn paint(&self, stencil: &Stencil) -> RgbaImage {
        let fg = stencil.foreground.channels();
        let bg = stencil.background.channels();
        let mut out = RgbaImage::new(self.width, self.height);

        for (pixel, &alpha) in out.pixels_mut().zip(self.data.iter()) {
            let a = alpha as u32;
            let blend = |f: u8, b: u8| ((f as u32 * a + b as u32 * (255 - a) + 127) / 255) as u8;
            *pixel = Rgba([
                blend(fg[0], bg[0]),
                blend(fg[1], bg[1]),
                blend(fg[2], bg[2]),
                255,
            ]);
        }
        out
    }
}
