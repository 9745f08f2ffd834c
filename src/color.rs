/// Color derivation - turns artwork swatches into a legible bar tint
/// Swatch priority, black/unresolved fallback, lightness lift for dark
/// colors, and the fixed translucent alpha

use std::sync::Arc;

/// HSL lightness floor for the bar tint. Anything darker gets lifted to
/// exactly this so bars stay visible against dark artwork.
pub const LEGIBILITY_LIGHTNESS: f32 = 0.46;

/// Fixed alpha applied to the final paint color (translucent)
pub const PAINT_ALPHA: u8 = 128;

/// Simple RGBA color
///
/// We define our own instead of pulling in a graphics crate - the host
/// converts to whatever its paint type is.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const WHITE: Self = Self::from_rgb(255, 255, 255);
    pub const BLACK: Self = Self::from_rgb(0, 0, 0);
    pub const TRANSPARENT: Self = Self::from_rgba(0, 0, 0, 0);

    /// Linear interpolation between two colors
    pub fn lerp(self, other: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            r: (self.r as f32 + (other.r as f32 - self.r as f32) * t) as u8,
            g: (self.g as f32 + (other.g as f32 - self.g as f32) * t) as u8,
            b: (self.b as f32 + (other.b as f32 - self.b as f32) * t) as u8,
            a: (self.a as f32 + (other.a as f32 - self.a as f32) * t) as u8,
        }
    }

    /// Same color with a different alpha component
    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Whether the RGB components match, ignoring alpha
    pub fn same_rgb(self, other: Self) -> bool {
        self.r == other.r && self.g == other.g && self.b == other.b
    }

    /// Relative luminance (sRGB, WCAG formula), 0.0 = black, 1.0 = white
    pub fn luminance(self) -> f32 {
        fn channel(c: u8) -> f32 {
            let c = c as f32 / 255.0;
            if c <= 0.03928 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        0.2126 * channel(self.r) + 0.7152 * channel(self.g) + 0.0722 * channel(self.b)
    }

    /// Convert to HSL (hue in degrees 0..360, saturation and lightness 0..1)
    pub fn to_hsl(self) -> (f32, f32, f32) {
        let r = self.r as f32 / 255.0;
        let g = self.g as f32 / 255.0;
        let b = self.b as f32 / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let l = (max + min) / 2.0;

        if delta == 0.0 {
            return (0.0, 0.0, l);
        }

        let s = delta / (1.0 - (2.0 * l - 1.0).abs());

        let h = if max == r {
            60.0 * (((g - b) / delta) % 6.0)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };

        (if h < 0.0 { h + 360.0 } else { h }, s, l)
    }

    /// Build a color from HSL components (alpha 255)
    pub fn from_hsl(h: f32, s: f32, l: f32) -> Self {
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let h_prime = (h.rem_euclid(360.0)) / 60.0;
        let x = c * (1.0 - (h_prime % 2.0 - 1.0).abs());

        let (r1, g1, b1) = match h_prime as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        let m = l - c / 2.0;
        Self::from_rgb(
            ((r1 + m) * 255.0).round() as u8,
            ((g1 + m) * 255.0).round() as u8,
            ((b1 + m) * 255.0).round() as u8,
        )
    }
}

/// Representative swatches produced by the dominant color extractor
#[derive(Clone, Copy, Debug, Default)]
pub struct Swatches {
    pub light_vibrant: Option<Rgba>,
    pub vibrant: Option<Rgba>,
    pub dark_vibrant: Option<Rgba>,
}

impl Swatches {
    /// Ordered fallback: light-vibrant, then vibrant, then dark-vibrant
    pub fn pick(&self) -> Option<Rgba> {
        self.light_vibrant.or(self.vibrant).or(self.dark_vibrant)
    }
}

/// Normalize a resolved swatch color into the final bar tint
///
/// Unresolved, transparent or pure black inputs fall back to white. Dark
/// colors get their HSL lightness lifted to the legibility floor without
/// touching hue or saturation. The result always carries the fixed
/// translucent alpha.
pub fn normalize_tint(resolved: Option<Rgba>) -> Rgba {
    let mut color = match resolved {
        None => Rgba::WHITE,
        Some(c) if c == Rgba::TRANSPARENT || c.same_rgb(Rgba::BLACK) => Rgba::WHITE,
        Some(c) => c,
    };

    if !color.same_rgb(Rgba::WHITE) && color.luminance() < LEGIBILITY_LIGHTNESS {
        let (h, s, _) = color.to_hsl();
        color = Rgba::from_hsl(h, s, LEGIBILITY_LIGHTNESS);
    }

    color.with_alpha(PAINT_ALPHA)
}

/// Album artwork handed to the dominant color extractor
///
/// The core never looks at the pixels itself; it only forwards them and
/// tracks identity so an unchanged artwork does not re-trigger extraction.
#[derive(Clone, Debug)]
pub struct Artwork {
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixel data, row-major
    pub pixels: Vec<u8>,
}

/// External dominant-color extractor
///
/// Extraction is asynchronous and may complete on an arbitrary thread, long
/// after the artwork changed again or the visualizer was destroyed - the
/// core guards its completion callback with an epoch and liveness check.
pub trait ColorExtractor: Send + Sync {
    fn extract(&self, artwork: Arc<Artwork>, on_result: Box<dyn FnOnce(Option<Swatches>) + Send>);
}

// ========== Tests ============
