//! Raster — the RGBA pixel buffer behind the shared drawing surface.
//!
//! DESIGN
//! ======
//! Pixels are stored row-major, four straight-alpha bytes per pixel. Every
//! painting primitive uses integer source-over blending, so replaying the same
//! operations onto the same starting buffer is bit-identical. The action log
//! relies on that: a replay from a cached snapshot and a replay from an empty
//! surface must land on the same bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RasterError {
    #[error("pixel data is {actual} bytes, expected {expected} for {width}x{height}")]
    Length { width: u32, height: u32, expected: usize, actual: usize },
    #[error("pixel block is {actual_width}x{actual_height}, rectangle is {width}x{height}")]
    BlockSize { width: u32, height: u32, actual_width: u32, actual_height: u32 },
    #[error("{width}x{height} raster does not fit in memory")]
    TooLarge { width: u32, height: u32 },
    #[error("invalid color: {0}")]
    Color(String),
}

// =============================================================================
// GEOMETRY
// =============================================================================

/// A point in surface coordinates (pixels, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Half-open pixel rectangle `[x1, x2) x [y1, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    /// Build a rectangle from two corners in any order.
    #[must_use]
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1: x1.min(x2), y1: y1.min(y2), x2: x1.max(x2), y2: y1.max(y2) }
    }

    /// The rectangle covering a whole `width` x `height` surface.
    #[must_use]
    pub fn covering(width: u32, height: u32) -> Self {
        let w = i32::try_from(width).unwrap_or(i32::MAX);
        let h = i32::try_from(height).unwrap_or(i32::MAX);
        Self { x1: 0, y1: 0, x2: w, y2: h }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        u32::try_from(i64::from(self.x2) - i64::from(self.x1)).unwrap_or(0)
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        u32::try_from(i64::from(self.y2) - i64::from(self.y1)).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Overlap of two rectangles, or `None` when they do not overlap.
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        (r.x1 < r.x2 && r.y1 < r.y2).then_some(r)
    }
}

// =============================================================================
// COLOR
// =============================================================================

/// Straight-alpha RGBA color. Travels on the wire as a CSS-style string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);

    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    /// Scale alpha by `opacity`, clamped to `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn with_opacity(self, opacity: f64) -> Self {
        let opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
        let a = (f64::from(self.a) * opacity).round() as u8;
        Self { a, ..self }
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa` or one of a few CSS color names.
    ///
    /// # Errors
    ///
    /// Returns `RasterError::Color` when the string is not a recognized color.
    pub fn parse(s: &str) -> Result<Self, RasterError> {
        let trimmed = s.trim();
        let invalid = || RasterError::Color(s.to_owned());

        if let Some(hex) = trimmed.strip_prefix('#') {
            if !hex.is_ascii() {
                return Err(invalid());
            }
            let byte = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).map_err(|_| invalid());
            let nibble = |i: usize| byte(i..i + 1).map(|v| v * 17);
            return match hex.len() {
                3 => Ok(Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
                6 => Ok(Self::rgb(byte(0..2)?, byte(2..4)?, byte(4..6)?)),
                8 => Ok(Self::rgba(byte(0..2)?, byte(2..4)?, byte(4..6)?, byte(6..8)?)),
                _ => Err(invalid()),
            };
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "white" => Ok(Self::WHITE),
            "black" => Ok(Self::BLACK),
            "red" => Ok(Self::rgb(255, 0, 0)),
            "green" => Ok(Self::rgb(0, 128, 0)),
            "blue" => Ok(Self::rgb(0, 0, 255)),
            "yellow" => Ok(Self::rgb(255, 255, 0)),
            "orange" => Ok(Self::rgb(255, 165, 0)),
            "transparent" => Ok(Self::TRANSPARENT),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl FromStr for Color {
    type Err = RasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Color {
    type Error = RasterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

// =============================================================================
// RASTER
// =============================================================================

/// Owned RGBA pixel buffer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RasterRepr", into = "RasterRepr")]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct RasterRepr {
    width: u32,
    height: u32,
    #[serde(with = "base64_bytes")]
    pixels: Vec<u8>,
}

impl TryFrom<RasterRepr> for Raster {
    type Error = RasterError;

    fn try_from(repr: RasterRepr) -> Result<Self, Self::Error> {
        Raster::from_rgba(repr.width, repr.height, repr.pixels)
    }
}

impl From<Raster> for RasterRepr {
    fn from(raster: Raster) -> Self {
        Self { width: raster.width, height: raster.height, pixels: raster.pixels }
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

fn byte_len(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)?.checked_mul(4)
}

impl Raster {
    /// A fully transparent raster.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixels: vec![0; byte_len(width, height).unwrap_or(usize::MAX)] }
    }

    /// A raster filled with one color.
    #[must_use]
    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        let pixels = [color.r, color.g, color.b, color.a].repeat((width as usize).saturating_mul(height as usize));
        Self { width, height, pixels }
    }

    /// Wrap raw RGBA bytes.
    ///
    /// # Errors
    ///
    /// Returns `RasterError::TooLarge` if the dimensions overflow, or
    /// `RasterError::Length` if `pixels` is not `width * height * 4` bytes.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, RasterError> {
        let expected = byte_len(width, height).ok_or(RasterError::TooLarge { width, height })?;
        if pixels.len() != expected {
            return Err(RasterError::Length { width, height, expected, actual: pixels.len() });
        }
        Ok(Self { width, height, pixels })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::covering(self.width, self.height)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Color at `(x, y)`, or `None` outside the raster.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x, y);
        let p = &self.pixels[i..i + 4];
        Some(Color::rgba(p[0], p[1], p[2], p[3]))
    }

    /// True if every pixel is fully transparent.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|b| *b == 0)
    }

    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Paint a round-capped line of `width` from `from` to `to`, source-over.
    /// A zero-length line paints a dot.
    pub fn stroke_segment(&mut self, from: Point, to: Point, width: f64, color: Color) {
        if color.a == 0 {
            return;
        }
        self.cover_capsule(from, to, width, |px| blend_over(px, color));
    }

    /// Clear a round-capped line of `width` back to transparent (eraser).
    pub fn erase_segment(&mut self, from: Point, to: Point, width: f64) {
        self.cover_capsule(from, to, width, |px| px.fill(0));
    }

    /// Replace the pixels inside `rect` with `block`, clipped to the raster.
    ///
    /// # Errors
    ///
    /// Returns `RasterError::BlockSize` (and leaves the raster untouched) when
    /// `block` does not have the dimensions of `rect`.
    pub fn blit(&mut self, rect: Rect, block: &Raster) -> Result<(), RasterError> {
        if block.width != rect.width() || block.height != rect.height() {
            return Err(RasterError::BlockSize {
                width: rect.width(),
                height: rect.height(),
                actual_width: block.width,
                actual_height: block.height,
            });
        }
        let Some(clip) = rect.intersect(&self.bounds()) else {
            return Ok(());
        };
        let run = clip.width() as usize * 4;
        for y in clip.y1..clip.y2 {
            let src = block.offset(to_u32(clip.x1 - rect.x1), to_u32(y - rect.y1));
            let dst = self.offset(to_u32(clip.x1), to_u32(y));
            self.pixels[dst..dst + run].copy_from_slice(&block.pixels[src..src + run]);
        }
        Ok(())
    }

    /// Copy the pixels inside `rect`. Areas outside the raster read as transparent.
    #[must_use]
    pub fn extract(&self, rect: Rect) -> Raster {
        let mut out = Raster::new(rect.width(), rect.height());
        let Some(clip) = rect.intersect(&self.bounds()) else {
            return out;
        };
        let run = clip.width() as usize * 4;
        for y in clip.y1..clip.y2 {
            let src = self.offset(to_u32(clip.x1), to_u32(y));
            let dst = out.offset(to_u32(clip.x1 - rect.x1), to_u32(y - rect.y1));
            out.pixels[dst..dst + run].copy_from_slice(&self.pixels[src..src + run]);
        }
        out
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * 4
    }

    /// Visit every pixel whose center lies within `width / 2` of the segment.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn cover_capsule(&mut self, from: Point, to: Point, width: f64, mut paint: impl FnMut(&mut [u8])) {
        let radius = (width / 2.0).max(0.5);
        let min_x = (from.x.min(to.x) - radius).floor().max(0.0);
        let min_y = (from.y.min(to.y) - radius).floor().max(0.0);
        let max_x = (from.x.max(to.x) + radius).ceil().min(f64::from(self.width));
        let max_y = (from.y.max(to.y) + radius).ceil().min(f64::from(self.height));
        if !(min_x < max_x && min_y < max_y) {
            return;
        }

        for py in (min_y as u32)..(max_y as u32) {
            for px in (min_x as u32)..(max_x as u32) {
                let center = Point::new(f64::from(px) + 0.5, f64::from(py) + 0.5);
                if distance_to_segment(center, from, to) <= radius {
                    let i = self.offset(px, py);
                    paint(&mut self.pixels[i..i + 4]);
                }
            }
        }
    }
}

fn to_u32(v: i32) -> u32 {
    u32::try_from(v).unwrap_or(0)
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return (p.x - a.x).hypot(p.y - a.y);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    (p.x - (a.x + t * dx)).hypot(p.y - (a.y + t * dy))
}

/// Integer source-over blend of `src` onto the pixel `dst` (straight alpha).
#[allow(clippy::cast_possible_truncation)]
fn blend_over(dst: &mut [u8], src: Color) {
    let sa = u32::from(src.a);
    let da = u32::from(dst[3]);
    let inv = 255 - sa;
    // Alpha scaled by 255 to keep the channel math in integers.
    let out_a255 = sa * 255 + da * inv;
    if out_a255 == 0 {
        dst.fill(0);
        return;
    }
    let channel = |s: u8, d: u8| -> u8 {
        let num = u32::from(s) * sa * 255 + u32::from(d) * da * inv;
        ((num + out_a255 / 2) / out_a255) as u8
    };
    dst[0] = channel(src.r, dst[0]);
    dst[1] = channel(src.g, dst[1]);
    dst[2] = channel(src.b, dst[2]);
    dst[3] = ((out_a255 + 127) / 255) as u8;
}

#[cfg(test)]
#[path = "raster_test.rs"]
mod tests;
