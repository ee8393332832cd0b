//! Rasterization seam.
//!
//! The renderer decides *what* to draw (screen quads, texture windows,
//! grid lines, labels) and hands the actual pixel work to a
//! [`TilePainter`] supplied by the host application. This keeps the
//! renderer free of any drawing backend and lets tests record draw calls
//! instead of producing pixels.

use crate::cache::Tile;
use crate::projection::ScreenPoint;

/// RGBA colour, 8 bits per channel.
pub type Color = [u8; 4];

/// Position inside a tile texture, `[0, 1]` on both axes with the origin
/// at the tile's top-left (see the convention note in `cache::tile`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TexCoord {
    pub u: f32,
    pub v: f32,
}

impl TexCoord {
    pub const fn new(u: f32, v: f32) -> Self {
        Self { u, v }
    }
}

/// Draw-call sink the renderer paints through.
pub trait TilePainter {
    /// Enables or disables bilinear texture filtering, returning the
    /// previous setting so callers can restore it.
    fn set_bilinear(&mut self, enabled: bool) -> bool;

    /// Sets the pen colour for subsequent lines and labels.
    fn set_pen(&mut self, color: Color);

    /// Fills the screen quad `corners` with the texture window of `tile`
    /// given by `tex`, both in the same corner order.
    fn draw_textured_quad(
        &mut self,
        corners: &[ScreenPoint; 4],
        tile: &Tile,
        tex: &[TexCoord; 4],
    );

    /// Draws a line segment with the current pen.
    fn draw_line(&mut self, from: ScreenPoint, to: ScreenPoint);

    /// Draws a text label centred at `at` with the current pen.
    fn draw_label(&mut self, at: ScreenPoint, text: &str);
}
