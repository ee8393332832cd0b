//! Decoded tiles, cache keys, and the ownership-tagged lookup result.
//!
//! Texture-coordinate convention throughout the crate: `u` maps to the
//! image x axis, `v` to the image y axis, both in `[0, 1]` with the
//! origin at the image's top-left pixel.

use crate::healpix::PixelId;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::sync::Arc;

/// A decoded raster tile.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    image: RgbaImage,
}

impl Tile {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Decodes a tile from raw payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        Ok(Self {
            image: image::load_from_memory(bytes)?.to_rgba8(),
        })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Decoded size in bytes, used for the cache's byte budget and the
    /// renderer's per-frame accounting.
    pub fn byte_size(&self) -> u64 {
        self.image.as_raw().len() as u64
    }

    /// Crops the unit-square region at (`u0`, `v0`) with edge `size` and
    /// upsamples it to a `target_width` square tile.
    ///
    /// Nearest-neighbour scaling on purpose: the stand-in is already
    /// magnified ancestor data, and the rasterizer applies its own
    /// filtering when enabled.
    pub fn crop_upsampled(&self, u0: f64, v0: f64, size: f64, target_width: u32) -> Tile {
        let w = self.image.width();
        let h = self.image.height();
        let x = ((u0 * w as f64) as u32).min(w.saturating_sub(1));
        let y = ((v0 * h as f64) as u32).min(h.saturating_sub(1));
        let cw = ((size * w as f64).round() as u32).max(1).min(w - x);
        let ch = ((size * h as f64).round() as u32).max(1).min(h - y);

        let cropped = imageops::crop_imm(&self.image, x, y, cw, ch).to_image();
        Tile::new(imageops::resize(
            &cropped,
            target_width,
            target_width,
            FilterType::Nearest,
        ))
    }

    /// Crops a square of `edge` pixels at tile grid position (`col`, `row`),
    /// as laid out in the all-sky mosaic.
    pub fn crop_square(&self, col: u32, row: u32, edge: u32) -> Tile {
        Tile::new(imageops::crop_imm(&self.image, col * edge, row * edge, edge, edge).to_image())
    }
}

/// Key of one cache entry, namespaced by configuration generation so a
/// late fetch completion for a superseded survey can never alias an entry
/// of the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKey {
    /// One survey tile at (level, pixel).
    Survey {
        generation: u64,
        level: u8,
        pixel: PixelId,
    },
    /// The order-3 all-sky mosaic.
    Allsky { generation: u64 },
}

impl TileKey {
    pub fn generation(&self) -> u64 {
        match self {
            TileKey::Survey { generation, .. } => *generation,
            TileKey::Allsky { generation } => *generation,
        }
    }
}

/// Result of a tile lookup, tagged with ownership.
///
/// `Cached` borrows the cache's copy (shared `Arc`, returned to the cache
/// by dropping the handle); `Synthesized` is a stand-in built for this
/// call (ancestor upsample or all-sky crop) that the caller owns outright.
/// Dropping the handle is the single release path for both variants.
#[derive(Debug)]
pub enum TileHandle {
    Cached(Arc<Tile>),
    Synthesized(Tile),
}

impl TileHandle {
    /// The pixels to draw, regardless of ownership.
    pub fn tile(&self) -> &Tile {
        match self {
            TileHandle::Cached(t) => t,
            TileHandle::Synthesized(t) => t,
        }
    }

    /// Whether this handle borrows the cache's resident copy.
    pub fn is_cached(&self) -> bool {
        matches!(self, TileHandle::Cached(_))
    }
}
