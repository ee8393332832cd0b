//! Survey configuration.
//!
//! One HiPS survey is described by its base URL plus a handful of display
//! toggles. The configuration-store collaborator hands this struct to
//! [`crate::cache::TileCache::set_params`]; the renderer reads a snapshot
//! once per frame and never mutates it.

use crate::healpix::PixelId;
use serde::{Deserialize, Serialize};

/// Hierarchy level the all-sky mosaic is published at.
pub const ALLSKY_LEVEL: u8 = 3;

/// Tiles per row in the all-sky mosaic image.
pub const ALLSKY_TILES_PER_ROW: u32 = 27;

/// Active survey configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyParams {
    /// Base URL of the survey (the directory containing `Norder{n}/`).
    /// Empty means "no survey configured" and disables rendering.
    pub url: String,
    /// Deepest hierarchy level the survey publishes.
    pub max_level: u8,
    /// Tile edge size in pixels.
    pub tile_width: u32,
    /// Master enable for the survey layer.
    pub render: bool,
    /// Request bilinear filtering from the rasterizer when useful.
    pub bilinear: bool,
    /// Draw pixel boundaries and id labels over the tiles.
    pub show_grid: bool,
    /// Use the coarse all-sky mosaic for wide fields instead of
    /// fetching individual level-3 tiles.
    pub show_allsky: bool,
    /// Tile image file extension (`jpg` or `png` for most surveys).
    pub extension: String,
}

impl Default for SurveyParams {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_level: 9,
            tile_width: 512,
            render: false,
            bilinear: true,
            show_grid: false,
            show_allsky: true,
            extension: "jpg".to_string(),
        }
    }
}

impl SurveyParams {
    /// Whether the configuration names a usable survey.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }

    /// URL of one tile, following the HiPS directory scheme: tiles are
    /// grouped into `Dir` buckets of ten thousand.
    pub fn tile_url(&self, level: u8, pixel: PixelId) -> String {
        let dir = (pixel.0 / 10_000) * 10_000;
        format!(
            "{}/Norder{}/Dir{}/Npix{}.{}",
            self.base(),
            level,
            dir,
            pixel.0,
            self.extension
        )
    }

    /// URL of the all-sky mosaic.
    pub fn allsky_url(&self) -> String {
        format!("{}/Norder{}/Allsky.{}", self.base(), ALLSKY_LEVEL, self.extension)
    }

    fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}
