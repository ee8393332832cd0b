//! hipslayer - Progressive multi-resolution sky survey rendering
//!
//! This library renders HiPS (Hierarchical Progressive Survey) imagery:
//! the sky is pixelized into a nested hierarchy, tiles are fetched and
//! decoded in the background, and each frame flood-fills the visible
//! pixels at the resolution matching the field of view. The host
//! application supplies the coordinate transforms ([`SkyProjector`]) and
//! the rasterizer ([`TilePainter`]); everything in between lives here.

pub mod astro;
pub mod cache;
pub mod fetch;
pub mod healpix;
pub mod projection;
pub mod render;

pub use astro::{SkyCoord, JD2000};
pub use cache::{SurveyParams, Tile, TileCache, TileHandle, TileSource};
pub use fetch::{FetchError, ReqwestFetcher, TileFetcher};
pub use healpix::PixelId;
pub use projection::{Frustum, GnomonicProjector, ScreenPoint, SkyProjector};
pub use render::{FrameStats, HipsRenderer, RenderStyle, TilePainter, ViewState};
