//! Screen/sky transform seam.
//!
//! The renderer consumes projection, unprojection, and the view frustum as
//! pure functions behind the [`SkyProjector`] trait; the enclosing
//! application supplies the real transform chain. [`GnomonicProjector`] is
//! a self-contained implementation used by tests and demos.

mod gnomonic;

pub use gnomonic::GnomonicProjector;

use crate::astro::SkyCoord;

/// A point on the destination surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another screen point.
    pub fn distance(&self, other: &ScreenPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// View volume descriptor: a set of inward-facing plane normals through
/// the observer.
///
/// A direction `v` is inside a plane when `v · n >= 0`. With no planes the
/// frustum accepts everything (useful for whole-sky test passes).
#[derive(Debug, Clone, Default)]
pub struct Frustum {
    planes: Vec<[f64; 3]>,
}

impl Frustum {
    /// A frustum that accepts every direction.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Builds a frustum from inward-facing plane normals.
    pub fn from_planes(planes: Vec<[f64; 3]>) -> Self {
        Self { planes }
    }

    /// Conservative intersection test between the view volume and a
    /// spherical quadrilateral given by its corner directions.
    ///
    /// Returns `false` when all four corners lie outside a single plane;
    /// this also rejects quads entirely behind the viewer when a near
    /// plane is present, so degenerate projections never reach the
    /// rasterizer. May return `true` for some invisible quads (the usual
    /// conservative trade-off); those waste a draw call but render
    /// off-screen.
    pub fn intersects_quad(&self, quad: &[SkyCoord; 4]) -> bool {
        let vecs: [[f64; 3]; 4] = [
            quad[0].unit_vector(),
            quad[1].unit_vector(),
            quad[2].unit_vector(),
            quad[3].unit_vector(),
        ];
        for n in &self.planes {
            let all_outside = vecs
                .iter()
                .all(|v| v[0] * n[0] + v[1] * n[1] + v[2] * n[2] < 0.0);
            if all_outside {
                return false;
            }
        }
        true
    }
}

/// Coordinate transforms for one view, supplied by the caller.
///
/// All methods are pure with respect to the current view; the renderer
/// calls them many times per frame and never mutates the projector.
pub trait SkyProjector {
    /// Centre of the destination surface, in pixels.
    fn screen_center(&self) -> ScreenPoint;

    /// Screen position of a sky direction, without any visibility check.
    /// Directions outside the view volume may land anywhere; the renderer
    /// frustum-culls before projecting.
    fn project(&self, coord: &SkyCoord) -> ScreenPoint;

    /// Sky direction under a screen position.
    fn unproject(&self, point: ScreenPoint) -> SkyCoord;

    /// View volume for the current projection state.
    fn frustum(&self) -> &Frustum;
}
