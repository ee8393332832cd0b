//! Gnomonic (tangent-plane) projection.
//!
//! Reference [`SkyProjector`] implementation: straight-line projection of
//! the sphere onto the plane tangent at the view centre. Accurate enough
//! for the narrow fields the tile renderer is exercised with, and cheap to
//! reason about in tests.

use super::{Frustum, ScreenPoint, SkyProjector};
use crate::astro::SkyCoord;

/// Tangent-plane projector for a rectangular viewport.
#[derive(Debug, Clone)]
pub struct GnomonicProjector {
    center: SkyCoord,
    width: f64,
    height: f64,
    focal: f64,
    forward: [f64; 3],
    east: [f64; 3],
    up: [f64; 3],
    frustum: Frustum,
}

impl GnomonicProjector {
    /// Creates a projector for a `width`×`height` pixel viewport centred
    /// on `center` with the given horizontal field of view (radians).
    pub fn new(center: SkyCoord, fov: f64, width: f64, height: f64) -> Self {
        let forward = center.unit_vector();
        let (sa, ca) = center.ra.sin_cos();
        let (sd, cd) = center.dec.sin_cos();
        // East along increasing RA, up along increasing Dec.
        let east = [-sa, ca, 0.0];
        let up = [-sd * ca, -sd * sa, cd];

        let focal = (width / 2.0) / (fov / 2.0).tan();
        let half_x = fov / 2.0;
        let half_y = ((height / 2.0) / focal).atan();

        let blend = |a: [f64; 3], wa: f64, b: [f64; 3], wb: f64| {
            [
                a[0] * wa + b[0] * wb,
                a[1] * wa + b[1] * wb,
                a[2] * wa + b[2] * wb,
            ]
        };
        // Four side planes plus a near plane that rejects the rear
        // hemisphere outright.
        let frustum = Frustum::from_planes(vec![
            forward,
            blend(east, half_x.cos(), forward, half_x.sin()),
            blend(east, -half_x.cos(), forward, half_x.sin()),
            blend(up, half_y.cos(), forward, half_y.sin()),
            blend(up, -half_y.cos(), forward, half_y.sin()),
        ]);

        Self {
            center,
            width,
            height,
            focal,
            forward,
            east,
            up,
            frustum,
        }
    }

    /// The sky direction the view is centred on.
    pub fn view_center(&self) -> SkyCoord {
        self.center
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

impl SkyProjector for GnomonicProjector {
    fn screen_center(&self) -> ScreenPoint {
        ScreenPoint::new(self.width / 2.0, self.height / 2.0)
    }

    fn project(&self, coord: &SkyCoord) -> ScreenPoint {
        let v = coord.unit_vector();
        // Unchecked projection: directions at or behind the tangent plane
        // are pushed to a large but finite screen position instead of
        // dividing by zero. Callers frustum-cull before drawing.
        let f = dot(v, self.forward).max(1e-9);
        let x = dot(v, self.east) / f;
        let y = dot(v, self.up) / f;
        ScreenPoint::new(
            self.width / 2.0 + self.focal * x,
            self.height / 2.0 - self.focal * y,
        )
    }

    fn unproject(&self, point: ScreenPoint) -> SkyCoord {
        let dx = (point.x - self.width / 2.0) / self.focal;
        let dy = (self.height / 2.0 - point.y) / self.focal;
        SkyCoord::from_vector([
            self.forward[0] + dx * self.east[0] + dy * self.up[0],
            self.forward[1] + dx * self.east[1] + dy * self.up[1],
            self.forward[2] + dx * self.east[2] + dy * self.up[2],
        ])
    }

    fn frustum(&self) -> &Frustum {
        &self.frustum
    }
}
