//! Sky coordinate primitives.
//!
//! Provides the equatorial coordinate type shared by the pixelization,
//! projection, and renderer modules, plus epoch precession so viewport
//! coordinates (current epoch) can be mapped into the J2000 frame the
//! survey tiles are stored in.

use std::f64::consts::PI;

/// Julian date of the J2000.0 epoch.
pub const JD2000: f64 = 2_451_545.0;

const ARCSEC_TO_RAD: f64 = PI / (180.0 * 3600.0);

/// Equatorial sky direction in radians.
///
/// `ra` is right ascension in `[0, 2π)`, `dec` is declination in
/// `[-π/2, π/2]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyCoord {
    /// Right ascension in radians.
    pub ra: f64,
    /// Declination in radians.
    pub dec: f64,
}

impl SkyCoord {
    /// Creates a coordinate, normalizing right ascension into `[0, 2π)`.
    pub fn new(ra: f64, dec: f64) -> Self {
        Self {
            ra: normalize_ra(ra),
            dec,
        }
    }

    /// Unit vector in the equatorial frame (x toward RA 0, z toward the
    /// north celestial pole).
    pub fn unit_vector(&self) -> [f64; 3] {
        let cd = self.dec.cos();
        [cd * self.ra.cos(), cd * self.ra.sin(), self.dec.sin()]
    }

    /// Builds a coordinate from a direction vector (need not be unit length).
    pub fn from_vector(v: [f64; 3]) -> Self {
        let r = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        if r == 0.0 {
            return Self { ra: 0.0, dec: 0.0 };
        }
        Self::new(v[1].atan2(v[0]), (v[2] / r).asin())
    }

    /// Angular separation to another coordinate, in radians.
    pub fn separation(&self, other: &SkyCoord) -> f64 {
        let a = self.unit_vector();
        let b = other.unit_vector();
        let dot = (a[0] * b[0] + a[1] * b[1] + a[2] * b[2]).clamp(-1.0, 1.0);
        dot.acos()
    }
}

/// Wraps a right ascension into `[0, 2π)`.
pub fn normalize_ra(ra: f64) -> f64 {
    let two_pi = 2.0 * PI;
    let r = ra % two_pi;
    if r < 0.0 {
        r + two_pi
    } else {
        r
    }
}

/// Precesses an equatorial coordinate between two epochs.
///
/// Uses the IAU 1976 three-angle model (ζ, z, θ). Accuracy is well below
/// one tile footprint for any realistic rendering epoch, which is all the
/// renderer needs: the result only selects which HEALPix cell the viewport
/// centre falls in.
pub fn precess(coord: SkyCoord, jd_from: f64, jd_to: f64) -> SkyCoord {
    if jd_from == jd_to {
        return coord;
    }

    let t_big = (jd_from - JD2000) / 36_525.0;
    let t = (jd_to - jd_from) / 36_525.0;

    let zeta = ((2306.2181 + 1.39656 * t_big - 0.000139 * t_big * t_big) * t
        + (0.30188 - 0.000344 * t_big) * t * t
        + 0.017998 * t * t * t)
        * ARCSEC_TO_RAD;
    let z = ((2306.2181 + 1.39656 * t_big - 0.000139 * t_big * t_big) * t
        + (1.09468 + 0.000066 * t_big) * t * t
        + 0.018203 * t * t * t)
        * ARCSEC_TO_RAD;
    let theta = ((2004.3109 - 0.85330 * t_big - 0.000217 * t_big * t_big) * t
        - (0.42665 + 0.000217 * t_big) * t * t
        - 0.041833 * t * t * t)
        * ARCSEC_TO_RAD;

    let (sd, cd) = coord.dec.sin_cos();
    let (sa, ca) = (coord.ra + zeta).sin_cos();
    let (st, ct) = theta.sin_cos();

    let a = cd * sa;
    let b = ct * cd * ca - st * sd;
    let c = st * cd * ca + ct * sd;

    SkyCoord::new(a.atan2(b) + z, c.clamp(-1.0, 1.0).asin())
}
