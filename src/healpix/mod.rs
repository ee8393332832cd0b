//! HEALPix nested-scheme pixelization of the sphere.
//!
//! Pure index math over the hierarchical equal-area quadrilateral grid the
//! survey tiles are addressed by: direction to pixel, pixel corner
//! directions, the four children one level down, and the eight-neighbour
//! relation the renderer's flood-fill walks. Everything here is stateless
//! and safe to call from any thread.
//!
//! A pixel is identified by a [`PixelId`] that is only unique within a
//! resolution level, so every operation takes the level (or its
//! `nside = 2^level`) alongside the id, mirroring how tiles are keyed.
//!
//! # Corner order
//!
//! [`corners`] returns the quad vertices in the fixed order N, W, S, E
//! (north vertex first, counterclockwise). The renderer's UV table and the
//! frustum test both rely on this winding.

use crate::astro::{normalize_ra, SkyCoord};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::fmt;

/// Ring offsets of the twelve base faces (latitude band per face).
const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
/// Longitude offsets of the twelve base faces, in units of π/4.
const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

/// Face transition table for neighbour lookups, indexed by crossing
/// direction (S, SE, E, SW, centre, NE, W, NW, N) and source face.
/// `-1` marks the three-face vertices where no diagonal neighbour exists.
const NB_FACEARRAY: [[i8; 12]; 9] = [
    [8, 9, 10, 11, -1, -1, -1, -1, 10, 11, 8, 9], // S
    [5, 6, 7, 4, 8, 9, 10, 11, 9, 10, 11, 8],     // SE
    [-1, -1, -1, -1, 5, 6, 7, 4, -1, -1, -1, -1], // E
    [4, 5, 6, 7, 11, 8, 9, 10, 11, 8, 9, 10],     // SW
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],       // centre
    [1, 2, 3, 0, 0, 1, 2, 3, 5, 6, 7, 4],         // NE
    [-1, -1, -1, -1, 7, 4, 5, 6, -1, -1, -1, -1], // W
    [3, 0, 1, 2, 3, 0, 1, 2, 4, 5, 6, 7],         // NW
    [2, 3, 0, 1, -1, -1, -1, -1, 0, 1, 2, 3],     // N
];

/// Coordinate transform applied when crossing into the neighbouring face,
/// indexed like [`NB_FACEARRAY`] rows and by face region (north cap,
/// equatorial, south cap). Bit 1 flips x, bit 2 flips y, bit 4 swaps axes.
const NB_SWAPARRAY: [[u8; 3]; 9] = [
    [0, 0, 3], // S
    [0, 0, 6], // SE
    [0, 0, 0], // E
    [0, 0, 5], // SW
    [0, 0, 0], // centre
    [5, 0, 0], // NE
    [0, 0, 0], // W
    [6, 0, 0], // NW
    [3, 0, 0], // N
];

/// Identifier of one cell of the grid at some resolution level.
///
/// Nested-scheme index: the two low bits select the quadrant within the
/// parent, so parent/child moves are bit shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PixelId(pub u64);

impl PixelId {
    /// The four children of this pixel at the next finer level.
    pub fn children(self) -> [PixelId; 4] {
        let base = self.0 << 2;
        [
            PixelId(base),
            PixelId(base + 1),
            PixelId(base + 2),
            PixelId(base + 3),
        ]
    }

    /// The containing pixel one level up.
    pub fn parent(self) -> PixelId {
        PixelId(self.0 >> 2)
    }

    /// Quadrant index (0–3) of this pixel within its parent.
    pub fn quadrant(self) -> u8 {
        (self.0 & 3) as u8
    }
}

impl fmt::Display for PixelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Grid resolution parameter at `level`: cells per face edge.
pub fn nside(level: u8) -> u64 {
    1u64 << level
}

/// Total number of pixels on the sphere at `level`.
pub fn npix(level: u8) -> u64 {
    12 * nside(level) * nside(level)
}

/// Maps a sky direction to the containing pixel at `level`.
///
/// Deterministic for any finite input; `level` must be at least 1.
pub fn pixel_at(level: u8, coord: SkyCoord) -> PixelId {
    debug_assert!(level >= 1, "pixelization level must be >= 1");

    let ns = nside(level) as i64;
    let z = coord.dec.sin();
    let za = z.abs();
    // Longitude in units of π/2, in [0, 4).
    let tt = normalize_ra(coord.ra) / FRAC_PI_2;

    let (face, ix, iy) = if za <= 2.0 / 3.0 {
        // Equatorial region: locate the ascending and descending edge
        // lines bracketing the point.
        let temp1 = ns as f64 * (0.5 + tt);
        let temp2 = ns as f64 * (z * 0.75);
        let jp = (temp1 - temp2) as i64;
        let jm = (temp1 + temp2) as i64;

        let ifp = jp >> level;
        let ifm = jm >> level;
        let face = if ifp == ifm {
            (ifp & 3) + 4
        } else if ifp < ifm {
            ifp & 3
        } else {
            (ifm & 3) + 8
        };

        let ix = jm & (ns - 1);
        let iy = ns - (jp & (ns - 1)) - 1;
        (face, ix, iy)
    } else {
        // Polar caps.
        let ntt = (tt as i64).min(3);
        let tp = tt - ntt as f64;
        let tmp = ns as f64 * (3.0 * (1.0 - za)).sqrt();

        let jp = ((tp * tmp) as i64).min(ns - 1);
        let jm = (((1.0 - tp) * tmp) as i64).min(ns - 1);

        if z >= 0.0 {
            (ntt, ns - jm - 1, ns - jp - 1)
        } else {
            (ntt + 8, jp, jm)
        }
    };

    fxy_to_pixel(level, face as u8, ix as u64, iy as u64)
}

/// Corner directions of a pixel's quadrilateral footprint, in the fixed
/// winding N, W, S, E.
pub fn corners(level: u8, pixel: PixelId) -> [SkyCoord; 4] {
    let ns = nside(level);
    let (face, x, y) = pixel_to_fxy(level, pixel);
    let corner = |dx: u64, dy: u64| {
        face_point_to_sky(
            face,
            (x + dx) as f64 / ns as f64,
            (y + dy) as f64 / ns as f64,
        )
    };
    [
        corner(1, 1), // N
        corner(0, 1), // W
        corner(0, 0), // S
        corner(1, 0), // E
    ]
}

/// Centre direction of a pixel.
pub fn center(level: u8, pixel: PixelId) -> SkyCoord {
    let ns = nside(level);
    let (face, x, y) = pixel_to_fxy(level, pixel);
    face_point_to_sky(
        face,
        (x as f64 + 0.5) / ns as f64,
        (y as f64 + 0.5) / ns as f64,
    )
}

/// The up-to-eight adjacent pixels, in the order SW, W, NW, N, NE, E, SE, S.
///
/// Even indices are the edge-sharing neighbours and always exist; the
/// diagonal entries are `None` at the pixelization's three-face vertices.
/// `nside` must match the pixel's level (`nside = 2^level`).
pub fn neighbours(nside: u64, pixel: PixelId) -> [Option<PixelId>; 8] {
    debug_assert!(nside.is_power_of_two());
    let level = nside.trailing_zeros() as u8;
    let (face, x, y) = pixel_to_fxy(level, pixel);
    let (x, y, ns) = (x as i64, y as i64, nside as i64);

    const XOFFSET: [i64; 8] = [-1, -1, 0, 1, 1, 1, 0, -1];
    const YOFFSET: [i64; 8] = [0, 1, 1, 1, 0, -1, -1, -1];

    let mut result = [None; 8];
    for (i, slot) in result.iter_mut().enumerate() {
        let mut x2 = x + XOFFSET[i];
        let mut y2 = y + YOFFSET[i];
        let mut nbnum = 4i64;
        if x2 < 0 {
            x2 += ns;
            nbnum -= 1;
        } else if x2 >= ns {
            x2 -= ns;
            nbnum += 1;
        }
        if y2 < 0 {
            y2 += ns;
            nbnum -= 3;
        } else if y2 >= ns {
            y2 -= ns;
            nbnum += 3;
        }

        let face2 = NB_FACEARRAY[nbnum as usize][face as usize];
        if face2 < 0 {
            continue;
        }
        let bits = NB_SWAPARRAY[nbnum as usize][(face >> 2) as usize];
        if bits & 1 != 0 {
            x2 = ns - x2 - 1;
        }
        if bits & 2 != 0 {
            y2 = ns - y2 - 1;
        }
        if bits & 4 != 0 {
            std::mem::swap(&mut x2, &mut y2);
        }
        *slot = Some(fxy_to_pixel(level, face2 as u8, x2 as u64, y2 as u64));
    }
    result
}

/// Interleaves the low 32 bits of `v` into the even bit positions.
fn spread_bits(v: u64) -> u64 {
    let mut x = v & 0x0000_0000_ffff_ffff;
    x = (x | (x << 16)) & 0x0000_ffff_0000_ffff;
    x = (x | (x << 8)) & 0x00ff_00ff_00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f_0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

/// Inverse of [`spread_bits`]: collects the even bit positions.
fn compress_bits(v: u64) -> u64 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0f0f_0f0f_0f0f_0f0f;
    x = (x | (x >> 4)) & 0x00ff_00ff_00ff_00ff;
    x = (x | (x >> 8)) & 0x0000_ffff_0000_ffff;
    x = (x | (x >> 16)) & 0x0000_0000_ffff_ffff;
    x
}

/// Nested pixel id from face number and in-face coordinates at `level`.
fn fxy_to_pixel(level: u8, face: u8, x: u64, y: u64) -> PixelId {
    let per_face = nside(level) * nside(level);
    PixelId(face as u64 * per_face + (spread_bits(x) | (spread_bits(y) << 1)))
}

/// Face number and in-face coordinates of a nested pixel id.
fn pixel_to_fxy(level: u8, pixel: PixelId) -> (u8, u64, u64) {
    let per_face = nside(level) * nside(level);
    let face = (pixel.0 / per_face) as u8;
    let within = pixel.0 % per_face;
    (face, compress_bits(within), compress_bits(within >> 1))
}

/// Maps a continuous in-face position (`u`, `v` in `[0, 1]`, axes toward
/// NE and NW) to a sky direction via the HEALPix plane projection.
fn face_point_to_sky(face: u8, u: f64, v: f64) -> SkyCoord {
    let xf = JPLL[face as usize] as f64 * FRAC_PI_4;
    let yf = (3 - JRLL[face as usize]) as f64 * FRAC_PI_4;
    let xp = xf + FRAC_PI_4 * (u - v);
    let yp = yf + FRAC_PI_4 * (u + v - 1.0);

    if yp.abs() <= FRAC_PI_4 {
        // Equatorial belt: z is linear in the plane ordinate.
        let z = yp * 8.0 / (3.0 * PI);
        SkyCoord::new(xp, z.asin())
    } else {
        // Polar caps: meridians converge toward the face centre.
        let sigma = 2.0 - yp.abs() * 4.0 / PI;
        let z = yp.signum() * (1.0 - sigma * sigma / 3.0);
        let ra = if sigma == 0.0 {
            xf
        } else {
            xf + (xp - xf) / sigma
        };
        SkyCoord::new(ra, z.clamp(-1.0, 1.0).asin())
    }
}
