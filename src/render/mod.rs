//! Progressive sky-survey renderer.
//!
//! Each frame picks the hierarchy level matching the field of view, then
//! flood-fills outward from the pixel under the view centre: visible
//! pixels are drawn and their edge neighbours enqueued, culled pixels are
//! marked visited but not expanded. The fill therefore touches the
//! visible region plus a one-pixel rim and terminates on its own even on
//! whole-sky views, where every pixel is visited exactly once.
//!
//! Tiles come from a [`TileSource`] that never blocks; missing imagery
//! simply leaves gaps this frame and fills in on a later one as fetches
//! complete.

mod painter;
mod stats;

pub use painter::{Color, TexCoord, TilePainter};
pub use stats::FrameStats;

use crate::astro::{precess, SkyCoord, JD2000};
use crate::cache::{SurveyParams, TileSource, ALLSKY_LEVEL};
use crate::healpix::{self, PixelId};
use crate::projection::{ScreenPoint, SkyProjector};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Field of view (degrees) above which level 1 suffices; each deeper
/// level halves it.
const LEVEL_1_FOV_DEG: f64 = 58.5;

/// View parameters for one frame.
#[derive(Debug, Clone, Copy)]
pub struct ViewState {
    /// Horizontal field of view, radians.
    pub fov: f64,
    /// Julian date of the view's coordinate frame. Survey tiles are
    /// published for J2000; the renderer precesses between the two.
    pub jd: f64,
}

impl ViewState {
    pub fn new(fov: f64, jd: f64) -> Self {
        Self { fov, jd }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            fov: 60f64.to_radians(),
            jd: JD2000,
        }
    }
}

/// Cosmetic knobs that are not part of the survey configuration.
#[derive(Debug, Clone, Copy)]
pub struct RenderStyle {
    /// Pen colour for the pixel-boundary grid and its labels.
    pub grid_color: Color,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            grid_color: [0, 200, 0, 255],
        }
    }
}

/// Texture windows for the 4x4 grandchild grid of one tile, indexed by
/// `child * 4 + grandchild` in nested order. Corner order matches the
/// sky-corner order of `healpix::corners`.
const UV_GRID: [[TexCoord; 4]; 16] = [
    [
        TexCoord::new(0.25, 0.25),
        TexCoord::new(0.25, 0.0),
        TexCoord::new(0.0, 0.0),
        TexCoord::new(0.0, 0.25),
    ],
    [
        TexCoord::new(0.25, 0.5),
        TexCoord::new(0.25, 0.25),
        TexCoord::new(0.0, 0.25),
        TexCoord::new(0.0, 0.5),
    ],
    [
        TexCoord::new(0.5, 0.25),
        TexCoord::new(0.5, 0.0),
        TexCoord::new(0.25, 0.0),
        TexCoord::new(0.25, 0.25),
    ],
    [
        TexCoord::new(0.5, 0.5),
        TexCoord::new(0.5, 0.25),
        TexCoord::new(0.25, 0.25),
        TexCoord::new(0.25, 0.5),
    ],
    [
        TexCoord::new(0.25, 0.75),
        TexCoord::new(0.25, 0.5),
        TexCoord::new(0.0, 0.5),
        TexCoord::new(0.0, 0.75),
    ],
    [
        TexCoord::new(0.25, 1.0),
        TexCoord::new(0.25, 0.75),
        TexCoord::new(0.0, 0.75),
        TexCoord::new(0.0, 1.0),
    ],
    [
        TexCoord::new(0.5, 0.75),
        TexCoord::new(0.5, 0.5),
        TexCoord::new(0.25, 0.5),
        TexCoord::new(0.25, 0.75),
    ],
    [
        TexCoord::new(0.5, 1.0),
        TexCoord::new(0.5, 0.75),
        TexCoord::new(0.25, 0.75),
        TexCoord::new(0.25, 1.0),
    ],
    [
        TexCoord::new(0.75, 0.25),
        TexCoord::new(0.75, 0.0),
        TexCoord::new(0.5, 0.0),
        TexCoord::new(0.5, 0.25),
    ],
    [
        TexCoord::new(0.75, 0.5),
        TexCoord::new(0.75, 0.25),
        TexCoord::new(0.5, 0.25),
        TexCoord::new(0.5, 0.5),
    ],
    [
        TexCoord::new(1.0, 0.25),
        TexCoord::new(1.0, 0.0),
        TexCoord::new(0.75, 0.0),
        TexCoord::new(0.75, 0.25),
    ],
    [
        TexCoord::new(1.0, 0.5),
        TexCoord::new(1.0, 0.25),
        TexCoord::new(0.75, 0.25),
        TexCoord::new(0.75, 0.5),
    ],
    [
        TexCoord::new(0.75, 0.75),
        TexCoord::new(0.75, 0.5),
        TexCoord::new(0.5, 0.5),
        TexCoord::new(0.5, 0.75),
    ],
    [
        TexCoord::new(0.75, 1.0),
        TexCoord::new(0.75, 0.75),
        TexCoord::new(0.5, 0.75),
        TexCoord::new(0.5, 1.0),
    ],
    [
        TexCoord::new(1.0, 0.75),
        TexCoord::new(1.0, 0.5),
        TexCoord::new(0.75, 0.5),
        TexCoord::new(0.75, 0.75),
    ],
    [
        TexCoord::new(1.0, 1.0),
        TexCoord::new(1.0, 0.75),
        TexCoord::new(0.75, 0.75),
        TexCoord::new(0.75, 1.0),
    ],
];

/// Picks the hierarchy level for a field of view: level 1 covers wide
/// fields, one level deeper for every halving below [`LEVEL_1_FOV_DEG`],
/// clamped to the survey's deepest level.
pub fn level_for_fov(fov: f64, max_level: u8) -> u8 {
    let mut level = 1u8;
    let mut min_fov = LEVEL_1_FOV_DEG.to_radians();
    while level < max_level && fov < min_fov {
        min_fov /= 2.0;
        level += 1;
    }
    level
}

/// The renderer. Holds reusable flood-fill scratch between frames.
pub struct HipsRenderer {
    style: RenderStyle,
    visited: HashSet<PixelId>,
    queue: VecDeque<PixelId>,
}

impl Default for HipsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HipsRenderer {
    pub fn new() -> Self {
        Self::with_style(RenderStyle::default())
    }

    pub fn with_style(style: RenderStyle) -> Self {
        Self {
            style,
            visited: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn set_style(&mut self, style: RenderStyle) {
        self.style = style;
    }

    /// Renders one frame.
    ///
    /// Returns without drawing when the survey layer is disabled or no
    /// survey is configured.
    pub fn render(
        &mut self,
        source: &dyn TileSource,
        projector: &dyn SkyProjector,
        view: &ViewState,
        painter: &mut dyn TilePainter,
    ) -> FrameStats {
        let params = source.params();
        let mut stats = FrameStats::default();
        if !params.render || !params.is_configured() {
            return stats;
        }

        let mut level = level_for_fov(view.fov, params.max_level);
        let allsky = level < ALLSKY_LEVEL;
        if allsky {
            level = ALLSKY_LEVEL;
        }
        stats.level = level;
        stats.allsky = allsky;

        let view_center = projector.unproject(projector.screen_center());
        let seed = healpix::pixel_at(level, precess(view_center, view.jd, JD2000));

        self.visited.clear();
        self.queue.clear();
        self.visited.insert(seed);
        self.queue.push_back(seed);

        // One filter decision per pass, from the centre pixel's on-screen
        // size: bilinear filtering only pays off once a tile spans at
        // least its own texel resolution (always true on the coarse
        // all-sky path).
        let seed_screen = view_corners(level, seed, view.jd).map(|c| projector.project(&c));
        let mut edge = seed_screen[0].distance(&seed_screen[1]);
        if edge <= 0.0 {
            edge = params.tile_width as f64;
        }
        let filter = params.bilinear && (edge >= params.tile_width as f64 || allsky);
        let previous_filter = painter.set_bilinear(filter);

        let nside = healpix::nside(level);
        let frustum = projector.frustum();

        while let Some(pixel) = self.queue.pop_front() {
            stats.pixels_tested += 1;

            let corners = view_corners(level, pixel, view.jd);
            if !frustum.intersects_quad(&corners) {
                // Culled pixels stay visited so the fill cannot leak back
                // in, but they contribute no neighbours.
                continue;
            }

            self.draw_tile(
                source, projector, painter, &params, allsky, level, pixel, &corners, view.jd,
                &mut stats,
            );

            // Expand across the four shared edges; corner-touching
            // neighbours are reached through them.
            let neighbours = healpix::neighbours(nside, pixel);
            for dir in [0usize, 2, 4, 6] {
                if let Some(next) = neighbours[dir] {
                    if self.visited.insert(next) {
                        self.queue.push_back(next);
                    }
                }
            }
        }

        painter.set_bilinear(previous_filter);

        debug!(
            level = stats.level,
            allsky = stats.allsky,
            pixels_tested = stats.pixels_tested,
            tiles_rendered = stats.tiles_rendered,
            bytes_drawn = stats.bytes_drawn,
            "frame complete"
        );
        stats
    }

    /// Draws one visible pixel: 16 textured quads over its grandchildren
    /// when imagery is available, plus the optional grid overlay.
    #[allow(clippy::too_many_arguments)]
    fn draw_tile(
        &self,
        source: &dyn TileSource,
        projector: &dyn SkyProjector,
        painter: &mut dyn TilePainter,
        params: &SurveyParams,
        allsky: bool,
        level: u8,
        pixel: PixelId,
        corners: &[SkyCoord; 4],
        jd: f64,
        stats: &mut FrameStats,
    ) {
        let outer = corners.map(|c| projector.project(&c));

        if let Some(handle) = source.tile(allsky, level, pixel) {
            let tile = handle.tile();
            for (ci, child) in pixel.children().iter().enumerate() {
                for (gi, grandchild) in child.children().iter().enumerate() {
                    let quad = view_corners(level + 2, *grandchild, jd);
                    let screen = quad.map(|c| projector.project(&c));
                    painter.draw_textured_quad(&screen, tile, &UV_GRID[ci * 4 + gi]);
                }
            }
            stats.tiles_rendered += 1;
            stats.bytes_drawn += tile.byte_size();
        }

        // The grid marks the pixel whether or not its imagery has arrived
        // yet, so a fresh survey shows its structure immediately.
        if params.show_grid {
            painter.set_pen(self.style.grid_color);
            for i in 0..4 {
                painter.draw_line(outer[i], outer[(i + 1) % 4]);
            }
            let label_at = ScreenPoint::new(
                outer.iter().map(|p| p.x).sum::<f64>() / 4.0,
                outer.iter().map(|p| p.y).sum::<f64>() / 4.0,
            );
            painter.draw_label(label_at, &format!("{pixel} / {level}"));
        }
    }
}

/// Sky corners of a pixel, precessed from the survey's J2000 frame into
/// the view frame.
fn view_corners(level: u8, pixel: PixelId, jd: f64) -> [SkyCoord; 4] {
    healpix::corners(level, pixel).map(|c| to_view_frame(c, jd))
}

fn to_view_frame(coord: SkyCoord, jd: f64) -> SkyCoord {
    if jd == JD2000 {
        coord
    } else {
        precess(coord, JD2000, jd)
    }
}

#[cfg(test)]
mod tests {
    use super::painter::tests::RecordingPainter;
    use super::*;
    use crate::cache::{Tile, TileHandle};
    use crate::projection::Frustum;
    use image::RgbaImage;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Source scripted per test: an optional tile served for every lookup
    /// plus per-pixel overrides, with request accounting.
    struct ScriptedSource {
        params: SurveyParams,
        default_tile: Option<Arc<Tile>>,
        overrides: Mutex<std::collections::HashMap<(bool, u8, PixelId), Arc<Tile>>>,
        requests: Mutex<Vec<(bool, u8, PixelId)>>,
    }

    impl ScriptedSource {
        fn new(params: SurveyParams) -> Self {
            Self {
                params,
                default_tile: None,
                overrides: Mutex::new(std::collections::HashMap::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn with_default_tile(mut self, tile: Arc<Tile>) -> Self {
            self.default_tile = Some(tile);
            self
        }

        fn serve(&self, allsky: bool, level: u8, pixel: PixelId, tile: Arc<Tile>) {
            self.overrides.lock().insert((allsky, level, pixel), tile);
        }

        fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl TileSource for ScriptedSource {
        fn params(&self) -> SurveyParams {
            self.params.clone()
        }

        fn tile(&self, allsky: bool, level: u8, pixel: PixelId) -> Option<TileHandle> {
            self.requests.lock().push((allsky, level, pixel));
            if let Some(t) = self.overrides.lock().get(&(allsky, level, pixel)) {
                return Some(TileHandle::Cached(Arc::clone(t)));
            }
            self.default_tile
                .as_ref()
                .map(|t| TileHandle::Cached(Arc::clone(t)))
        }
    }

    /// Projector with a scriptable frustum and a trivial linear mapping,
    /// good enough for draw-call accounting.
    struct TestProjector {
        center: SkyCoord,
        frustum: Frustum,
    }

    impl TestProjector {
        fn whole_sky(center: SkyCoord) -> Self {
            Self {
                center,
                frustum: Frustum::unbounded(),
            }
        }

        fn half_sky(center: SkyCoord) -> Self {
            Self {
                center,
                frustum: Frustum::from_planes(vec![center.unit_vector()]),
            }
        }
    }

    impl SkyProjector for TestProjector {
        fn screen_center(&self) -> ScreenPoint {
            ScreenPoint::new(400.0, 300.0)
        }

        fn project(&self, coord: &SkyCoord) -> ScreenPoint {
            ScreenPoint::new(coord.ra * 100.0, coord.dec * 100.0)
        }

        fn unproject(&self, _point: ScreenPoint) -> SkyCoord {
            self.center
        }

        fn frustum(&self) -> &Frustum {
            &self.frustum
        }
    }

    fn enabled_params() -> SurveyParams {
        SurveyParams {
            url: "http://survey.example/dss".to_string(),
            render: true,
            max_level: 9,
            tile_width: 512,
            ..SurveyParams::default()
        }
    }

    fn tiny_tile() -> Arc<Tile> {
        Arc::new(Tile::new(RgbaImage::new(4, 4)))
    }

    #[test]
    fn test_level_for_wide_field() {
        assert_eq!(level_for_fov(60f64.to_radians(), 5), 1);
    }

    #[test]
    fn test_level_for_narrow_field() {
        assert_eq!(level_for_fov(1f64.to_radians(), 10), 7);
    }

    #[test]
    fn test_level_clamped_to_survey_depth() {
        assert_eq!(level_for_fov(1f64.to_radians(), 4), 4);
    }

    #[test]
    fn test_level_monotonic_in_fov() {
        let mut last = 0;
        for tenth_deg in (1..=700).rev() {
            let fov = (tenth_deg as f64 / 10.0).to_radians();
            let level = level_for_fov(fov, 12);
            assert!(level >= last, "level dropped as fov narrowed");
            last = level;
        }
    }

    #[test]
    fn test_disabled_survey_is_a_noop() {
        let mut params = enabled_params();
        params.render = false;
        let source = ScriptedSource::new(params).with_default_tile(tiny_tile());
        let projector = TestProjector::whole_sky(SkyCoord::new(1.0, 0.2));
        let mut painter = RecordingPainter::default();

        let stats = HipsRenderer::new().render(
            &source,
            &projector,
            &ViewState::default(),
            &mut painter,
        );

        assert_eq!(stats, FrameStats::default());
        assert!(painter.quads.is_empty());
        assert_eq!(source.request_count(), 0);
    }

    #[test]
    fn test_unconfigured_survey_is_a_noop() {
        let mut params = SurveyParams::default();
        params.render = true;
        let source = ScriptedSource::new(params);
        let projector = TestProjector::whole_sky(SkyCoord::new(1.0, 0.2));
        let mut painter = RecordingPainter::default();

        let stats = HipsRenderer::new().render(
            &source,
            &projector,
            &ViewState::default(),
            &mut painter,
        );
        assert_eq!(stats.pixels_tested, 0);
    }

    #[test]
    fn test_wide_field_uses_allsky_level_3() {
        let source = ScriptedSource::new(enabled_params());
        let projector = TestProjector::whole_sky(SkyCoord::new(0.7, -0.4));
        let mut painter = RecordingPainter::default();

        // 60 degrees selects level 1, which is below the all-sky cutoff.
        let view = ViewState::new(60f64.to_radians(), JD2000);
        let stats = HipsRenderer::new().render(&source, &projector, &view, &mut painter);

        assert_eq!(stats.level, 3);
        assert!(stats.allsky);
        assert!(source
            .requests
            .lock()
            .iter()
            .all(|&(allsky, level, _)| allsky && level == 3));
    }

    #[test]
    fn test_whole_sky_fill_visits_every_pixel_once() {
        let source = ScriptedSource::new(enabled_params());
        let projector = TestProjector::whole_sky(SkyCoord::new(0.7, -0.4));
        let mut painter = RecordingPainter::default();

        let view = ViewState::new(60f64.to_radians(), JD2000);
        let stats = HipsRenderer::new().render(&source, &projector, &view, &mut painter);

        // All 12 * 64 level-3 pixels, each tested exactly once.
        assert_eq!(stats.pixels_tested, 768);
        assert_eq!(stats.tiles_rendered, 0, "no imagery was available");
    }

    #[test]
    fn test_culling_prunes_the_fill() {
        let center = SkyCoord::new(0.7, -0.4);
        let source = ScriptedSource::new(enabled_params());
        let projector = TestProjector::half_sky(center);
        let mut painter = RecordingPainter::default();

        let view = ViewState::new(60f64.to_radians(), JD2000);
        let stats = HipsRenderer::new().render(&source, &projector, &view, &mut painter);

        // Visible hemisphere plus the culled rim; far less than the whole
        // sphere, far more than nothing.
        assert!(stats.pixels_tested > 300, "tested {}", stats.pixels_tested);
        assert!(stats.pixels_tested < 700, "tested {}", stats.pixels_tested);
    }

    #[test]
    fn test_each_tile_draws_sixteen_quads() {
        let source = ScriptedSource::new(enabled_params());
        source.serve(true, 3, PixelId(5), tiny_tile());
        let projector = TestProjector::whole_sky(SkyCoord::new(0.7, -0.4));
        let mut painter = RecordingPainter::default();

        let view = ViewState::new(60f64.to_radians(), JD2000);
        let stats = HipsRenderer::new().render(&source, &projector, &view, &mut painter);

        assert_eq!(stats.tiles_rendered, 1);
        assert_eq!(painter.quads.len(), 16);
        assert_eq!(stats.bytes_drawn, 4 * 4 * 4);

        // The sixteen texture windows tile the unit square corner to
        // corner.
        let mut mins = (f32::MAX, f32::MAX);
        let mut maxs = (f32::MIN, f32::MIN);
        for quad in &painter.quads {
            for t in &quad.tex {
                mins = (mins.0.min(t.u), mins.1.min(t.v));
                maxs = (maxs.0.max(t.u), maxs.1.max(t.v));
            }
        }
        assert_eq!((mins, maxs), ((0.0, 0.0), (1.0, 1.0)));
    }

    #[test]
    fn test_grid_overlay_covers_every_visible_pixel() {
        // The grid does not depend on imagery: with nothing fetched yet,
        // every visible pixel still gets its boundary and label.
        let mut params = enabled_params();
        params.show_grid = true;
        let source = ScriptedSource::new(params);
        let projector = TestProjector::whole_sky(SkyCoord::new(0.7, -0.4));
        let mut painter = RecordingPainter::default();

        let view = ViewState::new(60f64.to_radians(), JD2000);
        let stats = HipsRenderer::new().render(&source, &projector, &view, &mut painter);

        assert_eq!(stats.tiles_rendered, 0);
        assert_eq!(painter.lines.len(), 768 * 4);
        assert_eq!(painter.labels.len(), 768);
        assert!(painter.labels.iter().any(|(_, text)| text == "5 / 3"));
        assert_eq!(painter.pen, RenderStyle::default().grid_color);
    }

    #[test]
    fn test_grid_label_sits_at_quad_centroid() {
        let mut params = enabled_params();
        params.show_grid = true;
        let source = ScriptedSource::new(params);
        let projector = TestProjector::whole_sky(SkyCoord::new(0.7, -0.4));
        let mut painter = RecordingPainter::default();

        let view = ViewState::new(60f64.to_radians(), JD2000);
        HipsRenderer::new().render(&source, &projector, &view, &mut painter);

        let (at, _) = painter
            .labels
            .iter()
            .find(|(_, text)| text == "5 / 3")
            .expect("label for pixel 5");
        let screen = healpix::corners(3, PixelId(5)).map(|c| projector.project(&c));
        let cx = screen.iter().map(|p| p.x).sum::<f64>() / 4.0;
        let cy = screen.iter().map(|p| p.y).sum::<f64>() / 4.0;
        assert!((at.x - cx).abs() < 1e-9);
        assert!((at.y - cy).abs() < 1e-9);
    }

    #[test]
    fn test_bilinear_enabled_for_allsky_and_restored() {
        let source = ScriptedSource::new(enabled_params());
        source.serve(true, 3, PixelId(5), tiny_tile());
        let projector = TestProjector::whole_sky(SkyCoord::new(0.7, -0.4));
        let mut painter = RecordingPainter::default();

        let view = ViewState::new(60f64.to_radians(), JD2000);
        HipsRenderer::new().render(&source, &projector, &view, &mut painter);

        assert!(painter.bilinear_history.contains(&true));
        assert!(!painter.bilinear, "filter state must be restored");
    }

    #[test]
    fn test_bilinear_skipped_for_downscaled_tiles() {
        let mut params = enabled_params();
        params.tile_width = 1_000_000; // screen edge can never reach this
        let source = ScriptedSource::new(params).with_default_tile(tiny_tile());
        let projector = TestProjector::whole_sky(SkyCoord::new(0.7, -0.4));
        let mut painter = RecordingPainter::default();

        // Narrow enough to stay off the all-sky path.
        let view = ViewState::new(5f64.to_radians(), JD2000);
        let stats = HipsRenderer::new().render(&source, &projector, &view, &mut painter);
        assert!(!stats.allsky);
        assert!(stats.tiles_rendered > 0);
        assert!(!painter.bilinear_history.contains(&true));
    }

    #[test]
    fn test_filter_decided_once_per_frame() {
        // The filter is chosen from the centre pixel before traversal and
        // held for the whole pass: many tiles, exactly one set + restore,
        // so a frame can never mix filtered and unfiltered tiles.
        let source = ScriptedSource::new(enabled_params()).with_default_tile(tiny_tile());
        let projector = TestProjector::whole_sky(SkyCoord::new(0.7, -0.4));
        let mut painter = RecordingPainter::default();

        let view = ViewState::new(60f64.to_radians(), JD2000);
        let stats = HipsRenderer::new().render(&source, &projector, &view, &mut painter);

        assert_eq!(stats.tiles_rendered, 768);
        assert_eq!(painter.bilinear_history.len(), 2);
        assert!(painter.bilinear_history[0]);
        assert!(!painter.bilinear, "filter state must be restored");
    }

    #[test]
    fn test_cached_handles_are_returned_after_the_frame() {
        let tile = tiny_tile();
        let source =
            ScriptedSource::new(enabled_params()).with_default_tile(Arc::clone(&tile));
        let projector = TestProjector::whole_sky(SkyCoord::new(0.7, -0.4));
        let mut painter = RecordingPainter::default();

        let view = ViewState::new(60f64.to_radians(), JD2000);
        HipsRenderer::new().render(&source, &projector, &view, &mut painter);

        // One reference here, one inside the source; every handle the
        // frame took out has been dropped.
        assert_eq!(Arc::strong_count(&tile), 2);
    }

    #[test]
    fn test_scratch_is_reset_between_frames() {
        let source = ScriptedSource::new(enabled_params());
        let projector = TestProjector::whole_sky(SkyCoord::new(0.7, -0.4));
        let mut painter = RecordingPainter::default();
        let mut renderer = HipsRenderer::new();

        let view = ViewState::new(60f64.to_radians(), JD2000);
        let first = renderer.render(&source, &projector, &view, &mut painter);
        let second = renderer.render(&source, &projector, &view, &mut painter);
        assert_eq!(first.pixels_tested, second.pixels_tested);
    }
}
