//! Per-frame render accounting.

/// Counters for one completed frame.
///
/// `pixels_tested` counts every sky pixel the flood fill examined,
/// including culled ones; `tiles_rendered` only those a tile was actually
/// drawn for; `bytes_drawn` sums the decoded sizes of the drawn tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Hierarchy level the frame was rendered at.
    pub level: u8,
    /// Whether the frame used the all-sky path.
    pub allsky: bool,
    pub pixels_tested: u64,
    pub tiles_rendered: u64,
    pub bytes_drawn: u64,
}
