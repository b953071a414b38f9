mod nearest;

pub use nearest::NearestNeighbourTracker;

use std::collections::VecDeque;

use opencv::core::Point;

/// A persistent object identity and its most recent positions, oldest first.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u64,
    pub trace: VecDeque<Point>,
    pub skipped_frames: u32,
}

impl Track {
    pub fn last_position(&self) -> Option<Point> {
        self.trace.back().copied()
    }
}

/// Data-association strategy fed with one frame's centroids at a time.
///
/// The pipeline only reads `id` and `trace` from the returned tracks.
pub trait Tracker {
    fn update(&mut self, centroids: &[Point]) -> &[Track];

    fn tracks(&self) -> &[Track];

    /// Number of distinct identities handed out so far.
    fn total_tracks(&self) -> u64;
}
