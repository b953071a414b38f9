use std::cmp::Ordering;
use std::collections::VecDeque;

use opencv::core::Point;

use super::{Track, Tracker};
use crate::config::TrackerConfig;

/// Greedy nearest-neighbour association on centroid distance.
pub struct NearestNeighbourTracker {
    tracks: Vec<Track>,
    next_id: u64,
    distance_threshold: f64,
    max_frames_to_skip: u32,
    max_trace_length: usize,
    max_tracks: usize,
}

impl NearestNeighbourTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 0,
            distance_threshold: config.distance_threshold,
            max_frames_to_skip: config.max_frames_to_skip,
            max_trace_length: config.max_trace_length,
            max_tracks: config.max_tracks,
        }
    }

    fn spawn(&mut self, centroid: Point) {
        let mut trace = VecDeque::with_capacity(self.max_trace_length);
        trace.push_back(centroid);
        self.tracks.push(Track {
            id: self.next_id,
            trace,
            skipped_frames: 0,
        });
        tracing::trace!(id = self.next_id, x = centroid.x, y = centroid.y, "new track");
        self.next_id += 1;
    }
}

fn distance(a: Point, b: Point) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

impl Tracker for NearestNeighbourTracker {
    fn update(&mut self, centroids: &[Point]) -> &[Track] {
        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for (track_idx, track) in self.tracks.iter().enumerate() {
            let Some(last) = track.last_position() else {
                continue;
            };
            for (det_idx, &centroid) in centroids.iter().enumerate() {
                let d = distance(last, centroid);
                if d <= self.distance_threshold {
                    pairs.push((d, track_idx, det_idx));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; centroids.len()];
        for (_, track_idx, det_idx) in pairs {
            if track_matched[track_idx] || det_matched[det_idx] {
                continue;
            }
            track_matched[track_idx] = true;
            det_matched[det_idx] = true;

            let track = &mut self.tracks[track_idx];
            track.trace.push_back(centroids[det_idx]);
            while track.trace.len() > self.max_trace_length {
                track.trace.pop_front();
            }
            track.skipped_frames = 0;
        }

        for (track, matched) in self.tracks.iter_mut().zip(&track_matched) {
            if !matched {
                track.skipped_frames += 1;
            }
        }

        let max_skip = self.max_frames_to_skip;
        self.tracks.retain(|t| {
            let keep = t.skipped_frames <= max_skip;
            if !keep {
                tracing::trace!(id = t.id, "track dropped");
            }
            keep
        });

        for (det_idx, &centroid) in centroids.iter().enumerate() {
            if det_matched[det_idx] {
                continue;
            }
            if self.tracks.len() >= self.max_tracks {
                tracing::debug!(max = self.max_tracks, "track limit reached, ignoring detection");
                break;
            }
            self.spawn(centroid);
        }

        &self.tracks
    }

    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn total_tracks(&self) -> u64 {
        self.next_id
    }
}
