use opencv::{core::Mat, Result as CvResult};

use super::annotate::{annotate, Detection};
use super::blobs::BlobExtractor;
use super::morphology::MaskRefiner;
use super::motion::{to_grayscale, ForegroundSegmenter};
use crate::config::Config;

/// Per-stream detection chain: grayscale → background subtraction →
/// morphology → blob filter → centroid + overlay.
pub struct MotionDetector {
    segmenter: ForegroundSegmenter,
    refiner: MaskRefiner,
    extractor: BlobExtractor,
}

impl MotionDetector {
    pub fn new(config: &Config) -> CvResult<Self> {
        Ok(Self {
            segmenter: ForegroundSegmenter::new(&config.segmenter)?,
            refiner: MaskRefiner::new(config.refiner.kernel_size)?,
            extractor: BlobExtractor::new(&config.blobs),
        })
    }

    /// Detects moving blobs in the BGR `frame` and draws their overlays onto
    /// it.
    pub fn detect(&mut self, frame: &mut Mat) -> CvResult<Vec<Detection>> {
        let gray = to_grayscale(frame)?;
        let mask = self.segmenter.apply(&gray)?;
        let refined = self.refiner.refine(&mask)?;
        let blobs = self.extractor.extract(&refined)?;
        annotate(frame, &blobs)
    }

    pub fn is_warming_up(&self) -> bool {
        self.segmenter.is_warming_up()
    }
}
