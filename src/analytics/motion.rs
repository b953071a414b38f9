use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    video::{self, BackgroundSubtractorTrait},
    Result as CvResult,
};

use crate::config::SegmenterConfig;

/// Owns the per-stream background model.
///
/// Every call to [`ForegroundSegmenter::apply`] updates the model, so one
/// instance belongs to exactly one input stream and must not be shared across
/// threads. The first few dozen frames produce unreliable masks while the
/// model learns the scene (the very first frame is entirely foreground).
pub struct ForegroundSegmenter {
    mog2: opencv::core::Ptr<video::BackgroundSubtractorMOG2>,
    learning_rate: f64,
    warmup_frames: u64,
    frames_seen: u64,
}

impl ForegroundSegmenter {
    pub fn new(config: &SegmenterConfig) -> CvResult<Self> {
        let mog2 = video::create_background_subtractor_mog2(
            config.history,
            config.var_threshold,
            config.detect_shadows,
        )?;

        Ok(Self {
            mog2,
            learning_rate: -1.0,
            warmup_frames: config.warmup_frames,
            frames_seen: 0,
        })
    }

    /// Classifies `gray` against the background model and folds it into the
    /// model. The returned mask has the frame's dimensions with values 0
    /// (background), 127 (shadow) or 255 (foreground).
    pub fn apply(&mut self, gray: &Mat) -> CvResult<Mat> {
        let mut fg_mask = Mat::default();
        BackgroundSubtractorTrait::apply(&mut self.mog2, gray, &mut fg_mask, self.learning_rate)?;

        self.frames_seen += 1;
        if self.frames_seen == self.warmup_frames {
            tracing::debug!(frames = self.frames_seen, "background model warm-up complete");
        }

        Ok(fg_mask)
    }

    pub fn is_warming_up(&self) -> bool {
        self.frames_seen < self.warmup_frames
    }

}

pub fn to_grayscale(frame: &Mat) -> CvResult<Mat> {
    let mut gray = Mat::default();
    imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}
