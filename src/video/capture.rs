use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::{self, VideoCapture},
};

use super::{FrameSource, VideoError};

pub struct VideoFileSource {
    capture: Option<VideoCapture>,
    path: String,
    frame_size: Size,
}

impl VideoFileSource {
    pub fn open(path: &str) -> Result<Self, VideoError> {
        let capture = VideoCapture::from_file(path, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(VideoError::OpenFailed(path.to_string()));
        }

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        tracing::info!(path = %path, width, height, "opened video");

        Ok(Self {
            capture: Some(capture),
            path: path.to_string(),
            frame_size: Size::new(width, height),
        })
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Mat>, VideoError> {
        let Some(capture) = self.capture.as_mut() else {
            return Ok(None);
        };

        let mut frame = Mat::default();
        if !capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }

    fn frame_size(&self) -> Size {
        self.frame_size
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                tracing::warn!(path = %self.path, error = %e, "failed to release video reader");
            }
            tracing::debug!(path = %self.path, "video reader released");
        }
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        self.release();
    }
}
