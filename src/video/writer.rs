use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::VideoWriter,
};

use super::{FrameSink, VideoError};
use crate::config::OutputConfig;

pub struct VideoFileSink {
    writer: Option<VideoWriter>,
    path: String,
    frames_written: u64,
}

impl VideoFileSink {
    pub fn create(path: &str, frame_size: Size, config: &OutputConfig) -> Result<Self, VideoError> {
        let mut code = config.fourcc.chars();
        let (Some(a), Some(b), Some(c), Some(d)) = (code.next(), code.next(), code.next(), code.next())
        else {
            return Err(VideoError::OpenFailed(format!(
                "{path}: invalid fourcc {:?}",
                config.fourcc
            )));
        };
        let fourcc = VideoWriter::fourcc(a, b, c, d)?;

        let writer = VideoWriter::new(path, fourcc, config.fps, frame_size, true)?;
        if !writer.is_opened()? {
            return Err(VideoError::OpenFailed(path.to_string()));
        }

        tracing::info!(
            path = %path,
            fourcc = %config.fourcc,
            fps = config.fps,
            width = frame_size.width,
            height = frame_size.height,
            "opened output video"
        );

        Ok(Self {
            writer: Some(writer),
            path: path.to_string(),
            frames_written: 0,
        })
    }
}

impl FrameSink for VideoFileSink {
    fn write(&mut self, frame: &Mat) -> Result<(), VideoError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write(frame)?;
            self.frames_written += 1;
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.release() {
                tracing::warn!(path = %self.path, error = %e, "failed to release video writer");
            }
            tracing::debug!(
                path = %self.path,
                frames = self.frames_written,
                "video writer released"
            );
        }
    }
}

impl Drop for VideoFileSink {
    fn drop(&mut self) {
        self.release();
    }
}
