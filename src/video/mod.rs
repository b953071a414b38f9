mod capture;
mod display;
mod writer;

pub use capture::VideoFileSource;
pub use display::{HeadlessDisplay, HighguiDisplay};
pub use writer::VideoFileSink;

use std::time::Duration;

use opencv::core::{Mat, Rect, Size};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("opencv error: {0}")]
    Cv(#[from] opencv::Error),
    #[error("failed to open {0}")]
    OpenFailed(String),
}

/// Pull-based frame supply. `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Mat>, VideoError>;

    fn frame_size(&self) -> Size;

    fn release(&mut self);
}

pub trait FrameSink {
    fn write(&mut self, frame: &Mat) -> Result<(), VideoError>;

    fn release(&mut self);
}

/// Live preview and user interaction.
pub trait Display {
    /// Lets the user drag a rectangle over `frame`. An empty rect means the
    /// selection was cancelled.
    fn select_roi(&mut self, frame: &Mat) -> Result<Rect, VideoError>;

    fn show(&mut self, frame: &Mat) -> Result<(), VideoError>;

    /// Waits up to `wait` for a key press and returns its code.
    fn poll_key(&mut self, wait: Duration) -> Result<Option<i32>, VideoError>;

    fn close(&mut self);

    fn is_interactive(&self) -> bool;
}
