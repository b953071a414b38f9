use std::time::Duration;

use opencv::{
    core::{Mat, Rect},
    highgui,
};

use super::{Display, VideoError};

const TRACKING_WINDOW: &str = "Tracking";
const ROI_WINDOW: &str = "ROI selector";

pub struct HighguiDisplay {
    open: bool,
}

impl HighguiDisplay {
    pub fn new() -> Self {
        Self { open: false }
    }
}

impl Display for HighguiDisplay {
    fn select_roi(&mut self, frame: &Mat) -> Result<Rect, VideoError> {
        let roi = highgui::select_roi_def(ROI_WINDOW, frame)?;
        highgui::destroy_window(ROI_WINDOW)?;
        Ok(roi)
    }

    fn show(&mut self, frame: &Mat) -> Result<(), VideoError> {
        highgui::imshow(TRACKING_WINDOW, frame)?;
        self.open = true;
        Ok(())
    }

    fn poll_key(&mut self, wait: Duration) -> Result<Option<i32>, VideoError> {
        let key = highgui::wait_key(wait.as_millis().max(1) as i32)?;
        if key < 0 {
            return Ok(None);
        }
        Ok(Some(key & 0xff))
    }

    fn close(&mut self) {
        if self.open {
            if let Err(e) = highgui::destroy_all_windows() {
                tracing::warn!(error = %e, "failed to close windows");
            }
            self.open = false;
        }
    }

    fn is_interactive(&self) -> bool {
        true
    }
}

impl Drop for HighguiDisplay {
    fn drop(&mut self) {
        self.close();
    }
}

/// No windows: the key poll only paces the loop and ROI selection always
/// comes back cancelled.
pub struct HeadlessDisplay;

impl Display for HeadlessDisplay {
    fn select_roi(&mut self, _frame: &Mat) -> Result<Rect, VideoError> {
        Ok(Rect::default())
    }

    fn show(&mut self, _frame: &Mat) -> Result<(), VideoError> {
        Ok(())
    }

    fn poll_key(&mut self, wait: Duration) -> Result<Option<i32>, VideoError> {
        std::thread::sleep(wait);
        Ok(None)
    }

    fn close(&mut self) {}

    fn is_interactive(&self) -> bool {
        false
    }
}
