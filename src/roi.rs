use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use opencv::core::{Rect, Size};
use thiserror::Error;

const ROI_FILE_SUFFIX: &str = "_pre-testedROI.txt";
pub const SAVE_PROMPT_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum RoiError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed roi: {0}")]
    Malformed(String),
    #[error("roi {0:?} lies outside the {1:?} frame")]
    OutOfBounds(Rect, Size),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoiMode {
    /// Drag a rectangle over the first frame.
    Manually,
    /// Reuse the ROI saved next to the video, selecting manually if absent.
    PreTested,
}

/// Parses the `(x, y, width, height)` form written by [`RoiStore::save`].
pub fn parse_roi(text: &str) -> Result<Rect, RoiError> {
    let inner = text
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| RoiError::Malformed(format!("expected parenthesised tuple, got {text:?}")))?;

    let fields = inner
        .split(", ")
        .map(|f| f.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RoiError::Malformed(e.to_string()))?;

    match fields.as_slice() {
        &[x, y, width, height] => Ok(Rect::new(x, y, width, height)),
        _ => Err(RoiError::Malformed(format!(
            "expected 4 fields, got {}",
            fields.len()
        ))),
    }
}

pub fn format_roi(roi: Rect) -> String {
    format!("({}, {}, {}, {})", roi.x, roi.y, roi.width, roi.height)
}

pub fn fits_frame(roi: Rect, frame_size: Size) -> bool {
    roi.width > 0
        && roi.height > 0
        && roi.x >= 0
        && roi.y >= 0
        && roi.x + roi.width <= frame_size.width
        && roi.y + roi.height <= frame_size.height
}

pub fn full_frame(frame_size: Size) -> Rect {
    Rect::new(0, 0, frame_size.width, frame_size.height)
}

/// Per-video ROI file living next to the input video.
pub struct RoiStore {
    path: PathBuf,
}

impl RoiStore {
    pub fn for_video(video: &Path) -> Self {
        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = video.parent().unwrap_or_else(|| Path::new(""));
        Self {
            path: dir.join(format!("{stem}{ROI_FILE_SUFFIX}")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self, frame_size: Size) -> Result<Rect, RoiError> {
        let text = std::fs::read_to_string(&self.path)?;
        let roi = parse_roi(&text)?;
        if !fits_frame(roi, frame_size) {
            return Err(RoiError::OutOfBounds(roi, frame_size));
        }
        Ok(roi)
    }

    pub fn save(&self, roi: Rect) -> Result<(), RoiError> {
        std::fs::write(&self.path, format_roi(roi))?;
        tracing::info!(path = %self.path.display(), roi = %format_roi(roi), "saved roi");
        Ok(())
    }
}

/// Asks whether to keep the ROI, re-asking on anything but y/n at most
/// `max_attempts` times. End of input or running out of attempts means no.
pub fn confirm_save<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    max_attempts: u32,
) -> std::io::Result<bool> {
    writeln!(
        output,
        "Do you wish to save the selected region of interest for future runs of this video?"
    )?;

    for _ in 0..max_attempts {
        write!(output, "Please type 'Y' or 'N' ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }

        match line.trim().to_ascii_lowercase().as_str() {
            "y" => return Ok(true),
            "n" => return Ok(false),
            other => tracing::debug!(answer = %other, "unrecognised answer"),
        }
    }

    writeln!(output, "No valid answer given, not saving.")?;
    Ok(false)
}
