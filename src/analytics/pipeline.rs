use std::io::{BufRead, Write};
use std::time::Duration;

use opencv::core::{Mat, Point, Rect, Scalar, Size, VecN};
use opencv::imgproc;
use opencv::prelude::*;

use crate::config::Config;
use crate::roi::{self, RoiMode, RoiStore, SAVE_PROMPT_ATTEMPTS};
use crate::tracking::{Track, Tracker};
use crate::video::{Display, FrameSink, FrameSource};

use super::detector::MotionDetector;

const ESCAPE_KEY: i32 = 27;

const TRACK_COLORS: [Scalar; 9] = [
    VecN([255.0, 0.0, 0.0, 0.0]),
    VecN([0.0, 255.0, 0.0, 0.0]),
    VecN([0.0, 0.0, 255.0, 0.0]),
    VecN([255.0, 255.0, 0.0, 0.0]),
    VecN([0.0, 255.0, 255.0, 0.0]),
    VecN([255.0, 0.0, 255.0, 0.0]),
    VecN([255.0, 127.0, 255.0, 0.0]),
    VecN([127.0, 0.0, 255.0, 0.0]),
    VecN([127.0, 0.0, 127.0, 0.0]),
];
const ROI_COLOR: Scalar = VecN([0.0, 255.0, 0.0, 0.0]);
const COUNT_COLOR: Scalar = VecN([0.0, 255.0, 0.0, 0.0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Interrupted,
    ReadFailed,
    ProcessingFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiOrigin {
    Loaded,
    Selected,
    FullFrame,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub frames: u64,
    pub detections: u64,
    pub unique_tracks: u64,
    pub roi: Option<Rect>,
    pub roi_origin: Option<RoiOrigin>,
    pub reason: StopReason,
}

enum State {
    AwaitingRoi,
    Tracking { roi: Rect, origin: RoiOrigin },
    Terminated(StopReason),
}

/// Drives one input stream from ROI acquisition to shutdown.
///
/// Owns the reader, writer and display for the run and releases each of them
/// exactly once, whichever way the run ends.
pub struct FrameOrchestrator<S, K, D>
where
    S: FrameSource,
    K: FrameSink,
    D: Display,
{
    source: S,
    sink: K,
    display: D,
    detector: MotionDetector,
    tracker: Box<dyn Tracker>,
    roi_store: RoiStore,
    roi_mode: RoiMode,
    key_wait: Duration,
    gate_to_roi: bool,
    frames: u64,
    detections: u64,
}

impl<S, K, D> FrameOrchestrator<S, K, D>
where
    S: FrameSource,
    K: FrameSink,
    D: Display,
{
    pub fn new(
        source: S,
        sink: K,
        display: D,
        tracker: Box<dyn Tracker>,
        roi_store: RoiStore,
        roi_mode: RoiMode,
        config: &Config,
    ) -> opencv::Result<Self> {
        Ok(Self {
            source,
            sink,
            display,
            detector: MotionDetector::new(config)?,
            tracker,
            roi_store,
            roi_mode,
            key_wait: Duration::from_millis(config.display.key_wait_ms),
            gate_to_roi: config.display.gate_to_roi,
            frames: 0,
            detections: 0,
        })
    }

    /// Runs until the stream ends or the user interrupts. `answers` and
    /// `prompt` carry the save-ROI conversation at shutdown.
    pub fn run<R: BufRead, W: Write>(mut self, answers: R, prompt: W) -> RunSummary {
        let mut state = State::AwaitingRoi;
        let mut chosen: Option<(Rect, RoiOrigin)> = None;

        let reason = loop {
            state = match state {
                State::AwaitingRoi => self.acquire_roi(),
                State::Tracking { roi, origin } => {
                    chosen = Some((roi, origin));
                    match self.cycle(roi) {
                        Some(reason) => State::Terminated(reason),
                        None => State::Tracking { roi, origin },
                    }
                }
                State::Terminated(reason) => break reason,
            };
        };

        self.shutdown(chosen, answers, prompt);

        let summary = RunSummary {
            frames: self.frames,
            detections: self.detections,
            unique_tracks: self.tracker.total_tracks(),
            roi: chosen.map(|(r, _)| r),
            roi_origin: chosen.map(|(_, o)| o),
            reason,
        };
        tracing::info!(
            frames = summary.frames,
            detections = summary.detections,
            unique_tracks = summary.unique_tracks,
            roi = ?summary.roi,
            roi_origin = ?summary.roi_origin,
            reason = ?summary.reason,
            "run finished"
        );
        summary
    }

    fn acquire_roi(&mut self) -> State {
        let first = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::warn!("stream ended before the first frame");
                return State::Terminated(StopReason::EndOfStream);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read first frame");
                return State::Terminated(StopReason::ReadFailed);
            }
        };
        let frame_size = Size::new(first.cols(), first.rows());

        if self.roi_mode == RoiMode::PreTested {
            match self.roi_store.load(frame_size) {
                Ok(roi) => {
                    tracing::info!(
                        path = %self.roi_store.path().display(),
                        roi = %roi::format_roi(roi),
                        "loaded pre-tested roi"
                    );
                    return State::Tracking {
                        roi,
                        origin: RoiOrigin::Loaded,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        path = %self.roi_store.path().display(),
                        error = %e,
                        "pre-tested roi unavailable, select it manually"
                    );
                }
            }
        }

        let selected = match self.display.select_roi(&first) {
            Ok(rect) => rect,
            Err(e) => {
                tracing::warn!(error = %e, "roi selection failed");
                Rect::default()
            }
        };

        if roi::fits_frame(selected, frame_size) {
            tracing::info!(roi = %roi::format_roi(selected), "roi selected");
            State::Tracking {
                roi: selected,
                origin: RoiOrigin::Selected,
            }
        } else {
            tracing::info!("no roi selected, using the full frame");
            State::Tracking {
                roi: roi::full_frame(frame_size),
                origin: RoiOrigin::FullFrame,
            }
        }
    }

    /// One steady-state iteration. Returns why the run stops, if it does.
    fn cycle(&mut self, roi: Rect) -> Option<StopReason> {
        let mut frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(frames = self.frames, "end of stream");
                return Some(StopReason::EndOfStream);
            }
            Err(e) => {
                tracing::warn!(frame = self.frames, error = %e, "frame read failed");
                return Some(StopReason::ReadFailed);
            }
        };

        if let Err(e) = self.process(&mut frame, roi) {
            tracing::error!(frame = self.frames, error = %e, "frame processing failed");
            return Some(StopReason::ProcessingFailed);
        }
        self.frames += 1;

        if let Err(e) = self.sink.write(&frame) {
            tracing::error!(frame = self.frames, error = %e, "failed to write frame");
            return Some(StopReason::ProcessingFailed);
        }
        if let Err(e) = self.display.show(&frame) {
            tracing::warn!(error = %e, "failed to show frame");
        }

        match self.display.poll_key(self.key_wait) {
            Ok(Some(ESCAPE_KEY)) => {
                tracing::info!(frames = self.frames, "interrupted by user");
                Some(StopReason::Interrupted)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "key poll failed");
                None
            }
        }
    }

    fn process(&mut self, frame: &mut Mat, roi: Rect) -> opencv::Result<()> {
        let detections = self.detector.detect(frame)?;
        for d in &detections {
            tracing::trace!(
                frame = self.frames,
                x = d.centroid.x,
                y = d.centroid.y,
                width = d.bbox.width,
                height = d.bbox.height,
                "blob"
            );
        }
        let centroids: Vec<Point> = detections
            .iter()
            .map(|d| d.centroid)
            .filter(|&c| !self.gate_to_roi || roi_contains(roi, c))
            .collect();
        self.detections += centroids.len() as u64;

        if !centroids.is_empty() {
            self.tracker.update(&centroids);
        }
        let tracks = self.tracker.tracks();

        draw_tracks(frame, tracks)?;
        imgproc::rectangle(frame, roi, ROI_COLOR, 1, imgproc::LINE_8, 0)?;
        imgproc::put_text(
            frame,
            &format!("people detected: {}", tracks.len()),
            Point::new(10, (frame.rows() - 30).max(20)),
            imgproc::FONT_HERSHEY_SIMPLEX,
            1.0,
            COUNT_COLOR,
            1,
            imgproc::LINE_AA,
            false,
        )?;

        tracing::debug!(
            frame = self.frames,
            detections = centroids.len(),
            tracks = tracks.len(),
            warming_up = self.detector.is_warming_up(),
            "frame processed"
        );
        Ok(())
    }

    fn shutdown<R: BufRead, W: Write>(
        &mut self,
        chosen: Option<(Rect, RoiOrigin)>,
        answers: R,
        prompt: W,
    ) {
        self.source.release();
        self.sink.release();
        self.display.close();

        let Some((roi, RoiOrigin::Selected)) = chosen else {
            return;
        };
        if !self.display.is_interactive() {
            return;
        }

        match roi::confirm_save(answers, prompt, SAVE_PROMPT_ATTEMPTS) {
            Ok(true) => {
                if let Err(e) = self.roi_store.save(roi) {
                    tracing::error!(
                        path = %self.roi_store.path().display(),
                        error = %e,
                        "failed to save roi"
                    );
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "roi save prompt failed"),
        }
    }
}

fn roi_contains(roi: Rect, p: Point) -> bool {
    p.x >= roi.x && p.y >= roi.y && p.x < roi.x + roi.width && p.y < roi.y + roi.height
}

fn draw_tracks(frame: &mut Mat, tracks: &[Track]) -> opencv::Result<()> {
    for track in tracks {
        if track.trace.len() < 2 {
            continue;
        }
        let color = TRACK_COLORS[(track.id % TRACK_COLORS.len() as u64) as usize];
        for (a, b) in track.trace.iter().zip(track.trace.iter().skip(1)) {
            imgproc::line(frame, *a, *b, color, 2, imgproc::LINE_8, 0)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::NearestNeighbourTracker;
    use crate::video::VideoError;
    use opencv::core::{Vec3b, CV_8UC3};
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, VecDeque};
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    const WIDTH: i32 = 320;
    const HEIGHT: i32 = 240;

    fn square_frame(x: i32) -> Mat {
        let mut frame =
            Mat::new_rows_cols_with_default(HEIGHT, WIDTH, CV_8UC3, Scalar::all(0.0)).unwrap();
        imgproc::rectangle(
            &mut frame,
            Rect::new(x, 100, 30, 30),
            Scalar::all(255.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
        frame
    }

    struct FakeSource {
        frames: VecDeque<Mat>,
        fail_at_end: bool,
        releases: Rc<Cell<u32>>,
    }

    impl FakeSource {
        fn moving_square(count: i32, releases: Rc<Cell<u32>>) -> Self {
            Self {
                frames: (0..count).map(|i| square_frame(10 + 4 * i)).collect(),
                fail_at_end: false,
                releases,
            }
        }
    }

    impl FrameSource for FakeSource {
        fn next_frame(&mut self) -> Result<Option<Mat>, VideoError> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None if self.fail_at_end => Err(VideoError::OpenFailed("corrupt".into())),
                None => Ok(None),
            }
        }

        fn frame_size(&self) -> Size {
            Size::new(WIDTH, HEIGHT)
        }

        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    struct FakeSink {
        written: Rc<RefCell<Vec<Mat>>>,
        releases: Rc<Cell<u32>>,
    }

    impl FrameSink for FakeSink {
        fn write(&mut self, frame: &Mat) -> Result<(), VideoError> {
            self.written.borrow_mut().push(frame.try_clone()?);
            Ok(())
        }

        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    struct FakeDisplay {
        selection: Rect,
        keys: HashMap<u32, i32>,
        polls: u32,
        closes: Rc<Cell<u32>>,
        interactive: bool,
    }

    impl FakeDisplay {
        fn selecting(selection: Rect, closes: Rc<Cell<u32>>) -> Self {
            Self {
                selection,
                keys: HashMap::new(),
                polls: 0,
                closes,
                interactive: true,
            }
        }
    }

    impl Display for FakeDisplay {
        fn select_roi(&mut self, _frame: &Mat) -> Result<Rect, VideoError> {
            Ok(self.selection)
        }

        fn show(&mut self, _frame: &Mat) -> Result<(), VideoError> {
            Ok(())
        }

        fn poll_key(&mut self, _wait: Duration) -> Result<Option<i32>, VideoError> {
            self.polls += 1;
            Ok(self.keys.get(&self.polls).copied())
        }

        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }

        fn is_interactive(&self) -> bool {
            self.interactive
        }
    }

    struct Harness {
        source_releases: Rc<Cell<u32>>,
        sink_releases: Rc<Cell<u32>>,
        closes: Rc<Cell<u32>>,
        written: Rc<RefCell<Vec<Mat>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                source_releases: Rc::new(Cell::new(0)),
                sink_releases: Rc::new(Cell::new(0)),
                closes: Rc::new(Cell::new(0)),
                written: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn orchestrator(
            &self,
            source: FakeSource,
            display: FakeDisplay,
            video: &Path,
            mode: RoiMode,
        ) -> FrameOrchestrator<FakeSource, FakeSink, FakeDisplay> {
            let config = Config::default();
            let sink = FakeSink {
                written: Rc::clone(&self.written),
                releases: Rc::clone(&self.sink_releases),
            };
            FrameOrchestrator::new(
                source,
                sink,
                display,
                Box::new(NearestNeighbourTracker::new(&config.tracker)),
                RoiStore::for_video(video),
                mode,
                &config,
            )
            .unwrap()
        }

        fn assert_released_once(&self) {
            assert_eq!(self.source_releases.get(), 1);
            assert_eq!(self.sink_releases.get(), 1);
            assert_eq!(self.closes.get(), 1);
        }
    }

    fn temp_video(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("footfall-pipeline-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let video = dir.join(format!("{name}.avi"));
        let _ = std::fs::remove_file(RoiStore::for_video(&video).path());
        video
    }

    #[test]
    fn test_run_to_end_of_stream() {
        let h = Harness::new();
        let video = temp_video("eos");
        let source = FakeSource::moving_square(50, Rc::clone(&h.source_releases));
        let display = FakeDisplay::selecting(Rect::new(0, 0, 200, 200), Rc::clone(&h.closes));

        let summary = h
            .orchestrator(source, display, &video, RoiMode::Manually)
            .run("n\n".as_bytes(), Vec::new());

        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert_eq!(summary.frames, 49);
        assert_eq!(h.written.borrow().len(), 49);
        assert!(summary.detections >= 20);
        assert!(summary.unique_tracks >= 1);
        assert_eq!(summary.roi, Some(Rect::new(0, 0, 200, 200)));
        h.assert_released_once();
        assert!(!RoiStore::for_video(&video).path().exists());
    }

    #[test]
    fn test_escape_key_interrupts() {
        let h = Harness::new();
        let video = temp_video("escape");
        let source = FakeSource::moving_square(50, Rc::clone(&h.source_releases));
        let mut display = FakeDisplay::selecting(Rect::new(0, 0, 100, 100), Rc::clone(&h.closes));
        display.keys.insert(3, ESCAPE_KEY);
        display.keys.insert(2, 'a' as i32);

        let summary = h
            .orchestrator(source, display, &video, RoiMode::Manually)
            .run("n\n".as_bytes(), Vec::new());

        assert_eq!(summary.reason, StopReason::Interrupted);
        assert_eq!(summary.frames, 3);
        h.assert_released_once();
    }

    #[test]
    fn test_read_failure_terminates_normally() {
        let h = Harness::new();
        let video = temp_video("readfail");
        let mut source = FakeSource::moving_square(5, Rc::clone(&h.source_releases));
        source.fail_at_end = true;
        let display = FakeDisplay::selecting(Rect::new(0, 0, 100, 100), Rc::clone(&h.closes));

        let summary = h
            .orchestrator(source, display, &video, RoiMode::Manually)
            .run("n\n".as_bytes(), Vec::new());

        assert_eq!(summary.reason, StopReason::ReadFailed);
        assert_eq!(summary.frames, 4);
        h.assert_released_once();
    }

    #[test]
    fn test_empty_stream_releases_resources() {
        let h = Harness::new();
        let video = temp_video("empty");
        let source = FakeSource::moving_square(0, Rc::clone(&h.source_releases));
        let display = FakeDisplay::selecting(Rect::new(0, 0, 100, 100), Rc::clone(&h.closes));

        let summary = h
            .orchestrator(source, display, &video, RoiMode::Manually)
            .run("y\n".as_bytes(), Vec::new());

        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.roi, None);
        h.assert_released_once();
        assert!(!RoiStore::for_video(&video).path().exists());
    }

    #[test]
    fn test_selected_roi_saved_on_confirmation() {
        let h = Harness::new();
        let video = temp_video("save");
        let source = FakeSource::moving_square(3, Rc::clone(&h.source_releases));
        let display = FakeDisplay::selecting(Rect::new(5, 6, 70, 80), Rc::clone(&h.closes));

        h.orchestrator(source, display, &video, RoiMode::Manually)
            .run("what\nY\n".as_bytes(), Vec::new());

        let saved = RoiStore::for_video(&video)
            .load(Size::new(WIDTH, HEIGHT))
            .unwrap();
        assert_eq!(saved, Rect::new(5, 6, 70, 80));
    }

    #[test]
    fn test_pre_tested_roi_is_loaded_without_prompt() {
        let h = Harness::new();
        let video = temp_video("pretested");
        let store = RoiStore::for_video(&video);
        store.save(Rect::new(10, 20, 300, 200)).unwrap();

        let source = FakeSource::moving_square(3, Rc::clone(&h.source_releases));
        let display = FakeDisplay::selecting(Rect::new(1, 1, 5, 5), Rc::clone(&h.closes));
        let mut prompt = Vec::new();

        let summary = h
            .orchestrator(source, display, &video, RoiMode::PreTested)
            .run("y\n".as_bytes(), &mut prompt);

        assert_eq!(summary.roi, Some(Rect::new(10, 20, 300, 200)));
        assert_eq!(summary.roi_origin, Some(RoiOrigin::Loaded));
        assert!(prompt.is_empty());
    }

    #[test]
    fn test_corrupt_roi_file_falls_back_to_selection() {
        let h = Harness::new();
        let video = temp_video("corrupt");
        std::fs::write(RoiStore::for_video(&video).path(), "(10, 20").unwrap();

        let source = FakeSource::moving_square(3, Rc::clone(&h.source_releases));
        let display = FakeDisplay::selecting(Rect::new(2, 3, 40, 50), Rc::clone(&h.closes));

        let summary = h
            .orchestrator(source, display, &video, RoiMode::PreTested)
            .run("n\n".as_bytes(), Vec::new());

        assert_eq!(summary.roi, Some(Rect::new(2, 3, 40, 50)));
        assert_eq!(summary.roi_origin, Some(RoiOrigin::Selected));
    }

    #[test]
    fn test_cancelled_selection_uses_full_frame() {
        let h = Harness::new();
        let video = temp_video("cancel");
        let source = FakeSource::moving_square(3, Rc::clone(&h.source_releases));
        let display = FakeDisplay::selecting(Rect::default(), Rc::clone(&h.closes));

        let summary = h
            .orchestrator(source, display, &video, RoiMode::Manually)
            .run("y\n".as_bytes(), Vec::new());

        assert_eq!(summary.roi, Some(Rect::new(0, 0, WIDTH, HEIGHT)));
        assert_eq!(summary.roi_origin, Some(RoiOrigin::FullFrame));
        assert!(!RoiStore::for_video(&video).path().exists());
    }

    #[test]
    fn test_headless_display_never_prompts() {
        let h = Harness::new();
        let video = temp_video("headless");
        let source = FakeSource::moving_square(3, Rc::clone(&h.source_releases));
        let mut display = FakeDisplay::selecting(Rect::new(5, 5, 50, 50), Rc::clone(&h.closes));
        display.interactive = false;
        let mut prompt = Vec::new();

        h.orchestrator(source, display, &video, RoiMode::Manually)
            .run("y\n".as_bytes(), &mut prompt);

        assert!(prompt.is_empty());
        assert!(!RoiStore::for_video(&video).path().exists());
    }

    #[test]
    fn test_roi_is_drawn_on_output() {
        let h = Harness::new();
        let video = temp_video("overlay");
        let source = FakeSource::moving_square(3, Rc::clone(&h.source_releases));
        let display = FakeDisplay::selecting(Rect::new(200, 10, 100, 60), Rc::clone(&h.closes));

        h.orchestrator(source, display, &video, RoiMode::Manually)
            .run("n\n".as_bytes(), Vec::new());

        let written = h.written.borrow();
        let pixel = *written[0].at_2d::<Vec3b>(10, 250).unwrap();
        assert_eq!(pixel, Vec3b::from([0, 255, 0]));
    }

    #[test]
    fn test_track_lines_use_palette_by_id() {
        let mut frame =
            Mat::new_rows_cols_with_default(50, 50, CV_8UC3, Scalar::all(0.0)).unwrap();
        let track = Track {
            id: 11,
            trace: VecDeque::from(vec![Point::new(5, 25), Point::new(45, 25)]),
            skipped_frames: 0,
        };
        draw_tracks(&mut frame, &[track]).unwrap();
        let pixel = *frame.at_2d::<Vec3b>(25, 25).unwrap();
        // 11 mod 9 = 2 -> (0, 0, 255)
        assert_eq!(pixel, Vec3b::from([0, 0, 255]));
    }

    #[test]
    fn test_single_point_trace_is_not_drawn() {
        let mut frame =
            Mat::new_rows_cols_with_default(50, 50, CV_8UC3, Scalar::all(0.0)).unwrap();
        let track = Track {
            id: 0,
            trace: VecDeque::from(vec![Point::new(5, 25)]),
            skipped_frames: 0,
        };
        draw_tracks(&mut frame, &[track]).unwrap();
        assert_eq!(opencv::core::sum_elems(&frame).unwrap(), Scalar::all(0.0));
    }

    #[test]
    fn test_roi_contains_is_half_open() {
        let roi = Rect::new(10, 10, 20, 20);
        assert!(roi_contains(roi, Point::new(10, 10)));
        assert!(roi_contains(roi, Point::new(29, 29)));
        assert!(!roi_contains(roi, Point::new(30, 10)));
        assert!(!roi_contains(roi, Point::new(9, 15)));
    }
}
