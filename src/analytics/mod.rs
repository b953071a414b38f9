mod annotate;
mod blobs;
mod detector;
mod morphology;
mod motion;
mod pipeline;

pub use pipeline::FrameOrchestrator;
