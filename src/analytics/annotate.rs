use opencv::{
    core::{Mat, Point, Rect, Scalar, VecN},
    imgproc,
    Result as CvResult,
};

use super::blobs::Blob;

const BOX_COLOR: Scalar = VecN([0.0, 255.0, 0.0, 0.0]);
const LABEL_COLOR: Scalar = VecN([0.0, 0.0, 255.0, 0.0]);
const MARKER_COLOR: Scalar = VecN([0.0, 255.0, 255.0, 0.0]);
const LABEL_OFFSET: i32 = 10;
const MARKER_SIZE: i32 = 6;

/// One accepted blob as handed to the tracker: its centroid plus the box
/// that was drawn around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub centroid: Point,
    pub bbox: Rect,
}

/// Draws a box, a coordinate label and a centroid marker for every blob
/// directly onto `frame`, returning the detections in blob order.
pub fn annotate(frame: &mut Mat, blobs: &[Blob]) -> CvResult<Vec<Detection>> {
    let mut detections = Vec::with_capacity(blobs.len());

    for blob in blobs {
        let Some(centroid) = blob.centroid() else {
            tracing::warn!(
                area = blob.area,
                x = blob.bbox.x,
                y = blob.bbox.y,
                "skipping blob with zero area moment"
            );
            continue;
        };

        imgproc::rectangle(frame, blob.bbox, BOX_COLOR, 2, imgproc::LINE_8, 0)?;
        imgproc::put_text(
            frame,
            &format!("{},{}", centroid.x, centroid.y),
            Point::new(centroid.x + LABEL_OFFSET, centroid.y + LABEL_OFFSET),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.3,
            LABEL_COLOR,
            1,
            imgproc::LINE_8,
            false,
        )?;
        imgproc::draw_marker(
            frame,
            centroid,
            MARKER_COLOR,
            imgproc::MARKER_SQUARE,
            MARKER_SIZE,
            2,
            imgproc::LINE_8,
        )?;

        detections.push(Detection {
            centroid,
            bbox: blob.bbox,
        });
    }

    Ok(detections)
}
