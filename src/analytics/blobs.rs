use opencv::{
    core::{Mat, Moments, Point, Rect, Vec4i, Vector},
    imgproc,
    prelude::*,
    Result as CvResult,
};

use crate::config::{BlobConfig, ContourSource};

/// A top-level contour that passed the area filter. Lives for one frame.
#[allow(dead_code)]
pub struct Blob {
    pub contour: Vector<Point>,
    pub area: f64,
    pub bbox: Rect,
    pub moments: Moments,
}

impl Blob {
    /// Integer-truncated centre of mass, or `None` when the zeroth moment
    /// vanishes.
    pub fn centroid(&self) -> Option<Point> {
        let m = &self.moments;
        if m.m00 == 0.0 {
            return None;
        }
        Some(Point::new((m.m10 / m.m00) as i32, (m.m01 / m.m00) as i32))
    }
}

pub struct BlobExtractor {
    min_area: f64,
    max_area: f64,
    contour_source: ContourSource,
    shadow_threshold: f64,
}

impl BlobExtractor {
    pub fn new(config: &BlobConfig) -> Self {
        Self {
            min_area: config.min_area,
            max_area: config.max_area,
            contour_source: config.contour_source,
            shadow_threshold: config.shadow_threshold,
        }
    }

    /// Returns the parentless contours of `mask` whose area lies strictly
    /// inside the configured bounds. Order follows OpenCV's contour traversal
    /// and carries no identity.
    pub fn extract(&self, mask: &Mat) -> CvResult<Vec<Blob>> {
        let source = match self.contour_source {
            ContourSource::Dilated => None,
            ContourSource::Thresholded => {
                let mut binary = Mat::default();
                imgproc::threshold(
                    mask,
                    &mut binary,
                    self.shadow_threshold,
                    255.0,
                    imgproc::THRESH_BINARY,
                )?;
                Some(binary)
            }
        };
        let source = source.as_ref().unwrap_or(mask);

        let mut contours: Vector<Vector<Point>> = Vector::new();
        let mut hierarchy: Vector<Vec4i> = Vector::new();
        imgproc::find_contours_with_hierarchy(
            source,
            &mut contours,
            &mut hierarchy,
            imgproc::RETR_TREE,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut blobs = Vec::new();
        for (contour, links) in contours.iter().zip(hierarchy.iter()) {
            // links = [next, previous, first_child, parent]
            if links[3] != -1 {
                continue;
            }

            let area = imgproc::contour_area(&contour, false)?;
            if !(area > self.min_area && area < self.max_area) {
                continue;
            }

            let moments = imgproc::moments(&contour, false)?;
            if moments.m00 == 0.0 {
                tracing::trace!(area, "dropping contour with zero area moment");
                continue;
            }

            let bbox = imgproc::bounding_rect(&contour)?;
            blobs.push(Blob {
                contour,
                area,
                bbox,
                moments,
            });
        }

        Ok(blobs)
    }
}
