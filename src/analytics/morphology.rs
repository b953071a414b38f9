use opencv::{
    core::{Mat, Point, Size, BORDER_CONSTANT},
    imgproc,
    prelude::*,
    Result as CvResult,
};

/// Stateless close → open → dilate chain over a foreground mask.
///
/// Closing first joins small gaps so that the opening does not split one
/// person into several contours; the trailing dilation re-grows what the
/// opening shrank.
pub struct MaskRefiner {
    kernel: Mat,
}

impl MaskRefiner {
    pub fn new(kernel_size: i32) -> CvResult<Self> {
        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_ELLIPSE,
            Size::new(kernel_size, kernel_size),
            Point::new(-1, -1),
        )?;
        Ok(Self { kernel })
    }

    pub fn refine(&self, mask: &Mat) -> CvResult<Mat> {
        let opened = self.denoise(mask)?;

        let mut dilated = Mat::default();
        imgproc::dilate(
            &opened,
            &mut dilated,
            &self.kernel,
            Point::new(-1, -1),
            1,
            BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;
        Ok(dilated)
    }

    /// The close → open part of [`MaskRefiner::refine`]. Idempotent.
    pub fn denoise(&self, mask: &Mat) -> CvResult<Mat> {
        let closed = self.morph(mask, imgproc::MORPH_CLOSE)?;
        self.morph(&closed, imgproc::MORPH_OPEN)
    }

    fn morph(&self, src: &Mat, op: i32) -> CvResult<Mat> {
        let mut dst = Mat::default();
        imgproc::morphology_ex(
            src,
            &mut dst,
            op,
            &self.kernel,
            Point::new(-1, -1),
            1,
            BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;
        Ok(dst)
    }
}
