use anyhow::Error;
use ndarray::ArrayView2;
use opencv::core::Mat;

/// Warps a detected face to a square crop.
pub trait FaceAligner: Send + Sync {
    /// align_crop returns a `size` x `size` crop of `img`.
    ///
    /// # Arguments
    /// * `img` - the full BGR image
    /// * `bbox` - `[x1, y1, x2, y2]` of the selected face
    /// * `keypoints` - the five facial keypoints of the face, when the detector has them
    /// * `size` - side of the output crop
    ///
    /// # Returns
    /// * `Result<Mat, Error>`
    fn align_crop(&self, img: &Mat, bbox: [f32; 4], keypoints: Option<ArrayView2<f32>>, size: i32) -> Result<Mat, Error>;
}
