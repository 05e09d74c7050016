use anyhow::Error;
use ndarray::Array2;
use opencv::core::Mat;

/// A facial landmark model, shared by every sample request.
pub trait LandmarkDetector: Send + Sync {
    /// get_landmarks returns one `(points, 2 or 3)` array per face found in the image.
    fn get_landmarks(&self, img: &Mat) -> Result<Vec<Array2<f32>>, Error>;
}
