use anyhow::Error;
use ndarray::{Array2, Array3, ArrayView1, ArrayView2};
use opencv::core::Mat;
use crate::error::DatasetError;

/// Output of a face detector for one image.
///
/// `boxes` holds one `[x1, y1, x2, y2, score]` row per face; `keypoints`, when the model
/// produces them, holds five `(x, y)` points per face in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct Detections {
    pub boxes: Array2<f32>,
    pub keypoints: Option<Array3<f32>>,
}

impl Detections {
    pub fn empty() -> Self {
        Detections {
            boxes: Array2::zeros((0, 5)),
            keypoints: None,
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.nrows() == 0
    }

    /// validate checks that boxes have at least five columns and keypoints are `[n, 5, 2]`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.boxes.ncols() < 5 {
            return Err(DatasetError::DetectionShape(format!(
                "boxes have {} columns, expected [x1, y1, x2, y2, score]",
                self.boxes.ncols()
            )).into())
        }
        if let Some(kps) = &self.keypoints {
            let expected = [self.boxes.nrows(), 5, 2];
            if kps.shape() != &expected[..] {
                return Err(DatasetError::DetectionShape(format!(
                    "keypoints have shape {:?}, expected {:?}",
                    kps.shape(),
                    expected
                )).into())
            }
        }
        Ok(())
    }

    pub fn bbox(&self, idx: usize) -> Option<[f32; 4]> {
        if idx >= self.boxes.nrows() || self.boxes.ncols() < 4 {
            return None
        }
        let row: ArrayView1<f32> = self.boxes.row(idx);
        Some([row[0], row[1], row[2], row[3]])
    }

    pub fn score(&self, idx: usize) -> Option<f32> {
        self.boxes.get([idx, 4]).copied()
    }

    pub fn keypoints(&self, idx: usize) -> Option<ArrayView2<f32>> {
        self.keypoints
            .as_ref()
            .filter(|kps| idx < kps.shape()[0])
            .map(|kps| kps.index_axis(ndarray::Axis(0), idx))
    }
}

/// A face detection model, shared by every sample request.
pub trait FaceDetector: Send + Sync {
    /// detect finds every face of a BGR image.
    fn detect(&self, img: &Mat) -> Result<Detections, Error>;
}
