use anyhow::Error;
use ndarray::{stack, Array3, Array4, ArrayView2, ArrayView3, Axis};
use crate::error::DatasetError;
use crate::flame::flame::FlameParams;
use crate::pipeline::pipeline::ProcessedFace;

/// One draw of an actor: aligned crops, their landmarks and the actor's FLAME parameters.
///
/// `images` and `landmark` have one entry per face that survived detection, which can be
/// fewer than the rows of the `flame` arrays, and zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub images: Array4<f32>,
    pub imagename: String,
    pub dataset: String,
    pub flame: FlameParams,
    pub landmark: Array3<f32>,
}

impl Sample {
    pub fn len(&self) -> usize {
        self.images.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// build_sample stacks the processed faces of a draw into the sample record.
///
/// # Arguments
/// * `actor` - actor name
/// * `dataset` - dataset name
/// * `faces` - faces kept by the face pipeline
/// * `flame` - replicated FLAME parameters of the actor
/// * `image_size` - side of the crops, used for the shape of an empty sample
///
/// # Returns
/// * `Result<Sample, Error>`
pub fn build_sample(actor: &str, dataset: &str, faces: Vec<ProcessedFace>, flame: FlameParams, image_size: usize) -> Result<Sample, Error> {
    let (images, landmark) = if faces.is_empty() {
        (
            Array4::<f32>::zeros((0, image_size, image_size, 3)),
            Array3::<f32>::zeros((0, 0, 2)),
        )
    } else {
        let image_views: Vec<ArrayView3<f32>> = faces.iter().map(|face| face.image.view()).collect();
        let landmark_views: Vec<ArrayView2<f32>> = faces.iter().map(|face| face.landmarks.view()).collect();
        let images = stack(Axis(0), &image_views)?;
        let landmark = stack(Axis(0), &landmark_views).map_err(|e| DatasetError::LandmarkShape(e.to_string()))?;
        (images, landmark)
    };

    Ok(Sample {
        images,
        imagename: actor.to_string(),
        dataset: dataset.to_string(),
        flame,
        landmark,
    })
}
