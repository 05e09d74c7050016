use std::path::Path;
use std::sync::Arc;
use anyhow::Error;
use log::{debug, warn};
use ndarray::{Array2, Array3};
use opencv::core::{Mat, MatTraitConst};
use crate::error::DatasetError;
use crate::helper::face_helper::get_center_face;
use crate::modules::face_align::FaceAligner;
use crate::modules::face_detection::FaceDetector;
use crate::modules::face_landmark::LandmarkDetector;
use crate::utils::image::{convert_mat_to_normalized_ndarray, read_image};

/// The models used to build samples, loaded once and shared by every request.
#[derive(Clone)]
pub struct FaceModels {
    pub detector: Arc<dyn FaceDetector>,
    pub aligner: Arc<dyn FaceAligner>,
    pub landmarks: Arc<dyn LandmarkDetector>,
}

impl FaceModels {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        aligner: Arc<dyn FaceAligner>,
        landmarks: Arc<dyn LandmarkDetector>,
    ) -> Self {
        FaceModels {
            detector,
            aligner,
            landmarks,
        }
    }
}

/// An aligned face crop and the landmarks of its source image.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFace {
    pub image: Array3<f32>,
    pub landmarks: Array2<f32>,
}

#[derive(Clone)]
pub struct FacePipeline {
    models: FaceModels,
    image_size: i32,
}

impl FacePipeline {

    /// new initializes the per-image face pipeline.
    pub fn new(models: FaceModels, image_size: i32) -> Self {
        FacePipeline {
            models,
            image_size,
        }
    }

    pub fn image_size(&self) -> i32 {
        self.image_size
    }

    /// process_image loads an image and turns its most centered face into a training crop.
    ///
    /// # Arguments
    /// * `path` - path of the image
    ///
    /// # Returns
    /// * `Result<Option<ProcessedFace>, Error>` - `None` when no face is detected
    pub fn process_image<P: AsRef<Path>>(&self, path: P) -> Result<Option<ProcessedFace>, Error> {
        let path = path.as_ref();
        let img = read_image(path)?;
        self.process_mat(&img, &path.display().to_string())
    }

    /// process_mat runs detection, alignment and landmark extraction on a decoded BGR image.
    ///
    /// Landmarks come from the full image, not from the crop, and are not matched against
    /// the aligned face: with several faces in view they may describe another person.
    ///
    /// # Arguments
    /// * `img` - BGR image
    /// * `origin` - name of the image, used in logs and errors
    ///
    /// # Returns
    /// * `Result<Option<ProcessedFace>, Error>`
    pub fn process_mat(&self, img: &Mat, origin: &str) -> Result<Option<ProcessedFace>, Error> {
        let detections = self.models.detector.detect(img)?;
        if detections.is_empty() {
            warn!("no face detected in {origin}, skipping");
            return Ok(None)
        }
        detections.validate()?;

        let center_idx = get_center_face(detections.boxes.view(), img.rows(), img.cols())
            .ok_or_else(|| DatasetError::DetectionShape(format!("no usable box in {origin}")))?;
        let bbox = detections.bbox(center_idx)
            .ok_or_else(|| DatasetError::DetectionShape(format!("box #{center_idx} missing in {origin}")))?;
        debug!(
            "{origin}: {} faces, using #{center_idx} with score {:.3}",
            detections.len(),
            detections.score(center_idx).unwrap_or(f32::NAN)
        );

        let cropped_face = self.models.aligner.align_crop(
            img,
            bbox,
            detections.keypoints(center_idx),
            self.image_size,
        )?;
        let image = convert_mat_to_normalized_ndarray(&cropped_face)?;

        let landmarks = self.models.landmarks
            .get_landmarks(img)?
            .into_iter()
            .next()
            .ok_or_else(|| DatasetError::NoLandmarks { image: origin.to_string() })?;

        Ok(Some(ProcessedFace { image, landmarks }))
    }
}
