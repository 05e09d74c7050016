use anyhow::Error;
use nalgebra::Vector2;
use ndarray::{Array2, ArrayView2};
use opencv::calib3d::{estimate_affine_partial_2d, LMEDS};
use opencv::core::{BORDER_CONSTANT, Mat, MatTrait, MatTraitConst, Point2f, Scalar, Size, Vector, CV_64F};
use opencv::imgproc::{INTER_LINEAR, warp_affine};
use crate::error::DatasetError;
use crate::modules::face_align::FaceAligner;

/// NormCropAligner maps the five detected keypoints onto the ArcFace template and warps
/// the image into a square crop.
#[derive(Debug, Clone)]
pub struct NormCropAligner {
    face_template: Array2<f32>,
    bbox_fallback: bool,
}

impl NormCropAligner {

    /// new initializes the aligner with the 112x112 ArcFace template.
    ///
    /// # Arguments
    /// * `bbox_fallback` - crop around the bounding box when the face has no keypoints
    pub fn new(bbox_fallback: bool) -> Self {
        let face_template: Array2<f32> = Array2::<f32>::from(
            vec![
                [38.2946, 51.6963],
                [73.5318, 51.5014],
                [56.0252, 71.7366],
                [41.5493, 92.3655],
                [70.7299, 92.2041],
            ]
        );

        NormCropAligner {
            face_template,
            bbox_fallback,
        }
    }

    /// Template scaled to `size`; sizes that are not a multiple of 112 use the 128 layout.
    pub fn template_for(&self, size: i32) -> Array2<f32> {
        let (ratio, diff_x) = if size % 112 == 0 {
            (size as f32 / 112.0, 0.0)
        } else {
            let ratio = size as f32 / 128.0;
            (ratio, 8.0 * ratio)
        };

        let mut template = self.face_template.mapv(|x| x * ratio);
        template.column_mut(0).mapv_inplace(|x| x + diff_x);
        template
    }

    pub fn crop_from_keypoints(&self, img: &Mat, keypoints: ArrayView2<f32>, size: i32) -> Result<Mat, Error> {
        if keypoints.dim() != self.face_template.dim() {
            return Err(DatasetError::DetectionShape(format!(
                "keypoints have shape {:?}, expected {:?}",
                keypoints.dim(),
                self.face_template.dim()
            )).into())
        }
        let vec_lmk = array2_to_vector_of_point2f(keypoints);
        let template = self.template_for(size);
        let vec_face_template = array2_to_vector_of_point2f(template.view());
        let mut inliers = Mat::default();
        let affine_matrix = estimate_affine_partial_2d(
            &vec_lmk,
            &vec_face_template,
            &mut inliers,
            LMEDS,
            3.0,
            2000,
            0.99,
            10,
        )?;
        if affine_matrix.empty() {
            return Err(Error::msg("face_helper - cannot estimate the alignment transform"))
        }
        warp(img, &affine_matrix, size)
    }

    /// crop_from_bbox takes a square around the box center, its side the longer box side.
    pub fn crop_from_bbox(&self, img: &Mat, bbox: [f32; 4], size: i32) -> Result<Mat, Error> {
        let side = f32::max((bbox[2] - bbox[0]).abs(), (bbox[3] - bbox[1]).abs());
        if side <= 0.0 {
            return Err(Error::msg("face_helper - degenerate bounding box"))
        }
        let center = box_center(&bbox);
        let scale = size as f64 / side as f64;
        let half = size as f64 / 2.0;

        let mut affine_matrix = Mat::new_rows_cols_with_default(2, 3, CV_64F, Scalar::all(0.0))?;
        *affine_matrix.at_2d_mut::<f64>(0, 0)? = scale;
        *affine_matrix.at_2d_mut::<f64>(0, 2)? = half - scale * center.x as f64;
        *affine_matrix.at_2d_mut::<f64>(1, 1)? = scale;
        *affine_matrix.at_2d_mut::<f64>(1, 2)? = half - scale * center.y as f64;

        warp(img, &affine_matrix, size)
    }
}

impl FaceAligner for NormCropAligner {
    fn align_crop(&self, img: &Mat, bbox: [f32; 4], keypoints: Option<ArrayView2<f32>>, size: i32) -> Result<Mat, Error> {
        match keypoints {
            Some(kps) => self.crop_from_keypoints(img, kps, size),
            None if self.bbox_fallback => self.crop_from_bbox(img, bbox, size),
            None => Err(DatasetError::MissingKeypoints.into()),
        }
    }
}

fn warp(img: &Mat, affine_matrix: &Mat, size: i32) -> Result<Mat, Error> {
    let mut cropped_face = Mat::default();
    warp_affine(
        img,
        &mut cropped_face,
        affine_matrix,
        Size::new(size, size),
        INTER_LINEAR,
        BORDER_CONSTANT,
        Scalar::all(0.0),
    )?;
    Ok(cropped_face)
}

fn array2_to_vector_of_point2f(array: ArrayView2<f32>) -> Vector<Point2f> {
    let mut vec = Vector::new();
    for i in 0..array.nrows() {
        let point = Point2f::new(array[[i, 0]], array[[i, 1]]);
        vec.push(point);
    }
    vec
}

fn box_center(bbox: &[f32; 4]) -> Vector2<f32> {
    let dx = (bbox[2] - bbox[0]).abs() / 2.0;
    let dy = (bbox[3] - bbox[1]).abs() / 2.0;
    Vector2::new(bbox[0] + dx, bbox[1] + dy)
}

/// get_center_face returns the index of the box whose center is closest to the image center.
///
/// The reference point is `(h / 2, w / 2)` taken as `(x, y)`. Ties keep the earliest box.
/// Returns `None` when there are no boxes or the boxes have fewer than four columns.
///
/// # Arguments
/// * `boxes` - one `[x1, y1, x2, y2, ...]` row per face
/// * `h` - image height
/// * `w` - image width
///
/// # Returns
/// * `Option<usize>`
pub fn get_center_face(boxes: ArrayView2<f32>, h: i32, w: i32) -> Option<usize> {
    if boxes.ncols() < 4 {
        return None
    }
    let img_center = Vector2::new((h / 2) as f32, (w / 2) as f32);

    let mut center_idx: Option<usize> = None;
    let mut distance = f32::INFINITY;
    for (idx, row) in boxes.rows().into_iter().enumerate() {
        let face_center = box_center(&[row[0], row[1], row[2], row[3]]);
        let current = (face_center - img_center).norm();
        if center_idx.is_none() || current < distance {
            distance = current;
            center_idx = Some(idx);
        }
    }
    center_idx
}
