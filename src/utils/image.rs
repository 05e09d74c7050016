use std::path::Path;
use anyhow::Error;
use ndarray::Array3;
use opencv::core::{Mat, MatTraitConst, Vec3b};
use opencv::imgcodecs::{imread, IMREAD_COLOR};
use crate::error::DatasetError;

/// read_image decodes an image file into a BGR matrix.
///
/// # Arguments
/// * `path` - path of the image
///
/// # Returns
/// * `Result<Mat, Error>`
pub fn read_image<P: AsRef<Path>>(path: P) -> Result<Mat, Error> {
    let path = path.as_ref();
    let filename = path.to_str().ok_or(DatasetError::ImageUnreadable { path: path.to_path_buf() })?;
    let img = imread(filename, IMREAD_COLOR)?;
    if img.empty() {
        return Err(DatasetError::ImageUnreadable { path: path.to_path_buf() }.into())
    }
    Ok(img)
}

/// convert_mat_to_normalized_ndarray copies an 8-bit, 3-channel matrix into a
/// `(rows, cols, 3)` array scaled to `[0, 1]`, channel order unchanged.
pub fn convert_mat_to_normalized_ndarray(img: &Mat) -> Result<Array3<f32>, Error> {
    let rows = img.rows() as usize;
    let cols = img.cols() as usize;
    let mut im_tensor = Array3::<f32>::zeros((rows, cols, 3usize));

    for y in 0..rows {
        for x in 0..cols {
            let pixel = img.at_2d::<Vec3b>(y as i32, x as i32)?;
            for c in 0..3 {
                im_tensor[[y, x, c]] = pixel[c] as f32 / 255.0;
            }
        }
    }
    Ok(im_tensor)
}
