use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use anyhow::Error;
use ndarray::{s, Array1, Array2, ArrayD, ArrayView1};
use ndarray_npy::NpzReader;
use crate::error::DatasetError;

const POSE_LEN: usize = 9;

/// Raw FLAME parameters of one actor as stored in its `.npz` archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeParams {
    pub pose: Array1<f32>,
    pub betas: Array1<f32>,
}

/// FLAME coefficients replicated along a leading batch axis.
#[derive(Debug, Clone, PartialEq)]
pub struct FlameParams {
    pub shape_params: Array2<f32>,
    pub expression_params: Array2<f32>,
    pub pose_params: Array2<f32>,
}

impl ShapeParams {

    /// load reads the `pose` and `betas` arrays of an actor.
    ///
    /// # Arguments
    /// * `path` - path of the `.npz` parameter archive
    ///
    /// # Returns
    /// * `Result<ShapeParams, Error>`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let missing = |reason: String| DatasetError::ParamsMissing {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| missing(e.to_string()))?;
        let mut npz = NpzReader::new(file).map_err(|e| missing(e.to_string()))?;
        let pose = read_float_array(&mut npz, "pose").map_err(|e| missing(e.to_string()))?;
        let betas = read_float_array(&mut npz, "betas").map_err(|e| missing(e.to_string()))?;

        Ok(ShapeParams { pose, betas })
    }

    /// build_shape_block splits the betas into shape and expression coefficients, keeps the
    /// global and jaw rotations of the pose, and stacks each of them `k` times.
    ///
    /// # Arguments
    /// * `k` - batch size
    /// * `n_shape` - number of leading betas that are shape coefficients
    ///
    /// # Returns
    /// * `Result<FlameParams, Error>`
    pub fn build_shape_block(&self, k: usize, n_shape: usize) -> Result<FlameParams, Error> {
        if self.betas.len() < n_shape {
            return Err(DatasetError::ParamsShape {
                field: "betas",
                expected: n_shape,
                actual: self.betas.len(),
            }.into())
        }
        if self.pose.len() < POSE_LEN {
            return Err(DatasetError::ParamsShape {
                field: "pose",
                expected: POSE_LEN,
                actual: self.pose.len(),
            }.into())
        }

        let shape = self.betas.slice(s![..n_shape]);
        let expression = self.betas.slice(s![n_shape..]);
        let pose: Array1<f32> = self.pose
            .slice(s![0..3])
            .iter()
            .chain(self.pose.slice(s![6..9]).iter())
            .cloned()
            .collect();

        Ok(FlameParams {
            shape_params: replicate(shape, k),
            expression_params: replicate(expression, k),
            pose_params: replicate(pose.view(), k),
        })
    }
}

fn replicate(row: ArrayView1<f32>, k: usize) -> Array2<f32> {
    Array2::from_shape_fn((k, row.len()), |(_, j)| row[j])
}

// Archives written by numpy name their entries `<key>.npy`; accept both spellings and
// both float widths.
fn read_float_array<R: Read + Seek>(npz: &mut NpzReader<R>, key: &str) -> Result<Array1<f32>, Error> {
    let candidates = [key.to_string(), format!("{key}.npy")];
    let mut last_error: Option<Error> = None;

    for name in &candidates {
        match npz.by_name::<ndarray::OwnedRepr<f32>, ndarray::IxDyn>(name) {
            Ok(array) => return Ok(flatten(array)),
            Err(e) => last_error = Some(e.into()),
        }
        match npz.by_name::<ndarray::OwnedRepr<f64>, ndarray::IxDyn>(name) {
            Ok(array) => return Ok(flatten(array.mapv(|x| x as f32))),
            Err(e) => last_error = Some(e.into()),
        }
    }
    Err(last_error.unwrap_or_else(|| Error::msg(format!("array `{key}` not found"))))
}

fn flatten(array: ArrayD<f32>) -> Array1<f32> {
    array.iter().cloned().collect()
}
