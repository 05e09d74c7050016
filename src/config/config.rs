use std::fs;
use std::path::{Path, PathBuf};
use anyhow::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatasetConfig {
    pub k: usize,
    pub dataset_root: String,
    pub image_folder: String,
    pub flame_folder: String,
    pub catalog_folder: String,
    pub image_size: i32,
    pub n_shape: usize,
    pub eval_max_k: usize,
    pub bbox_fallback: bool,
    pub seed: Option<u64>,
}

impl DatasetConfig {
    pub fn new() -> Self {
        DatasetConfig {
            k: 4,
            dataset_root: "dataset".to_string(),
            image_folder: "images".to_string(),
            flame_folder: "FLAME_parameters".to_string(),
            catalog_folder: "image_paths".to_string(),
            image_size: 224,
            n_shape: 300,
            eval_max_k: 200,
            bbox_fallback: true,
            seed: None,
        }
    }

    /// from_json_file reads a dataset configuration, missing fields take their default values.
    ///
    /// # Arguments
    /// * `path` - path of the JSON file
    ///
    /// # Returns
    /// * `Result<DatasetConfig, Error>`
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: DatasetConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// The catalog of a dataset is keyed by its upper-cased name.
    pub fn catalog_path(&self, name: &str) -> PathBuf {
        Path::new(&self.dataset_root)
            .join(&self.catalog_folder)
            .join(format!("{}.json", name.to_uppercase()))
    }

    pub fn image_dir(&self, name: &str) -> PathBuf {
        Path::new(&self.dataset_root).join(name).join(&self.image_folder)
    }

    pub fn flame_dir(&self, name: &str) -> PathBuf {
        Path::new(&self.dataset_root).join(name).join(&self.flame_folder)
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig::new()
    }
}
