pub mod utils;
pub mod error;
pub mod config;
pub mod catalog;
pub mod sampler;
pub mod flame;
pub mod helper;
pub mod modules;
pub mod pipeline;
pub mod dataset;
pub mod loader;

pub use crate::config::config::DatasetConfig;
pub use crate::dataset::dataset::FaceDataset;
pub use crate::dataset::sample::Sample;
pub use crate::error::DatasetError;
pub use crate::loader::loader::DataLoader;
pub use crate::pipeline::pipeline::FaceModels;
