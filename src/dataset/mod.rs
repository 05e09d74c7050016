pub mod dataset;
pub mod sample;
