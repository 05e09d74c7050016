use std::sync::Arc;
use anyhow::Error;
use log::debug;
use tokio::task::JoinHandle;
use crate::dataset::dataset::FaceDataset;
use crate::dataset::sample::Sample;

/// DataLoader issues independent sample requests against a shared dataset.
///
/// Every request runs the whole blocking pipeline on tokio's blocking pool with its own
/// random draw; the dataset and its models are only read. The draws of a batch are forked
/// up front in request order, so a seeded dataset yields the same batch on every run.
#[derive(Clone)]
pub struct DataLoader {
    dataset: Arc<FaceDataset>,
    batch_size: usize,
}

impl DataLoader {
    pub fn new(dataset: Arc<FaceDataset>, batch_size: usize) -> Self {
        DataLoader {
            dataset,
            batch_size: batch_size.max(1),
        }
    }

    pub fn dataset(&self) -> &FaceDataset {
        &self.dataset
    }

    /// epoch_batches splits the actor indices of one epoch into batches.
    ///
    /// # Returns
    /// * `Result<Vec<Vec<usize>>, Error>`
    pub fn epoch_batches(&self) -> Result<Vec<Vec<usize>>, Error> {
        let indices = self.dataset.epoch_indices()?;
        Ok(indices.chunks(self.batch_size).map(|chunk| chunk.to_vec()).collect())
    }

    /// load_batch builds the samples of `indices` concurrently.
    ///
    /// # Arguments
    /// * `indices` - actor indices
    ///
    /// # Returns
    /// * `Result<Vec<Sample>, Error>` - samples in the order of `indices`
    pub async fn load_batch(&self, indices: &[usize]) -> Result<Vec<Sample>, Error> {
        debug!("[{}] loading batch {:?}", self.dataset.name(), indices);
        let rngs = self.dataset.fork_rngs(indices.len())?;
        let handles: Vec<JoinHandle<Result<Sample, Error>>> = indices
            .iter()
            .zip(rngs)
            .map(|(&index, mut rng)| {
                let dataset = Arc::clone(&self.dataset);
                tokio::task::spawn_blocking(move || dataset.get_item_with_rng(index, &mut rng))
            })
            .collect();

        let mut samples: Vec<Sample> = Vec::with_capacity(handles.len());
        for handle in handles {
            samples.push(handle.await??);
        }
        Ok(samples)
    }
}
