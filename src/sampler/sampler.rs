use anyhow::Error;
use ndarray_rand::rand::seq::index;
use ndarray_rand::rand::Rng;
use crate::error::DatasetError;

/// Sampler picks which images of an actor go into one draw.
///
/// Evaluation ignores the configured K: it always takes the first `min(min_k, eval_max_k)`
/// images so evaluation draws are reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct Sampler {
    k: usize,
    is_eval: bool,
    eval_k: usize,
}

impl Sampler {
    pub fn new(k: usize, is_eval: bool, min_k: usize, eval_max_k: usize) -> Self {
        Sampler {
            k,
            is_eval,
            eval_k: min_k.min(eval_max_k),
        }
    }

    /// Number of images a draw asks for, the batch size of the replicated FLAME parameters.
    pub fn sample_size(&self) -> usize {
        if self.is_eval {
            self.eval_k
        } else {
            self.k
        }
    }

    pub fn is_eval(&self) -> bool {
        self.is_eval
    }

    /// select_indices returns the image indices of one draw.
    ///
    /// # Arguments
    /// * `actor` - actor name, used for error reporting
    /// * `available` - number of images of the actor
    /// * `rng` - random source for training draws
    ///
    /// # Returns
    /// * `Result<Vec<usize>, Error>`
    pub fn select_indices<R: Rng + ?Sized>(&self, actor: &str, available: usize, rng: &mut R) -> Result<Vec<usize>, Error> {
        if self.is_eval {
            return Ok((0..self.eval_k.min(available)).collect())
        }

        if self.k > available {
            return Err(DatasetError::NotEnoughImages {
                actor: actor.to_string(),
                requested: self.k,
                available,
            }.into())
        }
        Ok(index::sample(rng, available, self.k).into_vec())
    }
}
