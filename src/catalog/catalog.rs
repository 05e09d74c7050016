use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::Error;
use log::info;
use serde_json::{Map, Value};
use crate::error::DatasetError;

/// Images and parameter file of one actor, paths as stored in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorEntry {
    pub images: Vec<String>,
    pub params_path: String,
}

/// Catalog maps every actor to its images and its FLAME parameter file.
///
/// Actors keep the order of the catalog file, so an actor index is stable across runs.
#[derive(Debug, Clone)]
pub struct Catalog {
    actors: Vec<String>,
    entries: HashMap<String, ActorEntry>,
    min_k: usize,
    max_k: usize,
    total_images: usize,
}

impl Catalog {

    /// load reads the cached actor list of a dataset.
    ///
    /// # Arguments
    /// * `path` - path of the JSON catalog, `{"actor": [["actor/img.jpg", ...], "actor.npz"]}`
    ///
    /// # Returns
    /// * `Result<Catalog, Error>`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| DatasetError::CatalogMissing {
            path: path.to_path_buf(),
            source,
        })?;
        Catalog::from_json_str(&raw, path)
    }

    pub fn from_json_str(raw: &str, origin: &Path) -> Result<Self, Error> {
        let malformed = |reason: String| DatasetError::CatalogMalformed {
            path: PathBuf::from(origin),
            reason,
        };

        let map: Map<String, Value> = serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;

        let mut entries: Vec<(String, ActorEntry)> = Vec::with_capacity(map.len());
        for (actor, value) in map {
            let (images, params_path): (Vec<String>, String) = serde_json::from_value(value)
                .map_err(|e| malformed(format!("actor {actor}: {e}")))?;
            entries.push((actor, ActorEntry { images, params_path }));
        }
        Catalog::from_entries(entries)
    }

    /// from_entries validates the actors and computes the per-actor image statistics.
    pub fn from_entries(entries: Vec<(String, ActorEntry)>) -> Result<Self, Error> {
        if entries.is_empty() {
            return Err(DatasetError::EmptyCatalog.into())
        }

        let mut actors: Vec<String> = Vec::with_capacity(entries.len());
        let mut map: HashMap<String, ActorEntry> = HashMap::with_capacity(entries.len());
        let mut min_k = usize::MAX;
        let mut max_k = 0usize;
        let mut total_images = 0usize;

        for (actor, entry) in entries {
            if map.contains_key(&actor) {
                return Err(DatasetError::DuplicateActor { actor }.into())
            }
            let count = entry.images.len();
            if count == 0 {
                return Err(DatasetError::EmptyActor { actor }.into())
            }
            min_k = min_k.min(count);
            max_k = max_k.max(count);
            total_images += count;

            actors.push(actor.clone());
            map.insert(actor, entry);
        }

        Ok(Catalog {
            actors,
            entries: map,
            min_k,
            max_k,
            total_images,
        })
    }

    pub fn log_summary(&self, name: &str) {
        info!(
            "Dataset {} with min K = {} max K = {} length = {} total images = {}",
            name, self.min_k, self.max_k, self.actors.len(), self.total_images
        );
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn actors(&self) -> &[String] {
        &self.actors
    }

    pub fn actor(&self, index: usize) -> Result<(&str, &ActorEntry), Error> {
        let actor = self.actors.get(index).ok_or(DatasetError::ActorIndexOutOfRange {
            index,
            len: self.actors.len(),
        })?;
        let entry = self.entries.get(actor).ok_or_else(|| Error::msg(format!("catalog lost actor {actor}")))?;
        Ok((actor.as_str(), entry))
    }

    pub fn get(&self, actor: &str) -> Option<&ActorEntry> {
        self.entries.get(actor)
    }

    /// Smallest number of images of any actor.
    pub fn min_k(&self) -> usize {
        self.min_k
    }

    /// Largest number of images of any actor.
    pub fn max_k(&self) -> usize {
        self.max_k
    }

    pub fn total_images(&self) -> usize {
        self.total_images
    }
}

/// strip_actor_prefix drops the leading actor directory of a catalog image path.
pub fn strip_actor_prefix(path: &str) -> &str {
    match path.split_once('/') {
        Some((_, rest)) => rest,
        None => path,
    }
}
