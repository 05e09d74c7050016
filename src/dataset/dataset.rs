use std::path::PathBuf;
use std::sync::Mutex;
use anyhow::Error;
use log::{debug, info, warn};
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::seq::SliceRandom;
use ndarray_rand::rand::{Rng, SeedableRng};
use crate::catalog::catalog::{strip_actor_prefix, ActorEntry, Catalog};
use crate::config::config::DatasetConfig;
use crate::dataset::sample::{build_sample, Sample};
use crate::error::DatasetError;
use crate::flame::flame::ShapeParams;
use crate::pipeline::pipeline::{FaceModels, FacePipeline, ProcessedFace};
use crate::sampler::sampler::Sampler;

/// FaceDataset serves one sample per actor: a draw of the actor's face crops with the
/// landmarks and FLAME parameters that go with them.
///
/// The catalog and the models are read-only after construction, so a dataset can be
/// shared between threads behind an `Arc`.
pub struct FaceDataset {
    name: String,
    config: DatasetConfig,
    catalog: Catalog,
    sampler: Sampler,
    pipeline: FacePipeline,
    rng: Mutex<StdRng>,
}

impl FaceDataset {

    /// new loads the cached actor list of a dataset and wires the face models.
    ///
    /// # Arguments
    /// * `name` - dataset name, also the folder under the dataset root
    /// * `config` - dataset configuration
    /// * `is_eval` - evaluation mode, deterministic draws
    /// * `models` - detector, aligner and landmark models shared by all samples
    ///
    /// # Returns
    /// * `Result<FaceDataset, Error>`
    pub fn new(name: &str, config: DatasetConfig, is_eval: bool, models: FaceModels) -> Result<Self, Error> {
        info!("[{name}] Initialization");
        if config.image_size <= 0 {
            return Err(DatasetError::InvalidConfig(format!(
                "image_size must be positive, got {}",
                config.image_size
            )).into())
        }
        let catalog_path = config.catalog_path(name);
        info!("[{name}] Load cached file list: {}", catalog_path.display());

        let catalog = Catalog::load(&catalog_path)?;
        info!("[Dataset {name}] Total {} actors loaded!", catalog.len());
        catalog.log_summary(name);

        let sampler = Sampler::new(config.k, is_eval, catalog.min_k(), config.eval_max_k);
        let pipeline = FacePipeline::new(models, config.image_size);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(FaceDataset {
            name: name.to_string(),
            config,
            catalog,
            sampler,
            pipeline,
            rng: Mutex::new(rng),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_eval(&self) -> bool {
        self.sampler.is_eval()
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    pub fn actors(&self) -> &[String] {
        self.catalog.actors()
    }

    pub fn min_k(&self) -> usize {
        self.catalog.min_k()
    }

    pub fn max_k(&self) -> usize {
        self.catalog.max_k()
    }

    pub fn total_images(&self) -> usize {
        self.catalog.total_images()
    }

    /// Number of FLAME parameter rows in every sample.
    pub fn sample_size(&self) -> usize {
        self.sampler.sample_size()
    }

    /// image_paths resolves the on-disk images of an actor.
    pub fn image_paths(&self, actor: &str) -> Option<Vec<PathBuf>> {
        self.catalog.get(actor).map(|entry| self.resolve_images(entry))
    }

    fn resolve_images(&self, entry: &ActorEntry) -> Vec<PathBuf> {
        let image_dir = self.config.image_dir(&self.name);
        entry.images
            .iter()
            .map(|path| image_dir.join(strip_actor_prefix(path)))
            .collect()
    }

    /// Actor indices of one epoch, shuffled in training mode.
    pub fn epoch_indices(&self) -> Result<Vec<usize>, Error> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        if !self.is_eval() {
            let mut rng = self.rng.lock().map_err(|_| Error::msg("dataset random source poisoned"))?;
            indices.shuffle(&mut *rng);
        }
        Ok(indices)
    }

    /// fork_rngs derives `n` child generators from the dataset's random source, in order.
    ///
    /// The source is locked once, so with a fixed seed the i-th child is the same whatever
    /// other requests run concurrently.
    pub fn fork_rngs(&self, n: usize) -> Result<Vec<StdRng>, Error> {
        let mut parent = self.rng.lock().map_err(|_| Error::msg("dataset random source poisoned"))?;
        (0..n)
            .map(|_| StdRng::from_rng(&mut *parent).map_err(Error::from))
            .collect()
    }

    /// get_item builds the sample of an actor with the dataset's own random source.
    ///
    /// # Arguments
    /// * `index` - actor index
    ///
    /// # Returns
    /// * `Result<Sample, Error>`
    pub fn get_item(&self, index: usize) -> Result<Sample, Error> {
        let mut rng = self.fork_rngs(1)?
            .pop()
            .ok_or_else(|| Error::msg("dataset random source yielded no generator"))?;
        self.get_item_with_rng(index, &mut rng)
    }

    /// get_item_with_rng builds the sample of an actor, drawing images from `rng`.
    ///
    /// Images without a detected face are dropped, so the sample may hold fewer faces than
    /// the FLAME parameters have rows, or none at all.
    ///
    /// # Arguments
    /// * `index` - actor index
    /// * `rng` - random source for the training draw
    ///
    /// # Returns
    /// * `Result<Sample, Error>`
    pub fn get_item_with_rng<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Sample, Error> {
        let (actor, entry) = self.catalog.actor(index)?;
        let images = self.resolve_images(entry);
        let sample_list = self.sampler.select_indices(actor, images.len(), rng)?;
        debug!("[{}] {actor}: sampled images {:?}", self.name, sample_list);

        let params_path = self.config.flame_dir(&self.name).join(&entry.params_path);
        let flame = ShapeParams::load(&params_path)?
            .build_shape_block(self.sampler.sample_size(), self.config.n_shape)?;

        let faces: Vec<ProcessedFace> = sample_list
            .iter()
            .map(|&i| self.pipeline.process_image(&images[i]))
            .filter_map(Result::transpose)
            .collect::<Result<_, Error>>()?;

        if faces.is_empty() {
            warn!("[{}] {actor}: no face detected in any of {} sampled images", self.name, sample_list.len());
        }

        build_sample(actor, &self.name, faces, flame, self.pipeline.image_size() as usize)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs::{self, File};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use anyhow::Error;
    use ndarray::{Array1, Array2};
    use ndarray_npy::NpzWriter;
    use ndarray_rand::rand::rngs::StdRng;
    use ndarray_rand::rand::SeedableRng;
    use opencv::core::{Mat, MatTraitConst, Scalar, Vec3b, Vector, CV_8UC3};
    use opencv::imgcodecs::imwrite;
    use crate::config::config::DatasetConfig;
    use crate::dataset::dataset::FaceDataset;
    use crate::error::DatasetError;
    use crate::modules::face_detection::{Detections, FaceDetector};
    use crate::modules::face_landmark::LandmarkDetector;
    use crate::pipeline::pipeline::tests::{two_faces, FixedDetector, FixedLandmarks, RecordingAligner};
    use crate::pipeline::pipeline::FaceModels;
    use crate::sampler::sampler::Sampler;

    pub(crate) const NAME: &str = "testset";

    /// Gray level of image `i` of the `actor_idx`-th fixture actor; every image differs.
    pub(crate) fn pixel_value(actor_idx: usize, i: usize) -> u8 {
        (40 + 20 * actor_idx + 5 * i) as u8
    }

    fn first_pixel(img: &Mat) -> Result<u8, Error> {
        Ok(img.at_2d::<Vec3b>(0, 0)?[0])
    }

    /// Detector finding no face in images whose gray level is listed in `blind`.
    pub(crate) struct PixelDetector {
        pub blind: Vec<u8>,
    }

    impl FaceDetector for PixelDetector {
        fn detect(&self, img: &Mat) -> Result<Detections, Error> {
            if self.blind.contains(&first_pixel(img)?) {
                return Ok(Detections::empty())
            }
            Ok(two_faces())
        }
    }

    /// Landmark model whose single point set is filled with the image's gray level.
    pub(crate) struct PixelLandmarks;

    impl LandmarkDetector for PixelLandmarks {
        fn get_landmarks(&self, img: &Mat) -> Result<Vec<Array2<f32>>, Error> {
            Ok(vec![Array2::from_elem((68, 2), first_pixel(img)? as f32)])
        }
    }

    pub(crate) fn pixel_models(blind: Vec<u8>) -> FaceModels {
        FaceModels::new(
            Arc::new(PixelDetector { blind }),
            Arc::new(RecordingAligner::new()),
            Arc::new(PixelLandmarks),
        )
    }

    /// Writes a dataset with actors `m01` (3 images), `f02` (2 images) and `m03` (4 images).
    pub(crate) fn fixture(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("flame-dataset-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let image_dir = root.join(NAME).join("images");
        let flame_dir = root.join(NAME).join("FLAME_parameters");
        fs::create_dir_all(root.join("image_paths")).unwrap();
        fs::create_dir_all(&image_dir).unwrap();
        fs::create_dir_all(&flame_dir).unwrap();

        let actors = [("m01", 3usize), ("f02", 2), ("m03", 4)];
        let mut catalog = serde_json::Map::new();
        for (actor_idx, (actor, count)) in actors.into_iter().enumerate() {
            let images: Vec<String> = (0..count).map(|i| format!("{actor}/{actor}_{i}.png")).collect();
            for (i, image) in images.iter().enumerate() {
                let gray = pixel_value(actor_idx, i) as f64;
                let img = Mat::new_rows_cols_with_default(100, 100, CV_8UC3, Scalar::all(gray)).unwrap();
                let path = image_dir.join(image.split_once('/').unwrap().1);
                imwrite(path.to_str().unwrap(), &img, &Vector::new()).unwrap();
            }
            write_params(&flame_dir.join(format!("{actor}.npz")), 310);
            catalog.insert(actor.to_string(), serde_json::json!([images, format!("{actor}.npz")]));
        }
        fs::write(
            root.join("image_paths").join(format!("{}.json", NAME.to_uppercase())),
            serde_json::to_string(&catalog).unwrap(),
        ).unwrap();
        root
    }

    pub(crate) fn write_params(path: &Path, n_betas: usize) {
        let mut npz = NpzWriter::new(File::create(path).unwrap());
        npz.add_array("pose", &Array2::<f32>::from_shape_fn((1, 15), |(_, j)| j as f32)).unwrap();
        npz.add_array("betas", &Array1::<f32>::from_elem(n_betas, 0.25)).unwrap();
        npz.finish().unwrap();
    }

    pub(crate) fn config(root: &Path, k: usize) -> DatasetConfig {
        let mut config = DatasetConfig::new();
        config.dataset_root = root.to_str().unwrap().to_string();
        config.k = k;
        config.seed = Some(5);
        config
    }

    pub(crate) fn models(detections: Detections) -> FaceModels {
        FaceModels::new(
            Arc::new(FixedDetector(detections)),
            Arc::new(RecordingAligner::new()),
            Arc::new(FixedLandmarks { faces: 1 }),
        )
    }

    #[test]
    fn test_statistics() {
        let root = fixture("stats");
        let dataset = FaceDataset::new(NAME, config(&root, 2), false, models(two_faces())).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.actors(), &["m01", "f02", "m03"]);
        assert_eq!((dataset.min_k(), dataset.max_k(), dataset.total_images()), (2, 4, 9));

        let paths = dataset.image_paths("m03").unwrap();
        assert_eq!(paths.len(), 4);
        assert!(paths.iter().all(|p| p.exists()));
        assert_eq!(paths[0], root.join(NAME).join("images").join("m03_0.png"));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_training_sample() {
        let root = fixture("train");
        let dataset = FaceDataset::new(NAME, config(&root, 2), false, models(two_faces())).unwrap();
        let sample = dataset.get_item(2).unwrap();

        assert_eq!(sample.imagename, "m03");
        assert_eq!(sample.dataset, NAME);
        assert_eq!(sample.images.dim(), (2, 224, 224, 3));
        assert_eq!(sample.landmark.dim(), (2, 68, 2));
        assert_eq!(sample.flame.shape_params.dim(), (2, 300));
        assert_eq!(sample.flame.expression_params.dim(), (2, 10));
        assert_eq!(sample.flame.pose_params.row(1).to_vec(), vec![0.0, 1.0, 2.0, 6.0, 7.0, 8.0]);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_training_k_exceeds_images() {
        let root = fixture("toomany");
        let dataset = FaceDataset::new(NAME, config(&root, 3), false, models(two_faces())).unwrap();
        assert!(dataset.get_item(0).is_ok());
        let err = dataset.get_item(1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::NotEnoughImages { requested: 3, available: 2, .. })
        ));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_eval_samples_are_deterministic() {
        let root = fixture("eval");
        let dataset = FaceDataset::new(NAME, config(&root, 50), true, models(two_faces())).unwrap();
        assert_eq!(dataset.sample_size(), 2);

        let first = dataset.get_item(2).unwrap();
        let second = dataset.get_item_with_rng(2, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(first.images.shape()[0], 2);
        assert_eq!(first.flame.shape_params.dim(), (2, 300));
        assert_eq!(first, second);
        assert_eq!(dataset.epoch_indices().unwrap(), vec![0, 1, 2]);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_no_detection_gives_empty_sample() {
        let root = fixture("empty");
        let dataset = FaceDataset::new(NAME, config(&root, 3), false, models(Detections::empty())).unwrap();
        let sample = dataset.get_item(0).unwrap();
        assert_eq!(sample.images.shape()[0], 0);
        assert_eq!(sample.landmark.shape()[0], 0);
        assert_eq!(sample.flame.shape_params.dim(), (3, 300));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_dropped_images_keep_sampled_order() {
        let root = fixture("partial");
        // m03 is actor 2 with gray levels 80, 85, 90, 95
        let blind = vec![pixel_value(2, 1), pixel_value(2, 3)];
        let dataset = FaceDataset::new(NAME, config(&root, 4), false, pixel_models(blind.clone())).unwrap();

        let drawn = Sampler::new(4, false, dataset.min_k(), 200)
            .select_indices("m03", 4, &mut StdRng::seed_from_u64(17))
            .unwrap();
        let expected: Vec<f32> = drawn
            .iter()
            .map(|&i| pixel_value(2, i))
            .filter(|gray| !blind.contains(gray))
            .map(f32::from)
            .collect();

        let sample = dataset.get_item_with_rng(2, &mut StdRng::seed_from_u64(17)).unwrap();
        assert_eq!(sample.len(), 2);
        assert!(sample.len() < dataset.sample_size());
        assert_eq!(sample.images.dim(), (2, 224, 224, 3));
        let kept: Vec<f32> = (0..sample.len()).map(|i| sample.landmark[[i, 0, 0]]).collect();
        assert_eq!(kept, expected);
        assert_eq!(sample.flame.shape_params.dim(), (4, 300));
        assert_eq!(sample.flame.pose_params.nrows(), 4);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_fork_rngs_follow_seed() {
        let root = fixture("fork");
        let first = FaceDataset::new(NAME, config(&root, 2), false, pixel_models(vec![])).unwrap();
        let second = FaceDataset::new(NAME, config(&root, 2), false, pixel_models(vec![])).unwrap();
        let mut a = first.fork_rngs(3).unwrap();
        let mut b = second.fork_rngs(3).unwrap();
        for (x, y) in a.iter_mut().zip(b.iter_mut()) {
            assert_eq!(first.get_item_with_rng(2, x).unwrap(), second.get_item_with_rng(2, y).unwrap());
        }
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_non_positive_image_size() {
        let root = std::env::temp_dir().join(format!("flame-dataset-size-{}", std::process::id()));
        for size in [0, -1] {
            let mut bad = config(&root, 1);
            bad.image_size = size;
            let err = FaceDataset::new(NAME, bad, false, models(two_faces())).err().unwrap();
            assert!(matches!(err.downcast_ref::<DatasetError>(), Some(DatasetError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_missing_catalog() {
        let root = std::env::temp_dir().join(format!("flame-dataset-none-{}", std::process::id()));
        let err = FaceDataset::new(NAME, config(&root, 1), false, models(two_faces())).err().unwrap();
        assert!(matches!(err.downcast_ref::<DatasetError>(), Some(DatasetError::CatalogMissing { .. })));
    }

    #[test]
    fn test_missing_and_short_params() {
        let root = fixture("params");
        let flame_dir = root.join(NAME).join("FLAME_parameters");
        fs::remove_file(flame_dir.join("m01.npz")).unwrap();
        write_params(&flame_dir.join("f02.npz"), 200);

        let dataset = FaceDataset::new(NAME, config(&root, 1), false, models(two_faces())).unwrap();
        let err = dataset.get_item(0).unwrap_err();
        assert!(matches!(err.downcast_ref::<DatasetError>(), Some(DatasetError::ParamsMissing { .. })));
        let err = dataset.get_item(1).unwrap_err();
        assert!(matches!(err.downcast_ref::<DatasetError>(), Some(DatasetError::ParamsShape { field: "betas", .. })));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_epoch_indices_permute_actors() {
        let root = fixture("epoch");
        let dataset = FaceDataset::new(NAME, config(&root, 1), false, models(two_faces())).unwrap();
        let mut indices = dataset.epoch_indices().unwrap();
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2]);
        fs::remove_dir_all(root).unwrap();
    }
}
