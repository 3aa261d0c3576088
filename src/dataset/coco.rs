use std::path::{Path, PathBuf};

use crate::dataset::annotations::{AnnotatedSet, Sample};
use crate::dataset::DatasetLoader;
use crate::error::DatasetError;

/// MS COCO split read from `coco/annotations/instances_<split>.json`.
#[derive(Debug, Clone)]
pub struct CocoLoader {
    name: String,
    image_dir: PathBuf,
    set: AnnotatedSet,
}

impl CocoLoader {
    pub fn new(dataset_root: &Path, split: &str) -> Result<Self, DatasetError> {
        let coco_dir = dataset_root.join("coco");
        let annotations = coco_dir
            .join("annotations")
            .join(format!("instances_{split}.json"));
        let set = AnnotatedSet::from_file(&annotations)?;
        tracing::info!(
            split,
            images = set.samples.len(),
            classes = set.class_names.len(),
            "Loaded COCO annotations from {}",
            annotations.display()
        );
        Ok(CocoLoader {
            name: format!("coco_{split}"),
            image_dir: coco_dir.join(split),
            set,
        })
    }
}

impl DatasetLoader for CocoLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn class_names(&self) -> &[String] {
        &self.set.class_names
    }

    fn samples(&self) -> &[Sample] {
        &self.set.samples
    }

    fn image_path(&self, sample: &Sample) -> PathBuf {
        self.image_dir.join(&sample.file_name)
    }
}
