use std::path::{Path, PathBuf};

use crate::dataset::annotations::{AnnotatedSet, Sample};
use crate::dataset::DatasetLoader;
use crate::error::DatasetError;

/// PASCAL VOC split read from `VOCdevkit/VOC20<yy>/`.
#[derive(Debug, Clone)]
pub struct VocLoader {
    name: String,
    year: String,
    segmentation: bool,
    year_dir: PathBuf,
    set: AnnotatedSet,
}

impl VocLoader {
    /// `year` is the two-digit form (`"07"`, `"12"`).
    pub fn new(
        dataset_root: &Path,
        year: &str,
        split: &str,
        segmentation: bool,
    ) -> Result<Self, DatasetError> {
        let year_dir = dataset_root.join("VOCdevkit").join(format!("VOC20{year}"));
        let annotations = year_dir
            .join("annotations")
            .join(format!("voc_20{year}_{split}.json"));
        let set = AnnotatedSet::from_file(&annotations)?;
        tracing::info!(
            year,
            split,
            segmentation,
            images = set.samples.len(),
            classes = set.class_names.len(),
            "Loaded VOC annotations from {}",
            annotations.display()
        );
        Ok(VocLoader {
            name: format!("voc{year}_{split}"),
            year: year.to_string(),
            segmentation,
            year_dir,
            set,
        })
    }
}

impl DatasetLoader for VocLoader {
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
        self.year_dir.join("JPEGImages").join(&sample.file_name)
    }

    fn segmentation_path(&self, sample: &Sample) -> Option<PathBuf> {
        self.segmentation.then(|| {
            self.year_dir
                .join("SegmentationClassRaw")
                .join(format!("{}.png", sample.stem()))
        })
    }

    fn uses_07_metric(&self) -> bool {
        self.year == "07"
    }
}
