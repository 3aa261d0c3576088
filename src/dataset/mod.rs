//! Dataset selection and loaders for the evaluation splits.

mod annotations;
mod coco;
mod voc;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{GrayImage, RgbImage};

use crate::error::DatasetError;

pub use annotations::{AnnotatedSet, GtObject, Sample};
pub use coco::CocoLoader;
pub use voc::VocLoader;

/// Datasets that can be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DatasetKind {
    #[value(name = "voc07")]
    Voc07,
    #[value(name = "voc07+12")]
    Voc07Plus12,
    #[value(name = "voc12")]
    Voc12,
    #[value(name = "coco")]
    Coco,
}

/// Which loader to construct, with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderSpec {
    Voc {
        year: &'static str,
        split: &'static str,
        segmentation: bool,
    },
    Coco {
        split: String,
    },
}

impl LoaderSpec {
    /// Map dataset flags to a loader.
    ///
    /// Both VOC07 variants evaluate on the 2007 test split; models trained on
    /// 07+12 are still tested there. VOC12 uses the val split and is the only
    /// VOC choice that carries segmentation ground truth. `split` only
    /// matters for COCO.
    pub fn select(dataset: DatasetKind, split: &str, segment: bool) -> Self {
        match dataset {
            DatasetKind::Voc07 | DatasetKind::Voc07Plus12 => LoaderSpec::Voc {
                year: "07",
                split: "test",
                segmentation: false,
            },
            DatasetKind::Voc12 => LoaderSpec::Voc {
                year: "12",
                split: "val",
                segmentation: segment,
            },
            DatasetKind::Coco => LoaderSpec::Coco {
                split: split.to_string(),
            },
        }
    }

    pub fn open(&self, dataset_root: &Path) -> Result<Arc<dyn DatasetLoader>, DatasetError> {
        Ok(match self {
            LoaderSpec::Voc {
                year,
                split,
                segmentation,
            } => Arc::new(VocLoader::new(dataset_root, year, split, *segmentation)?),
            LoaderSpec::Coco { split } => Arc::new(CocoLoader::new(dataset_root, split)?),
        })
    }
}

/// Source of evaluation images and their ground truth.
pub trait DatasetLoader {
    /// Short identifier, e.g. `voc07_test`.
    fn name(&self) -> &str;

    /// Foreground class names; class index `i` is `class_names()[i - 1]`.
    fn class_names(&self) -> &[String];

    fn num_classes(&self) -> usize {
        self.class_names().len()
    }

    /// Evaluation samples in a stable order.
    fn samples(&self) -> &[Sample];

    fn image_path(&self, sample: &Sample) -> PathBuf;

    fn load_image(&self, sample: &Sample) -> Result<RgbImage, DatasetError> {
        let path = self.image_path(sample);
        let img = image::open(&path).map_err(|e| DatasetError::Image { path, source: e })?;
        Ok(img.to_rgb8())
    }

    /// Location of the raw class-index mask, when this split has one.
    fn segmentation_path(&self, _sample: &Sample) -> Option<PathBuf> {
        None
    }

    /// Ground-truth class-index mask (255 = ignore), if available.
    fn load_segmentation(&self, sample: &Sample) -> Result<Option<GrayImage>, DatasetError> {
        let Some(path) = self.segmentation_path(sample) else {
            return Ok(None);
        };
        let img = image::open(&path).map_err(|e| DatasetError::Image { path, source: e })?;
        Ok(Some(img.to_luma8()))
    }

    /// VOC2007 reports the 11-point interpolated AP.
    fn uses_07_metric(&self) -> bool {
        false
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::Path;

    use image::{GrayImage, Luma, Rgb, RgbImage};

    /// Write a two-image VOC2012-style split (one `person`, one `dog`) with
    /// images and raw segmentation masks under `root`.
    pub fn write_voc12_fixture(root: &Path) {
        let year_dir = root.join("VOCdevkit").join("VOC2012");
        fs::create_dir_all(year_dir.join("annotations")).unwrap();
        fs::create_dir_all(year_dir.join("JPEGImages")).unwrap();
        fs::create_dir_all(year_dir.join("SegmentationClassRaw")).unwrap();

        let json = r#"{
            "images": [
                {"id": 1, "file_name": "a.png", "width": 32, "height": 32},
                {"id": 2, "file_name": "b.png", "width": 32, "height": 32}
            ],
            "annotations": [
                {"image_id": 1, "category_id": 1, "bbox": [4, 4, 16, 16]},
                {"image_id": 2, "category_id": 2, "bbox": [8, 8, 20, 12]}
            ],
            "categories": [
                {"id": 1, "name": "person"},
                {"id": 2, "name": "dog"}
            ]
        }"#;
        fs::write(year_dir.join("annotations").join("voc_2012_val.json"), json).unwrap();

        for (name, class) in [("a", 1u8), ("b", 2u8)] {
            RgbImage::from_pixel(32, 32, Rgb([120, 60, 200]))
                .save(year_dir.join("JPEGImages").join(format!("{name}.png")))
                .unwrap();
            GrayImage::from_fn(32, 32, |x, _| Luma([if x < 16 { 0 } else { class }]))
                .save(year_dir.join("SegmentationClassRaw").join(format!("{name}.png")))
                .unwrap();
        }
    }
}
