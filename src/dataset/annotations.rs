use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::detector::BBox;
use crate::error::DatasetError;

#[derive(Debug, Deserialize)]
struct AnnotationFile {
    images: Vec<ImageEntry>,
    #[serde(default)]
    annotations: Vec<AnnotationEntry>,
    categories: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    id: u64,
    file_name: String,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct AnnotationEntry {
    image_id: u64,
    category_id: u64,
    bbox: [f32; 4],
    #[serde(default)]
    iscrowd: u8,
    /// VOC exports mark `difficult` objects with `ignore`.
    #[serde(default, alias = "difficult")]
    ignore: u8,
}

#[derive(Debug, Deserialize)]
struct CategoryEntry {
    id: u64,
    name: String,
}

/// Ground-truth object in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct GtObject {
    /// Contiguous class index, `1..=num_classes`.
    pub class: usize,
    pub bbox: BBox,
    /// Crowd or difficult: neither a hit nor a miss when matched.
    pub ignore: bool,
}

/// One evaluation image and its ground truth.
#[derive(Debug, Clone)]
pub struct Sample {
    pub id: u64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub objects: Vec<GtObject>,
}

impl Sample {
    /// File name without extension, used to find per-image side files.
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }
}

/// Images, objects and class names parsed from a COCO-format annotation file.
#[derive(Debug, Clone)]
pub struct AnnotatedSet {
    pub class_names: Vec<String>,
    pub samples: Vec<Sample>,
}

impl AnnotatedSet {
    pub fn from_file(path: &Path) -> Result<Self, DatasetError> {
        let content = fs::read_to_string(path).map_err(|e| DatasetError::AnnotationRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: AnnotationFile =
            serde_json::from_str(&content).map_err(|e| DatasetError::AnnotationParse {
                path: path.to_path_buf(),
                source: e,
            })?;
        Self::from_parsed(file)
    }

    fn from_parsed(file: AnnotationFile) -> Result<Self, DatasetError> {
        let mut categories = file.categories;
        categories.sort_by_key(|c| c.id);
        let class_of: HashMap<u64, usize> = categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i + 1))
            .collect();
        let class_names = categories.into_iter().map(|c| c.name).collect();

        let mut samples: Vec<Sample> = file
            .images
            .into_iter()
            .map(|img| Sample {
                id: img.id,
                file_name: img.file_name,
                width: img.width,
                height: img.height,
                objects: Vec::new(),
            })
            .collect();
        samples.sort_by_key(|s| s.id);
        let position: HashMap<u64, usize> =
            samples.iter().enumerate().map(|(i, s)| (s.id, i)).collect();

        for ann in file.annotations {
            let class = *class_of
                .get(&ann.category_id)
                .ok_or(DatasetError::UnknownCategory(ann.category_id))?;
            // Annotations for images outside the split are dropped.
            let Some(&idx) = position.get(&ann.image_id) else {
                continue;
            };
            samples[idx].objects.push(GtObject {
                class,
                bbox: BBox::from_xywh(ann.bbox),
                ignore: ann.iscrowd != 0 || ann.ignore != 0,
            });
        }

        Ok(AnnotatedSet {
            class_names,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_JSON: &str = r#"{
        "images": [
            {"id": 7, "file_name": "000007.jpg", "width": 500, "height": 333},
            {"id": 2, "file_name": "000002.jpg", "width": 335, "height": 500}
        ],
        "annotations": [
            {"image_id": 7, "category_id": 15, "bbox": [10, 20, 30, 40]},
            {"image_id": 7, "category_id": 3, "bbox": [0, 0, 5, 5], "ignore": 1},
            {"image_id": 2, "category_id": 3, "bbox": [1, 1, 2, 2], "iscrowd": 1},
            {"image_id": 99, "category_id": 3, "bbox": [1, 1, 2, 2]}
        ],
        "categories": [
            {"id": 15, "name": "person"},
            {"id": 3, "name": "bird"}
        ]
    }"#;

    fn parse(json: &str) -> Result<AnnotatedSet, DatasetError> {
        AnnotatedSet::from_parsed(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_categories_become_contiguous_classes() {
        let set = parse(SAMPLE_JSON).unwrap();
        assert_eq!(set.class_names, vec!["bird", "person"]);
        let person = &set.samples[1].objects[0];
        assert_eq!(person.class, 2);
        assert_eq!(person.bbox, BBox::new(10.0, 20.0, 40.0, 60.0));
    }

    #[test]
    fn test_samples_sorted_and_flags_mapped() {
        let set = parse(SAMPLE_JSON).unwrap();
        let ids: Vec<u64> = set.samples.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 7]);
        assert!(set.samples[0].objects[0].ignore);
        assert!(!set.samples[1].objects[0].ignore);
        assert!(set.samples[1].objects[1].ignore);
        assert_eq!(set.samples[1].stem(), "000007");
    }

    #[test]
    fn test_unknown_category_is_error() {
        let json = r#"{
            "images": [{"id": 1, "file_name": "a.jpg", "width": 1, "height": 1}],
            "annotations": [{"image_id": 1, "category_id": 5, "bbox": [0, 0, 1, 1]}],
            "categories": []
        }"#;
        assert!(matches!(parse(json), Err(DatasetError::UnknownCategory(5))));
    }

    #[test]
    fn test_from_file_reports_paths() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            AnnotatedSet::from_file(&missing),
            Err(DatasetError::AnnotationRead { .. })
        ));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{").unwrap();
        assert!(matches!(
            AnnotatedSet::from_file(&broken),
            Err(DatasetError::AnnotationParse { .. })
        ));

        let good = dir.path().join("good.json");
        fs::write(&good, SAMPLE_JSON).unwrap();
        assert_eq!(AnnotatedSet::from_file(&good).unwrap().samples.len(), 2);
    }
}
