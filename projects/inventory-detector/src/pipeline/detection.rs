use crate::pipeline::annotate::Annotator;
use crate::pipeline::engine::InferenceEngine;
use crate::pipeline::types::{BBox, Detection, DetectionResult};
use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use usls::models::RTDETR;
use usls::{Config, Image};

const RUN_DIR_STEM: &str = "predict";

/// RT-DETR detector backed by USLS that writes an annotated copy of every input.
///
/// The model sits behind a mutex: concurrent `predict` calls are safe and run
/// inference one at a time.
pub struct ObjectDetector {
    model: Mutex<RTDETR>,
    output_root: PathBuf,
    annotator: Annotator,
}

impl ObjectDetector {
    /// Create a new detector with the given model path, writing annotated images under `output_root`.
    pub fn new(model_path: &str, output_root: &Path) -> Result<Self> {
        let config = Config::default()
            .with_model_file(model_path)
            .with_class_names(&usls::NAMES_COCO_80);

        #[cfg(target_os = "macos")]
        let config = config.with_model_device(usls::Device::CoreMl);

        let config = config.commit()?;
        let model = RTDETR::new(config)?;

        fs::create_dir_all(output_root)
            .with_context(|| format!("Failed to create output root {:?}", output_root))?;

        Ok(Self {
            model: Mutex::new(model),
            output_root: output_root.to_path_buf(),
            annotator: Annotator::new(),
        })
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<usls::Hbb>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("Detector model lock poisoned"))?;
        let results = model.forward(&[Image::from(image.clone())])?;
        Ok(results
            .into_iter()
            .next()
            .map(|y| y.hbbs)
            .unwrap_or_default())
    }
}

impl InferenceEngine for ObjectDetector {
    fn predict(&self, source: &Path, confidence: f32) -> Result<DetectionResult> {
        let image = image::open(source)
            .with_context(|| format!("Failed to open staged image {:?}", source))?;

        let start = std::time::Instant::now();
        let hbbs = self.detect(&image)?;
        tracing::debug!(
            "RT-DETR returned {} raw boxes in {:.1}ms",
            hbbs.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        // USLS RT-DETR boxes come back squeezed on the longer axis of non-square inputs
        let correction = aspect_correction(image.width(), image.height());
        let detections: Vec<Detection> = hbbs
            .into_iter()
            .filter(|d| d.confidence().unwrap_or(0.0) >= confidence)
            .map(|d| Detection {
                bbox: correct_bbox(
                    BBox {
                        x: d.xmin(),
                        y: d.ymin(),
                        w: d.width(),
                        h: d.height(),
                    },
                    correction,
                ),
                confidence: d.confidence().unwrap_or(0.0),
                class_id: d.id().unwrap_or(0),
                class_name: d.name().map(|s| s.to_string()),
            })
            .collect();

        let save_dir = next_run_dir(&self.output_root, RUN_DIR_STEM)?;
        let file_name = source
            .file_name()
            .ok_or_else(|| anyhow!("Staged path has no file name: {:?}", source))?;

        let mut annotated = image.to_rgb8();
        self.annotator.annotate(&mut annotated, &detections);
        let artifact = save_dir.join(file_name);
        annotated
            .save(&artifact)
            .with_context(|| format!("Failed to write annotated image {:?}", artifact))?;

        Ok(DetectionResult {
            detections,
            save_dir,
            source_path: source.to_path_buf(),
        })
    }
}

/// Per-axis scale that undoes the model's aspect-ratio padding error.
pub fn aspect_correction(width: u32, height: u32) -> (f32, f32) {
    let (img_w, img_h) = (width as f32, height as f32);
    if img_w > img_h {
        (img_w / img_h, 1.0)
    } else if img_h > img_w {
        (1.0, img_h / img_w)
    } else {
        (1.0, 1.0)
    }
}

pub fn correct_bbox(bbox: BBox, (x_corr, y_corr): (f32, f32)) -> BBox {
    BBox {
        x: bbox.x * x_corr,
        y: bbox.y * y_corr,
        w: bbox.w * x_corr,
        h: bbox.h * y_corr,
    }
}

/// Create and return the first free directory of `root/stem`, `root/stem2`, `root/stem3`, ...
///
/// Directory creation is the claim, so two callers never get the same directory.
pub fn next_run_dir(root: &Path, stem: &str) -> Result<PathBuf> {
    fs::create_dir_all(root).with_context(|| format!("Failed to create {:?}", root))?;

    let mut n = 1usize;
    loop {
        let name = if n == 1 {
            stem.to_string()
        } else {
            format!("{}{}", stem, n)
        };
        let candidate = root.join(name);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create run dir {:?}", candidate))
            }
        }
    }
}
