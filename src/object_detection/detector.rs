// src/object_detection/detector.rs

use super::backend::{build_backend, InferenceBackend};
use super::blob_merge::{merge_blobs, MergeThresholds};
use super::config::{ModelVariant, ObjectDetectorConfig};
use super::postprocess::{decode, nms, DecodeParams};
use super::preprocess::frame_to_blob;
use super::types::ObjectBoundingBox;
use crate::error::{DetectorError, DetectorResult};
use crate::types::Frame;
use tracing::{debug, info};

/// YOLO object detector over a configurable backend.
///
/// The configuration is fixed for the detector's lifetime; build a new
/// detector to change it.
pub struct ObjectDetector {
    config: ObjectDetectorConfig,
    backend: Option<Box<dyn InferenceBackend>>,
    blob: Vec<f32>,
}

impl ObjectDetector {
    pub fn new(config: ObjectDetectorConfig) -> DetectorResult<Self> {
        config.validate()?;

        let backend = match config.model_path() {
            Some(model_path) => Some(build_backend(&config, &model_path)?),
            None => {
                info!("Object detection disabled (model variant 'none')");
                None
            }
        };

        Ok(Self {
            config,
            backend,
            blob: Vec::new(),
        })
    }

    /// Use an externally constructed backend instead of the dispatch table
    pub fn with_backend(
        config: ObjectDetectorConfig,
        backend: Box<dyn InferenceBackend>,
    ) -> DetectorResult<Self> {
        config.validate()?;

        if config.model_variant == ModelVariant::None {
            return Err(DetectorError::invalid_config(
                "a backend was supplied for model variant 'none'",
            ));
        }

        Ok(Self {
            config,
            backend: Some(backend),
            blob: Vec::new(),
        })
    }

    pub fn config(&self) -> &ObjectDetectorConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Side of the square network input
    pub fn input_size(&self) -> DetectorResult<usize> {
        self.require_backend("input_size")?;
        Ok(self.config.blob_size.input_size())
    }

    /// Run one inference on a blank blob so the first real frame does not pay
    /// for session initialization.
    pub fn warm_up(&mut self) -> DetectorResult<()> {
        let size = self.config.blob_size.input_size();
        let backend = self.require_backend_mut("warm_up")?;

        let blank = vec![0.0f32; 3 * size * size];
        backend.infer(&blank, size)?;

        info!("✓ {} backend warmed up", backend.name());
        Ok(())
    }

    /// Detect objects in a frame and consolidate them into blobs.
    ///
    /// Always empty for model variant `none`.
    pub fn detect(&mut self, frame: &Frame) -> DetectorResult<Vec<ObjectBoundingBox>> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(Vec::new());
        };

        if !frame.is_valid() {
            return Err(DetectorError::InvalidFrame {
                width: frame.width,
                height: frame.height,
            });
        }

        let size = self.config.blob_size.input_size();

        // 1. Preprocess (stretch to blob size + normalize)
        frame_to_blob(frame, size, &mut self.blob)?;

        // 2. Run inference
        let output = backend.infer(&self.blob, size)?;

        // 3. Decode + NMS
        let params = DecodeParams {
            input_size: size as f32,
            frame_width: frame.width as f32,
            frame_height: frame.height as f32,
            confidence_threshold: self.config.confidence_threshold,
            box_padding: self.config.box_padding,
            hood_cutoff_y: self.config.hood_cutoff_ratio * frame.height as f32,
        };
        let detections = nms(decode(&output, &params), self.config.nms_threshold);

        // 4. Merge into blobs
        let thresholds = MergeThresholds::for_blob_size(self.config.blob_size, frame.width as f32);
        let detections = merge_blobs(detections, thresholds);

        debug!("Detected {} objects (after merging)", detections.len());
        Ok(detections)
    }

    fn require_backend(&self, operation: &'static str) -> DetectorResult<&dyn InferenceBackend> {
        self.backend
            .as_deref()
            .ok_or_else(|| self.unsupported(operation))
    }

    fn require_backend_mut(
        &mut self,
        operation: &'static str,
    ) -> DetectorResult<&mut Box<dyn InferenceBackend>> {
        let variant = self.config.model_variant;
        self.backend
            .as_mut()
            .ok_or_else(|| DetectorError::Unsupported {
                operation,
                variant: variant.to_string(),
            })
    }

    fn unsupported(&self, operation: &'static str) -> DetectorError {
        DetectorError::Unsupported {
            operation,
            variant: self.config.model_variant.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::object_detection::config::BlobSize;
    use crate::object_detection::postprocess::RawOutput;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replays fixed predictions in network-input pixels
    pub(crate) struct FakeBackend {
        pub rows: Vec<Vec<f32>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        pub(crate) fn new(rows: Vec<Vec<f32>>) -> Self {
            Self {
                rows,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl InferenceBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn infer(&mut self, blob: &[f32], input_size: usize) -> DetectorResult<RawOutput> {
            assert_eq!(blob.len(), 3 * input_size * input_size);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let cols = 85;
            Ok(RawOutput {
                rows: self.rows.len(),
                cols,
                data: self.rows.iter().flatten().copied().collect(),
            })
        }
    }

    pub(crate) fn prediction(cx: f32, cy: f32, w: f32, h: f32, class: usize, score: f32) -> Vec<f32> {
        let mut row = vec![cx, cy, w, h, 1.0];
        let mut scores = vec![0.0; 80];
        scores[class] = score;
        row.extend(scores);
        row
    }

    fn config(blob_size: BlobSize) -> ObjectDetectorConfig {
        ObjectDetectorConfig {
            model_variant: ModelVariant::Tiny,
            blob_size,
            box_padding: 0.0,
            ..Default::default()
        }
    }

    fn frame(seed: u8) -> Frame {
        let data = (0..64 * 48 * 3).map(|i| (i as u8).wrapping_add(seed)).collect();
        Frame::new(data, 64, 48, 0.0)
    }

    #[test]
    fn test_none_variant_always_returns_empty() {
        let mut detector = ObjectDetector::new(ObjectDetectorConfig::default()).unwrap();
        assert!(!detector.is_enabled());
        for seed in [0u8, 17, 200] {
            assert!(detector.detect(&frame(seed)).unwrap().is_empty());
        }
        // Even an invalid frame is never inspected
        let empty = Frame::new(Vec::new(), 0, 0, 0.0);
        assert!(detector.detect(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_none_variant_rejects_model_operations() {
        let mut detector = ObjectDetector::new(ObjectDetectorConfig::default()).unwrap();
        assert!(matches!(
            detector.input_size(),
            Err(DetectorError::Unsupported { operation: "input_size", .. })
        ));
        assert!(matches!(
            detector.warm_up(),
            Err(DetectorError::Unsupported { operation: "warm_up", .. })
        ));
    }

    #[test]
    fn test_missing_model_is_construction_error() {
        let config = ObjectDetectorConfig {
            model_variant: ModelVariant::Standard,
            model_dir: "/nonexistent/models".into(),
            ..Default::default()
        };
        assert!(matches!(
            ObjectDetector::new(config),
            Err(DetectorError::ModelLoad { .. })
        ));
    }

    #[test]
    fn test_detect_scales_and_merges() {
        // Two truck fragments side by side in a 608 px blob; frame is 64x48
        let rows = vec![
            prediction(100.0, 100.0, 40.0, 40.0, 7, 0.9),
            prediction(142.0, 100.0, 40.0, 40.0, 7, 0.8),
            prediction(250.0, 50.0, 20.0, 20.0, 0, 0.95),
        ];
        let backend = FakeBackend::new(rows);
        let calls = backend.calls.clone();

        let mut detector =
            ObjectDetector::with_backend(config(BlobSize::Five), Box::new(backend)).unwrap();
        let boxes = detector.detect(&frame(0)).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].class_name, "person");
        assert_eq!(boxes[1].class_name, "truck");
        assert!(boxes.iter().all(|b| b.bbox[2] <= 64.0 + 1e-3));
    }

    #[test]
    fn test_same_config_and_frames_give_identical_boxes() {
        let rows = vec![
            prediction(60.0, 60.0, 30.0, 30.0, 2, 0.7),
            prediction(80.0, 65.0, 30.0, 30.0, 2, 0.7),
            prediction(200.0, 120.0, 50.0, 40.0, 5, 0.6),
            prediction(205.0, 125.0, 50.0, 40.0, 5, 0.5),
        ];

        let run = || {
            let mut detector = ObjectDetector::with_backend(
                config(BlobSize::Three),
                Box::new(FakeBackend::new(rows.clone())),
            )
            .unwrap();
            (0..3)
                .map(|seed| detector.detect(&frame(seed)).unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_backend_for_none_variant_is_rejected() {
        let result = ObjectDetector::with_backend(
            ObjectDetectorConfig::default(),
            Box::new(FakeBackend::new(Vec::new())),
        );
        assert!(matches!(result, Err(DetectorError::InvalidConfig(_))));
    }
}
