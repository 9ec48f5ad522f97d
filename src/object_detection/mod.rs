// src/object_detection/mod.rs
//
// Frame → blob → backend inference → decode + NMS → blob merging → boxes.
// Backends are selected once at construction from ObjectDetectorConfig.

mod backend;
mod blob_merge;
mod config;
pub(crate) mod detector;
mod postprocess;
mod preprocess;
mod types;

// Re-export public APIs
pub use backend::{build_backend, InferenceBackend, OrtBackend};
pub use blob_merge::{merge_blobs, MergeThresholds};
pub use config::{Backend, BlobSize, ModelVariant, ObjectDetectorConfig};
pub use detector::ObjectDetector;
pub use postprocess::{class_id_to_name, RawOutput, COCO_CLASSES};
pub use types::ObjectBoundingBox;
