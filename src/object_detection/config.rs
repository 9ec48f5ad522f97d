// src/object_detection/config.rs

use crate::error::{DetectorError, DetectorResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Which YOLO weights to run. `None` disables object awareness entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    None,
    Standard,
    Tiny,
}

impl ModelVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Standard => "standard",
            Self::Tiny => "tiny",
        }
    }

    /// ONNX file expected in the model directory
    pub fn model_file(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Standard => Some("yolov7.onnx"),
            Self::Tiny => Some("yolov7-tiny.onnx"),
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "standard" => Ok(Self::Standard),
            "tiny" => Ok(Self::Tiny),
            other => Err(DetectorError::invalid_config(format!(
                "unknown model variant '{}' (expected none, standard or tiny)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Cpu,
    Cuda,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            other => Err(DetectorError::invalid_config(format!(
                "unknown backend '{}' (expected cpu or cuda)",
                other
            ))),
        }
    }
}

/// Network input resolution and blob merging aggressiveness.
///
/// `One` is the smallest input and the most granular merging, `Five` the
/// largest input and the most aggressive merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobSize {
    One,
    Two,
    Three,
    Four,
    Five,
}

impl BlobSize {
    pub const ALL: [BlobSize; 5] = [
        BlobSize::One,
        BlobSize::Two,
        BlobSize::Three,
        BlobSize::Four,
        BlobSize::Five,
    ];

    /// Side of the square network input in pixels
    pub fn input_size(&self) -> usize {
        match self {
            Self::One => 288,
            Self::Two => 320,
            Self::Three => 416,
            Self::Four => 512,
            Self::Five => 608,
        }
    }

    /// 1 (tightest) to 5 (most aggressive)
    pub fn level(&self) -> u32 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
        }
    }

    /// Minimum intersection / smaller-area ratio for two boxes to merge
    pub fn merge_overlap_threshold(&self) -> f32 {
        match self {
            Self::One => 0.9,
            Self::Two => 0.7,
            Self::Three => 0.5,
            Self::Four => 0.3,
            Self::Five => 0.1,
        }
    }

    /// Edge gap, as a fraction of frame width, under which two boxes merge.
    /// Zero means gap-based merging is off.
    pub fn merge_gap_ratio(&self) -> f32 {
        (self.level() - 1) as f32 * 0.01
    }

    pub fn from_input_size(size: usize) -> DetectorResult<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.input_size() == size)
            .ok_or_else(|| {
                DetectorError::invalid_config(format!(
                    "unsupported blob size {} (expected 288, 320, 416, 512 or 608)",
                    size
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDetectorConfig {
    pub model_variant: ModelVariant,
    pub backend: Backend,
    pub blob_size: BlobSize,
    /// Directory holding `yolov7.onnx` / `yolov7-tiny.onnx`
    pub model_dir: PathBuf,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    /// Pixels added to each box width and height
    pub box_padding: f32,
    /// Detections centred below this fraction of the frame height are the ego bonnet
    pub hood_cutoff_ratio: f32,
    pub num_threads: usize,
}

impl Default for ObjectDetectorConfig {
    fn default() -> Self {
        Self {
            model_variant: ModelVariant::None,
            backend: Backend::Cpu,
            blob_size: BlobSize::One,
            model_dir: PathBuf::from("models"),
            confidence_threshold: 0.4,
            nms_threshold: 0.4,
            box_padding: 5.0,
            hood_cutoff_ratio: 0.78,
            num_threads: 4,
        }
    }
}

impl ObjectDetectorConfig {
    pub fn validate(&self) -> DetectorResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DetectorError::invalid_config(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.nms_threshold) {
            return Err(DetectorError::invalid_config(format!(
                "nms_threshold {} outside [0, 1]",
                self.nms_threshold
            )));
        }
        if self.box_padding < 0.0 {
            return Err(DetectorError::invalid_config("box_padding must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.hood_cutoff_ratio) || self.hood_cutoff_ratio == 0.0 {
            return Err(DetectorError::invalid_config(
                "hood_cutoff_ratio must be in (0, 1]",
            ));
        }
        if self.num_threads == 0 {
            return Err(DetectorError::invalid_config("num_threads must be >= 1"));
        }
        Ok(())
    }

    pub fn model_path(&self) -> Option<PathBuf> {
        self.model_variant
            .model_file()
            .map(|file| self.model_dir.join(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_sizes_round_trip_through_input_size() {
        for blob in BlobSize::ALL {
            assert_eq!(BlobSize::from_input_size(blob.input_size()).unwrap(), blob);
        }
        assert!(BlobSize::from_input_size(300).is_err());
    }

    #[test]
    fn test_merge_thresholds_loosen_with_level() {
        for pair in BlobSize::ALL.windows(2) {
            assert!(pair[0].merge_overlap_threshold() > pair[1].merge_overlap_threshold());
            assert!(pair[0].merge_gap_ratio() < pair[1].merge_gap_ratio());
        }
        assert_eq!(BlobSize::One.merge_gap_ratio(), 0.0);
    }

    #[test]
    fn test_parse_cli_names() {
        assert_eq!("Tiny".parse::<ModelVariant>().unwrap(), ModelVariant::Tiny);
        assert_eq!("cuda".parse::<Backend>().unwrap(), Backend::Cuda);
        assert!("gpu".parse::<Backend>().is_err());
    }

    #[test]
    fn test_none_variant_has_no_model_path() {
        let config = ObjectDetectorConfig::default();
        assert!(config.model_path().is_none());

        let config = ObjectDetectorConfig {
            model_variant: ModelVariant::Standard,
            ..Default::default()
        };
        assert_eq!(config.model_path().unwrap(), PathBuf::from("models/yolov7.onnx"));
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let config = ObjectDetectorConfig {
            nms_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DetectorError::InvalidConfig(_))
        ));
    }
}
