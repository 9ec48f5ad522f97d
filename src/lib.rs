// src/lib.rs

pub mod config;
pub mod error;
pub mod lane_detection;
pub mod line_extraction;
pub mod object_detection;
pub mod pipeline;
pub mod rolling_average;
pub mod types;
pub mod video_processor;

pub use error::{DetectorError, DetectorResult};
pub use types::{Config, Frame};
