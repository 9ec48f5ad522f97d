// src/video_processor.rs

use crate::types::{Frame, VideoConfig};
use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    File(PathBuf),
    Camera(i32),
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Camera(index) => write!(f, "camera {}", index),
        }
    }
}

impl VideoSource {
    /// Stem used for result files
    pub fn name(&self) -> String {
        match self {
            Self::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "video".to_string()),
            Self::Camera(index) => format!("camera_{}", index),
        }
    }
}

pub struct VideoProcessor {
    config: VideoConfig,
}

impl VideoProcessor {
    pub fn new(config: VideoConfig) -> Self {
        Self { config }
    }

    /// Resolve `video.input`: a camera index, a single file, or a directory
    /// searched recursively for videos (sorted for a stable order).
    pub fn find_sources(&self) -> Result<Vec<VideoSource>> {
        let input = self.config.input.trim();

        if let Ok(index) = input.parse::<i32>() {
            return Ok(vec![VideoSource::Camera(index)]);
        }

        let path = Path::new(input);
        if path.is_file() {
            return Ok(vec![VideoSource::File(path.to_path_buf())]);
        }
        if !path.is_dir() {
            anyhow::bail!(
                "Video input {} is not a file, a directory or a camera index",
                input
            );
        }

        let mut videos: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|entry| entry.into_path())
            .filter(|path| is_video_file(path))
            .collect();
        videos.sort();

        info!("Found {} video files", videos.len());
        Ok(videos.into_iter().map(VideoSource::File).collect())
    }

    pub fn open(&self, source: &VideoSource) -> Result<VideoReader> {
        info!("Opening video: {}", source);

        let cap = match source {
            VideoSource::File(path) => {
                let path_str = path
                    .to_str()
                    .with_context(|| format!("Non UTF-8 video path {}", path.display()))?;
                VideoCapture::from_file(path_str, videoio::CAP_ANY)?
            }
            VideoSource::Camera(index) => VideoCapture::new(*index, videoio::CAP_ANY)?,
        };

        if !cap.is_opened()? {
            anyhow::bail!("Failed to open {}", source);
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total_frames =
            VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as u64;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as usize;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as usize;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        Ok(VideoReader {
            cap,
            fps: if fps > 0.0 { fps } else { 30.0 },
            total_frames,
            current_frame: 0,
            max_frames: self.config.max_frames,
        })
    }
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct VideoReader {
    cap: VideoCapture,
    pub fps: f64,
    pub total_frames: u64,
    pub current_frame: u64,
    max_frames: u64,
}

impl VideoReader {
    /// Next RGB frame in capture order, `None` at end of stream
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.max_frames > 0 && self.current_frame >= self.max_frames {
            return Ok(None);
        }

        let mut mat = Mat::default();
        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        let timestamp_ms = (self.current_frame as f64 / self.fps) * 1000.0;
        self.current_frame += 1;

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb_mat.data_bytes()?.to_vec();

        Ok(Some(Frame::new(
            data,
            rgb_mat.cols() as usize,
            rgb_mat.rows() as usize,
            timestamp_ms,
        )))
    }

    pub fn progress(&self) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.current_frame as f32 / self.total_frames as f32) * 100.0
    }
}
