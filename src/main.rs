// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use lane_object_detection::lane_detection::{DrivingState, LaneDetector};
use lane_object_detection::line_extraction::LineExtractor;
use lane_object_detection::object_detection::{Backend, BlobSize, ModelVariant, ObjectDetector};
use lane_object_detection::pipeline::{MetricsSummary, PerceptionPipeline};
use lane_object_detection::video_processor::{VideoProcessor, VideoSource};
use lane_object_detection::{Config, DetectorError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Lane classification and object detection over video")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Video file, directory of videos, or camera index
    #[arg(short, long)]
    input: Option<String>,

    /// Directory holding the ONNX models
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// none | standard | tiny
    #[arg(long)]
    object_detector_type: Option<ModelVariant>,

    /// cpu | cuda
    #[arg(long)]
    object_detector_backend: Option<Backend>,

    /// 288 | 320 | 416 | 512 | 608
    #[arg(long)]
    object_detector_blob_size: Option<usize>,

    /// Stop after this many frames per video (0 = unlimited)
    #[arg(long)]
    max_frames: Option<u64>,

    #[arg(long)]
    output_dir: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(input) = &self.input {
            config.video.input = input.clone();
        }
        if let Some(model_dir) = &self.model_dir {
            config.object_detector.model_dir = model_dir.clone();
        }
        if let Some(variant) = self.object_detector_type {
            config.object_detector.model_variant = variant;
        }
        if let Some(backend) = self.object_detector_backend {
            config.object_detector.backend = backend;
        }
        if let Some(size) = self.object_detector_blob_size {
            config.object_detector.blob_size = BlobSize::from_input_size(size)?;
        }
        if let Some(max_frames) = self.max_frames {
            config.video.max_frames = max_frames;
        }
        if let Some(output_dir) = &self.output_dir {
            config.output.output_dir = output_dir.clone();
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_found = args.config.is_file();
    let mut config = if config_found {
        Config::load(&args.config)?
    } else {
        Config::default()
    };
    args.apply(&mut config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚗 Lane & Object Detection System Starting");
    if config_found {
        info!("✓ Configuration loaded from {}", args.config.display());
    } else {
        warn!(
            "⚠️  {} not found, using default configuration",
            args.config.display()
        );
    }

    info!(
        "Object detector: variant={}, backend={}, blob={}px",
        config.object_detector.model_variant,
        config.object_detector.backend,
        config.object_detector.blob_size.input_size()
    );
    info!(
        "Driving state: change thresholds L={:.1} R={:.1}, confirm_frames={}",
        config.lane_detector.driving_state.left_change_threshold,
        config.lane_detector.driving_state.right_change_threshold,
        config.lane_detector.driving_state.confirm_frames
    );

    // Construction errors are fatal
    let mut object_detector = ObjectDetector::new(config.object_detector.clone())
        .context("Failed to build object detector")?;
    if object_detector.is_enabled() {
        object_detector.warm_up()?;
    }
    info!("✓ Object detector ready");

    let lane_detector = LaneDetector::new(config.lane_detector.clone())?;
    let mut pipeline = PerceptionPipeline::new(object_detector, lane_detector);
    let extractor = LineExtractor::new(config.line_extraction.clone());

    let video_processor = VideoProcessor::new(config.video.clone());
    let sources = video_processor.find_sources()?;

    if sources.is_empty() {
        error!("No video files found in {}", config.video.input);
        return Ok(());
    }

    info!("Found {} video source(s) to process", sources.len());

    for (idx, source) in sources.iter().enumerate() {
        info!("========================================");
        info!("Processing video {}/{}: {}", idx + 1, sources.len(), source);
        info!("========================================");

        pipeline.start_stream(LaneDetector::new(config.lane_detector.clone())?);

        match process_video(source, &video_processor, &mut pipeline, &extractor, &config) {
            Ok(stats) => log_stats(&stats),
            Err(e) => {
                error!("Failed to process video: {:#}", e);
            }
        }
    }

    Ok(())
}

fn process_video(
    source: &VideoSource,
    video_processor: &VideoProcessor,
    pipeline: &mut PerceptionPipeline,
    extractor: &LineExtractor,
    config: &Config,
) -> Result<MetricsSummary> {
    let mut reader = video_processor.open(source)?;
    let mut results = open_results_file(source, config)?;

    let mut previous_state = DrivingState::Normal;

    while let Some(frame) = reader.read_frame()? {
        let result = match pipeline.process_frame(&frame, |f| extractor.extract(f)) {
            Ok(result) => result,
            Err(e) => {
                let fatal = e
                    .downcast_ref::<DetectorError>()
                    .map(DetectorError::is_fatal)
                    .unwrap_or(false);
                if fatal {
                    return Err(e);
                }
                warn!("⚠️  Skipping frame {}: {:#}", reader.current_frame, e);
                continue;
            }
        };

        let state = result.lanes.driving_state;
        if state != previous_state {
            let turning = result
                .lanes
                .turning_direction
                .filter(|_| result.is_changing_lanes())
                .map_or("-", |direction| direction.as_str());
            info!(
                "[{:.1}s] Driving state {} → {} (turning {}, offset {:?}, turn {:?}%)",
                result.timestamp_ms / 1000.0,
                previous_state.as_str(),
                state.as_str(),
                turning,
                result.lanes.lane_position_offset,
                result.lanes.turning_required_percentage
            );
            previous_state = state;
        }

        if let Some(writer) = results.as_mut() {
            serde_json::to_writer(&mut *writer, &result)?;
            writeln!(writer)?;
        }

        if result.frame_index % 100 == 0 {
            debug!(
                "Progress: {:.1}% ({} frames, {:.1} FPS)",
                reader.progress(),
                result.frame_index,
                pipeline.metrics().fps()
            );
        }
    }

    if let Some(mut writer) = results {
        writer.flush()?;
    }

    Ok(pipeline.metrics().summary())
}

fn open_results_file(source: &VideoSource, config: &Config) -> Result<Option<BufWriter<File>>> {
    if !config.output.save_results {
        return Ok(None);
    }

    std::fs::create_dir_all(&config.output.output_dir)?;
    let path = Path::new(&config.output.output_dir)
        .join(format!("{}_results.jsonl", source.name()));
    let file = File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    info!("💾 Results will be written to: {}", path.display());

    Ok(Some(BufWriter::new(file)))
}

fn log_stats(stats: &MetricsSummary) {
    let pct = |count: u64| 100.0 * count as f64 / stats.total_frames.max(1) as f64;

    info!("✓ Video processed successfully!");
    info!("  Total frames: {}", stats.total_frames);
    info!(
        "  Frames with lanes: {} ({:.1}%)",
        stats.frames_with_lanes,
        pct(stats.frames_with_lanes)
    );
    info!(
        "  🚙 Frames with objects: {} ({:.1}%)",
        stats.frames_with_objects,
        pct(stats.frames_with_objects)
    );
    info!("  Lane changes detected: {}", stats.lane_changes);
    if stats.failed_frames > 0 {
        warn!("  ⚠️  Skipped frames: {}", stats.failed_frames);
    }
    info!("  Processing Speed: {:.1} FPS", stats.fps);
}
