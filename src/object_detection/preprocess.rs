// src/object_detection/preprocess.rs

use crate::error::DetectorResult;
use crate::types::Frame;
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
};

/// Resize the RGB frame to `size x size` (bilinear), normalize [0, 255] ->
/// [0, 1] and write it to `blob` in CHW order. `blob` is resized as needed
/// and reused.
pub fn frame_to_blob(frame: &Frame, size: usize, blob: &mut Vec<f32>) -> DetectorResult<()> {
    let mat = Mat::from_slice(frame.data.as_slice())?;
    let mat = mat.reshape(3, frame.height as i32)?;

    let side = size as i32;
    let mut resized = Mat::default();
    imgproc::resize(
        &mat,
        &mut resized,
        Size::new(side, side),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    let pixels = resized.data_bytes()?;

    let plane = size * size;
    blob.clear();
    blob.resize(3 * plane, 0.0);

    for (idx, rgb) in pixels.chunks_exact(3).enumerate() {
        for (c, &value) in rgb.iter().enumerate() {
            blob[c * plane + idx] = value as f32 / 255.0;
        }
    }

    Ok(())
}
