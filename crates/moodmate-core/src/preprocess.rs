//! Image normalization for the FER emotion classifier.
//!
//! Turns a base64 image payload (optionally a `data:` URL) into the
//! `(1, 48, 48, 1)` NHWC float tensor the classifier was trained on.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use ndarray::Array4;
use thiserror::Error;

// --- Named constants ---
pub const FER_INPUT_SIZE: usize = 48;
const PIXEL_SCALE: f32 = 255.0;
const DATA_URL_MARKER: &str = "base64,";

/// Standard alphabet, padding optional on decode.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("cannot decode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Return the base64 portion of a payload, dropping any `data:...;base64,` header.
pub fn strip_data_url(payload: &str) -> &str {
    match payload.split_once(DATA_URL_MARKER) {
        Some((_, data)) => data,
        None => payload,
    }
}

/// Decode a base64 (or data URL) payload into raw bytes.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, PreprocessError> {
    let data: String = strip_data_url(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(PAYLOAD_ENGINE.decode(data)?)
}

/// Normalize a base64 image payload into a `(1, 48, 48, 1)` tensor in [0, 1].
pub fn normalize(payload: &str) -> Result<Array4<f32>, PreprocessError> {
    let bytes = decode_payload(payload)?;
    normalize_bytes(&bytes)
}

/// Normalize encoded image bytes (PNG, JPEG, ...) into a `(1, 48, 48, 1)` tensor.
pub fn normalize_bytes(bytes: &[u8]) -> Result<Array4<f32>, PreprocessError> {
    let img = image::load_from_memory(bytes)?;
    let gray = to_luma_601(&img);
    let size = FER_INPUT_SIZE as u32;
    let resized = imageops::resize(&gray, size, size, FilterType::CatmullRom);

    tracing::trace!(
        src_width = gray.width(),
        src_height = gray.height(),
        "normalized image to {FER_INPUT_SIZE}x{FER_INPUT_SIZE}"
    );

    Ok(to_tensor(&resized))
}

/// Grayscale conversion with ITU-R 601-2 luma weights, alpha ignored.
///
/// Uses the same 16-bit fixed-point rounding as PIL's `convert("L")`,
/// which is what the training pipeline fed the model.
fn to_luma_601(img: &DynamicImage) -> GrayImage {
    let rgb = img.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let l = (u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000) >> 16;
        Luma([l as u8])
    })
}

/// Pack a 48x48 grayscale image into an NHWC tensor scaled to [0, 1].
fn to_tensor(gray: &GrayImage) -> Array4<f32> {
    let size = FER_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, size, size, 1));

    for (x, y, pixel) in gray.enumerate_pixels() {
        tensor[[0, y as usize, x as usize, 0]] = f32::from(pixel.0[0]) / PIXEL_SCALE;
    }

    tensor
}
