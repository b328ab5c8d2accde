//! Best-effort image downscaling ahead of an upload.
//!
//! [`prepare_image`] never fails because of the image itself: when decoding,
//! resizing or encoding goes wrong, the original file is uploaded unchanged.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::error::TransferError;

/// Default JPEG quality when none is given.
pub const DEFAULT_QUALITY: u8 = 80;

/// Default output format when none is given.
pub const DEFAULT_FORMAT: &str = "jpg";

const TEMP_PREFIX: &str = "resized";

/// Bounds and output settings for a downscale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeOptions {
    /// Maximum width in pixels; unbounded when absent.
    #[serde(default, deserialize_with = "lenient_bound")]
    pub max_width: Option<u32>,
    /// Maximum height in pixels; unbounded when absent.
    #[serde(default, deserialize_with = "lenient_bound")]
    pub max_height: Option<u32>,
    /// JPEG quality, 1 to 100.
    #[serde(default = "default_quality", deserialize_with = "lenient_quality")]
    pub quality: u8,
    /// Output format: `png` writes PNG, anything else writes JPEG.
    #[serde(default = "default_format", deserialize_with = "lenient_format")]
    pub format: String,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            max_width: None,
            max_height: None,
            quality: DEFAULT_QUALITY,
            format: DEFAULT_FORMAT.to_string(),
        }
    }
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}

/// Reads a number from loose host JSON: numbers and numeric strings.
fn loose_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

/// Bounds are rounded to whole pixels; anything below one pixel is unbounded.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lenient_bound<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(loose_number)
        .map(f64::round)
        .filter(|pixels| *pixels >= 1.0)
        .map(|pixels| pixels.min(f64::from(u32::MAX)) as u32))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lenient_quality<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(loose_number)
        .map_or(DEFAULT_QUALITY, |quality| quality.round().clamp(1.0, 100.0) as u8))
}

fn lenient_format<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(format)) if !format.trim().is_empty() => format,
        _ => default_format(),
    })
}

impl ResizeOptions {
    fn writes_png(&self) -> bool {
        self.format.eq_ignore_ascii_case("png")
    }
}

/// The file that will actually be uploaded.
#[derive(Debug)]
pub struct ImageDescriptor {
    pub path: PathBuf,
    /// Pixel width, when the file could be read as an image.
    pub width: Option<u32>,
    /// Pixel height, when the file could be read as an image.
    pub height: Option<u32>,
    /// Size of the file in bytes.
    pub size: u64,
    /// Owns the temporary file created by a resize; deleting it on drop.
    pub temp: Option<TempPath>,
}

impl ImageDescriptor {
    /// Whether this descriptor points at a freshly created resized copy.
    #[must_use]
    pub fn is_resized(&self) -> bool {
        self.temp.is_some()
    }
}

/// Why a downscale could not be completed.
#[derive(Debug, Error)]
pub enum ResizeFailure {
    #[error("failed to open image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: ImageError,
    },

    #[error("failed to encode resized image: {source}")]
    Encode {
        #[source]
        source: ImageError,
    },

    #[error("failed to write resized image: {source}")]
    Write {
        #[source]
        source: io::Error,
    },
}

/// Reads the size and, when possible, the pixel dimensions of `path` without
/// decoding pixel data.
///
/// # Errors
///
/// Returns [`TransferError::Io`] when the file's metadata cannot be read.
/// A file that is not a readable image is not an error; its dimensions are
/// reported as `None`.
pub fn probe_image(path: &Path) -> Result<ImageDescriptor, TransferError> {
    let size = fs::metadata(path)
        .map_err(|e| TransferError::io(path, e))?
        .len();
    let dimensions = read_dimensions(path).ok();
    Ok(ImageDescriptor {
        path: path.to_path_buf(),
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
        size,
        temp: None,
    })
}

/// Produces the descriptor of the file to upload.
///
/// Without options the file is only probed. With options the image is
/// downscaled into a temporary file in `scratch_dir` when it exceeds the
/// bounds; any resize failure is logged and the original is used instead.
///
/// # Errors
///
/// Returns [`TransferError::Io`] only when the original file itself cannot
/// be read.
#[instrument(level = "debug", skip(options, scratch_dir), fields(path = %path.display()))]
pub fn prepare_image(
    path: &Path,
    options: Option<&ResizeOptions>,
    scratch_dir: &Path,
) -> Result<ImageDescriptor, TransferError> {
    let Some(options) = options else {
        return probe_image(path);
    };
    match downscale(path, options, scratch_dir) {
        Ok(Some(resized)) => Ok(resized),
        Ok(None) => probe_image(path),
        Err(failure) => {
            warn!(error = %failure, "image resize failed, uploading original");
            probe_image(path)
        }
    }
}

/// Downscales `path` to fit `options`, or returns `None` when it already fits.
///
/// # Errors
///
/// Returns a [`ResizeFailure`] when the image cannot be decoded, encoded or
/// written.
pub fn downscale(
    path: &Path,
    options: &ResizeOptions,
    scratch_dir: &Path,
) -> Result<Option<ImageDescriptor>, ResizeFailure> {
    let (width, height) = read_dimensions(path)?;
    let Some((target_width, target_height)) =
        target_size(width, height, options.max_width, options.max_height)
    else {
        debug!(width, height, "image already within bounds");
        return Ok(None);
    };

    let mut image = open_reader(path)?
        .decode()
        .map_err(|source| ResizeFailure::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let sample = sample_factor(width, height, target_width, target_height);
    if sample > 1 {
        image = image.resize_exact(width / sample, height / sample, FilterType::Nearest);
    }
    let resized = image.resize_exact(target_width, target_height, FilterType::Triangle);

    let temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(&format!(".{}", options.format))
        .tempfile_in(scratch_dir)
        .map_err(|source| ResizeFailure::Write { source })?;
    write_image(&resized, temp.as_file(), options)?;
    let size = temp
        .as_file()
        .metadata()
        .map_err(|source| ResizeFailure::Write { source })?
        .len();
    let temp = temp.into_temp_path();

    debug!(
        from = %format!("{width}x{height}"),
        to = %format!("{target_width}x{target_height}"),
        sample,
        size,
        "image downscaled"
    );
    Ok(Some(ImageDescriptor {
        path: temp.to_path_buf(),
        width: Some(target_width),
        height: Some(target_height),
        size,
        temp: Some(temp),
    }))
}

fn open_reader(path: &Path) -> Result<ImageReader<io::BufReader<fs::File>>, ResizeFailure> {
    ImageReader::open(path)
        .and_then(ImageReader::with_guessed_format)
        .map_err(|source| ResizeFailure::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn read_dimensions(path: &Path) -> Result<(u32, u32), ResizeFailure> {
    open_reader(path)?
        .into_dimensions()
        .map_err(|source| ResizeFailure::Decode {
            path: path.to_path_buf(),
            source,
        })
}

fn write_image(
    image: &DynamicImage,
    file: &fs::File,
    options: &ResizeOptions,
) -> Result<(), ResizeFailure> {
    let mut writer = BufWriter::new(file);
    if options.writes_png() {
        image
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(|source| ResizeFailure::Encode { source })?;
    } else {
        let quality = options.quality.clamp(1, 100);
        JpegEncoder::new_with_quality(&mut writer, quality)
            .encode_image(&image.to_rgb8())
            .map_err(|source| ResizeFailure::Encode { source })?;
    }
    writer
        .flush()
        .map_err(|source| ResizeFailure::Write { source })
}

/// Target size for `width`×`height` within the bounds, or `None` if it fits.
///
/// The scale is the smaller of the two axis ratios and never exceeds 1, so
/// the aspect ratio is kept up to rounding.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn target_size(
    width: u32,
    height: u32,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let ratio = |max: Option<u32>, actual: u32| {
        max.map_or(f64::INFINITY, |max| f64::from(max) / f64::from(actual))
    };
    let scale = ratio(max_width, width).min(ratio(max_height, height));
    if scale >= 1.0 {
        return None;
    }
    let scaled = |actual: u32| ((f64::from(actual) * scale).round() as u32).max(1);
    Some((scaled(width), scaled(height)))
}

/// Largest power of two by which both halved dimensions still cover the target.
fn sample_factor(width: u32, height: u32, target_width: u32, target_height: u32) -> u32 {
    let mut factor = 1;
    if width > target_width || height > target_height {
        let half_width = width / 2;
        let half_height = height / 2;
        while half_width / factor >= target_width && half_height / factor >= target_height {
            factor *= 2;
        }
    }
    factor
}
