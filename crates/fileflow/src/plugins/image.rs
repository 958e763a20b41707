//! Format conversion, resizing and aspect-ratio cropping of raster images.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;

use crate::file::ManagedFile;
use crate::plugin::{Plugin, PluginError};
use crate::status::FileProcess;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "21:9")]
    UltraWide,
}

impl AspectRatio {
    fn ratio(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Standard => (4, 3),
            AspectRatio::Wide => (16, 9),
            AspectRatio::UltraWide => (21, 9),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageParams {
    /// Target encoding by extension (`png`, `jpg`, `webp`, ...).
    pub format: Option<String>,
    /// Resize to this width, keeping the aspect ratio.
    pub width: Option<u32>,
    /// Resize to this height, keeping the aspect ratio.
    pub height: Option<u32>,
    /// Centered crop applied after resizing.
    pub aspect_ratio: Option<AspectRatio>,
}

pub struct ImageManipulation;

impl Plugin for ImageManipulation {
    type Params = ImageParams;

    fn name(&self) -> &str {
        "ImageManipulation"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        params: &ImageParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        let target_format = params
            .format
            .as_deref()
            .map(|f| {
                ImageFormat::from_extension(f.trim().trim_start_matches('.'))
                    .ok_or_else(|| PluginError::Unsupported(format!("image format '{}'", f)))
            })
            .transpose()?;

        let mut processed = Vec::with_capacity(files.len());
        for mut file in files {
            if !file.mime_type.to_lowercase().starts_with("image/") {
                processed.push(file);
                continue;
            }

            let _span = tracing::info_span!("plugin.image", file = %file.file_name).entered();
            super::report(process, self.name(), format!("Processing file({})", file.file_name));

            let img = image::load_from_memory(file.load_content()?).map_err(|e| {
                PluginError::Decode {
                    file: file.file_name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let img = transform(img, params);

            let format = match target_format {
                Some(format) => format,
                None => source_format(&file)?,
            };
            let bytes = encode(&img, format).map_err(|reason| PluginError::Encode {
                file: file.file_name.clone(),
                reason,
            })?;

            if let Some(requested) = params.format.as_deref() {
                let extension = requested.trim().trim_start_matches('.');
                file.file_name = super::replace_extension(&file.file_name, extension);
                file.local_path = None;
            }
            file.mime_type = format.to_mime_type().to_string();
            file.size = bytes.len() as u64;
            file.content = Some(bytes);
            file.set_metadata("width", img.width());
            file.set_metadata("height", img.height());

            processed.push(file);
        }

        Ok(processed)
    }
}

fn source_format(file: &ManagedFile) -> Result<ImageFormat, PluginError> {
    ImageFormat::from_mime_type(&file.mime_type)
        .or_else(|| ImageFormat::from_path(&file.file_name).ok())
        .ok_or_else(|| PluginError::Unsupported(format!("image type '{}'", file.mime_type)))
}

fn transform(mut img: DynamicImage, params: &ImageParams) -> DynamicImage {
    if let Some(width) = params.width.filter(|w| *w > 0) {
        let height = scaled(img.height(), width, img.width());
        img = img.resize_exact(width, height, FilterType::Lanczos3);
    }
    if let Some(height) = params.height.filter(|h| *h > 0) {
        let width = scaled(img.width(), height, img.height());
        img = img.resize_exact(width, height, FilterType::Lanczos3);
    }
    if let Some(aspect) = params.aspect_ratio {
        img = crop_to_aspect(img, aspect);
    }
    img
}

/// `value * numerator / denominator`, at least 1.
fn scaled(value: u32, numerator: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        return value.max(1);
    }
    ((value as u64 * numerator as u64) / denominator as u64).max(1) as u32
}

/// Largest centered region with the requested ratio.
fn crop_to_aspect(img: DynamicImage, aspect: AspectRatio) -> DynamicImage {
    let (rw, rh) = aspect.ratio();
    let (w, h) = (img.width(), img.height());

    let (crop_w, crop_h) = if w as u64 * rh as u64 >= h as u64 * rw as u64 {
        (scaled(h, rw, rh).min(w), h)
    } else {
        (w, scaled(w, rh, rw).min(h))
    };

    let x = (w - crop_w) / 2;
    let y = (h - crop_h) / 2;
    img.crop_imm(x, y, crop_w, crop_h)
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, String> {
    let mut buffer = Cursor::new(Vec::new());
    // JPEG has no alpha channel.
    let result = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut buffer, format)
    } else {
        img.write_to(&mut buffer, format)
    };
    result.map_err(|e| e.to_string())?;
    Ok(buffer.into_inner())
}
