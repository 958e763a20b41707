//! Built-in processing plugins.

pub mod annotate;
pub mod clamav;
pub mod docx;
pub mod exif_metadata;
pub mod image;
pub mod passthrough;
pub mod pdf;
pub mod pdf_edit;
pub mod xlsx;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::config::Settings;
use crate::pipeline::FileManager;
use crate::status::{FileProcess, ProcessingStatus};

pub use annotate::Annotate;
pub use clamav::ClamAv;
pub use docx::DocxText;
pub use exif_metadata::ExifMetadata;
pub use self::image::ImageManipulation;
pub use passthrough::Passthrough;
pub use pdf::{PdfPages, PdfText};
pub use pdf_edit::{PdfCompress, PdfMerge, PdfReorder};
pub use xlsx::XlsxCsv;

/// Registers the built-in plugins under their recipe names. `virus_scan` is
/// only available when a clamd address is configured.
pub fn register_builtin_plugins(manager: &FileManager, settings: &Settings) {
    manager.add_processing_plugin("passthrough", Passthrough);
    manager.add_processing_plugin("annotate", Annotate);
    manager.add_processing_plugin("image_manipulation", ImageManipulation);
    manager.add_processing_plugin("docx_text", DocxText);
    manager.add_processing_plugin("pdf_text", PdfText);
    manager.add_processing_plugin("pdf_pages", PdfPages);
    manager.add_processing_plugin("pdf_merge", PdfMerge);
    manager.add_processing_plugin("pdf_reorder", PdfReorder);
    manager.add_processing_plugin("pdf_compress", PdfCompress);
    manager.add_processing_plugin("exif_metadata", ExifMetadata);
    manager.add_processing_plugin("xlsx_csv", XlsxCsv);

    if let Some(address) = &settings.clamav_address {
        let scanner = ClamAv::new(address, Duration::from_secs(settings.clamav_timeout_secs));
        if let Err(e) = scanner.ping() {
            tracing::warn!("clamd at {} is not reachable yet: {}", address, e);
        }
        manager.add_processing_plugin("virus_scan", scanner);
    }
}

/// Output flavor of the text extraction plugins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    #[default]
    Text,
    Markdown,
}

impl TextFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TextFormat::Text => "txt",
            TextFormat::Markdown => "md",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            TextFormat::Text => "text/plain",
            TextFormat::Markdown => "text/markdown",
        }
    }
}

/// Appends a plugin status at the current percentage.
pub(crate) fn report(process: &mut FileProcess, processor: &str, description: impl Into<String>) {
    let percentage = process.latest_status().map(|s| s.percentage).unwrap_or(0);
    let status = ProcessingStatus::progress(&process.id, processor, description, percentage);
    process.add_processing_update(status);
}

/// Character for an XML entity reference name such as `amp` or `#x41`.
pub(crate) fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => name.strip_prefix('#').and_then(|d| d.parse().ok()),
            };
            code.and_then(char::from_u32)
        }
    }
}

/// `report.docx` + `txt` -> `report.txt`.
pub(crate) fn replace_extension(file_name: &str, extension: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    format!("{}.{}", stem, extension)
}
