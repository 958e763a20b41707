//! PDF text extraction and page-range selection.

use std::path::Path;

use lopdf::Document;
use serde::Deserialize;

use super::TextFormat;
use crate::file::ManagedFile;
use crate::plugin::{Plugin, PluginError};
use crate::status::FileProcess;

pub(super) fn is_pdf(file: &ManagedFile) -> bool {
    file.mime_type.eq_ignore_ascii_case("application/pdf")
        || Path::new(&file.file_name)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

pub(super) fn load_document(file: &mut ManagedFile) -> Result<Document, PluginError> {
    let file_name = file.file_name.clone();
    Document::load_mem(file.load_content()?).map_err(|e| PluginError::Decode {
        file: file_name,
        reason: e.to_string(),
    })
}

pub(super) fn save_document(doc: &mut Document, file_name: &str) -> Result<Vec<u8>, PluginError> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| PluginError::Encode {
        file: file_name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(bytes)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PdfTextParams {
    #[serde(default)]
    pub format: TextFormat,
}

/// Replaces each PDF with its extracted text.
pub struct PdfText;

impl Plugin for PdfText {
    type Params = PdfTextParams;

    fn name(&self) -> &str {
        "PdfText"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        params: &PdfTextParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        let mut processed = Vec::with_capacity(files.len());

        for mut file in files {
            if !is_pdf(&file) {
                processed.push(file);
                continue;
            }
            let _span = tracing::info_span!("plugin.pdf_text").entered();
            super::report(process, self.name(), format!("Extracting text: {}", file.file_name));

            let doc = load_document(&mut file)?;
            let mut pages = Vec::new();
            for (page_num, _) in doc.get_pages() {
                match doc.extract_text(&[page_num]) {
                    Ok(text) => pages.push(text.trim().to_string()),
                    Err(e) => {
                        tracing::debug!(page = page_num, "No text extracted: {}", e);
                        pages.push(String::new());
                    }
                }
            }

            let text = match params.format {
                TextFormat::Text => pages.join("\n"),
                TextFormat::Markdown => pages
                    .iter()
                    .enumerate()
                    .map(|(i, page)| format!("## Page {}\n\n{}", i + 1, page))
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            };

            file.file_name = super::replace_extension(&file.file_name, params.format.extension());
            file.mime_type = params.format.mime_type().to_string();
            file.local_path = None;
            file.size = text.len() as u64;
            file.set_metadata("page_count", pages.len());
            file.content = Some(text.into_bytes());
            processed.push(file);
        }

        Ok(processed)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PdfPagesParams {
    /// First page to keep, 1-based. Defaults to the first page.
    pub start_page: Option<u32>,
    /// Last page to keep, inclusive. Defaults to the last page.
    pub end_page: Option<u32>,
}

/// Keeps an inclusive page range of each PDF.
pub struct PdfPages;

impl Plugin for PdfPages {
    type Params = PdfPagesParams;

    fn name(&self) -> &str {
        "PdfPages"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        params: &PdfPagesParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        let mut processed = Vec::with_capacity(files.len());

        for mut file in files {
            if !is_pdf(&file) {
                processed.push(file);
                continue;
            }
            super::report(process, self.name(), format!("Manipulating PDF: {}", file.file_name));

            let mut doc = load_document(&mut file)?;
            let page_count = doc.get_pages().len() as u32;
            let start = params.start_page.unwrap_or(1);
            let end = params.end_page.unwrap_or(page_count);
            if start < 1 || end > page_count || start > end {
                return Err(PluginError::Failed(format!(
                    "invalid page range: start={}, end={} ({} pages)",
                    start, end, page_count
                )));
            }

            let dropped: Vec<u32> = (1..=page_count).filter(|p| *p < start || *p > end).collect();
            if !dropped.is_empty() {
                doc.delete_pages(&dropped);
                doc.prune_objects();
            }

            let bytes = save_document(&mut doc, &file.file_name)?;

            let stem = Path::new(&file.file_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("document")
                .to_string();
            file.file_name = format!("{}_{}-{}.pdf", stem, start, end);
            file.mime_type = "application/pdf".to_string();
            file.local_path = None;
            file.size = bytes.len() as u64;
            file.set_metadata("page_count", end - start + 1);
            file.content = Some(bytes);
            processed.push(file);
        }

        Ok(processed)
    }
}
