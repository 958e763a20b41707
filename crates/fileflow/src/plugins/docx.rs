use std::io::{Cursor, Read, Seek};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use super::TextFormat;
use crate::file::ManagedFile;
use crate::plugin::{Plugin, PluginError};
use crate::status::FileProcess;

const DOCX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocxTextParams {
    #[serde(default)]
    pub format: TextFormat,
}

/// Converts Word documents to plain text or markdown; other files pass
/// through.
pub struct DocxText;

impl Plugin for DocxText {
    type Params = DocxTextParams;

    fn name(&self) -> &str {
        "DocxText"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        params: &DocxTextParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        let mut processed = Vec::with_capacity(files.len());

        for mut file in files {
            if !is_docx(&file) {
                processed.push(file);
                continue;
            }
            super::report(process, self.name(), format!("Converting document: {}", file.file_name));

            let file_name = file.file_name.clone();
            let paragraphs = {
                let content = file.load_content()?;
                let mut archive =
                    zip::ZipArchive::new(Cursor::new(content)).map_err(|e| PluginError::Decode {
                        file: file_name.clone(),
                        reason: format!("Failed to open DOCX: {}", e),
                    })?;
                extract_paragraphs(&mut archive).map_err(|reason| PluginError::Decode {
                    file: file_name.clone(),
                    reason,
                })?
            };

            let text = match params.format {
                TextFormat::Text => paragraphs.join("\n"),
                TextFormat::Markdown => paragraphs
                    .iter()
                    .filter(|p| !p.trim().is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            };

            file.file_name = super::replace_extension(&file.file_name, params.format.extension());
            file.mime_type = params.format.mime_type().to_string();
            file.local_path = None;
            file.size = text.len() as u64;
            file.set_metadata("paragraphs", paragraphs.len());
            file.content = Some(text.into_bytes());
            processed.push(file);
        }

        Ok(processed)
    }
}

fn is_docx(file: &ManagedFile) -> bool {
    file.mime_type.eq_ignore_ascii_case(DOCX_MIME_TYPE)
        || Path::new(&file.file_name)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("docx"))
}

fn extract_paragraphs<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<String>, String> {
    let mut document_xml = archive
        .by_name("word/document.xml")
        .map_err(|e| format!("Failed to find document.xml: {}", e))?;

    let mut xml_content = String::new();
    document_xml
        .read_to_string(&mut xml_content)
        .map_err(|e| format!("Failed to read document.xml: {}", e))?;

    parse_docx_xml(&xml_content)
}

fn parse_docx_xml(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_element = true;
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    let text = e.decode().map_err(|e| format!("XML text error: {}", e))?;
                    current.push_str(&text);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text_element {
                    let name = e.decode().map_err(|e| format!("XML text error: {}", e))?;
                    if let Some(c) = super::resolve_entity(&name) {
                        current.push(c);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parsing error: {}", e)),
            _ => {}
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::DynPlugin;
    use serde_json::json;
    use std::io::Write;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
            <w:body>
                <w:p><w:r><w:t>Hello World</w:t></w:r></w:p>
                <w:p><w:r><w:t>Fish and Chips</w:t></w:r></w:p>
            </w:body>
        </w:document>"#;

    fn docx_bytes(xml: &str) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_parse_paragraphs() {
        let paragraphs = parse_docx_xml(DOCUMENT_XML).unwrap();
        assert_eq!(paragraphs, vec!["Hello World", "Fish and Chips"]);
    }

    #[test]
    fn test_entities_keep_surrounding_spaces() {
        let xml = r#"<w:document xmlns:w="w"><w:body>
            <w:p><w:r><w:t xml:space="preserve">Fish &amp; Chips &#x263A;</w:t></w:r></w:p>
            <w:p><w:r><w:t>a &lt;b&gt;</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let paragraphs = parse_docx_xml(xml).unwrap();
        assert_eq!(paragraphs, vec!["Fish & Chips \u{263A}", "a <b>"]);
    }

    #[test]
    fn test_docx_to_text() {
        let mut process = FileProcess::new("letter.docx", "r");
        let file = ManagedFile::from_bytes("letter.docx", DOCX_MIME_TYPE, docx_bytes(DOCUMENT_XML));

        let out = DocxText.run(vec![file], &serde_json::Value::Null, &mut process).unwrap();
        assert_eq!(out[0].file_name, "letter.txt");
        assert_eq!(out[0].mime_type, "text/plain");
        assert_eq!(
            out[0].content.as_deref(),
            Some(&b"Hello World\nFish and Chips"[..])
        );
    }

    #[test]
    fn test_docx_to_markdown() {
        let mut process = FileProcess::new("letter.docx", "r");
        let file = ManagedFile::from_bytes("letter.docx", "", docx_bytes(DOCUMENT_XML));

        let out = DocxText
            .run(vec![file], &json!({"format": "markdown"}), &mut process)
            .unwrap();
        assert_eq!(out[0].file_name, "letter.md");
        assert_eq!(
            out[0].content.as_deref(),
            Some(&b"Hello World\n\nFish and Chips"[..])
        );
    }

    #[test]
    fn test_invalid_archive_fails() {
        let mut process = FileProcess::new("bad.docx", "r");
        let file = ManagedFile::from_bytes("bad.docx", DOCX_MIME_TYPE, b"not a zip".to_vec());
        let result = DocxText.run(vec![file], &serde_json::Value::Null, &mut process);
        assert!(matches!(result, Err(PluginError::Decode { .. })));
    }

    #[test]
    fn test_other_files_pass_through() {
        let mut process = FileProcess::new("a.txt", "r");
        let file = ManagedFile::from_bytes("a.txt", "text/plain", b"x".to_vec());
        let out = DocxText.run(vec![file], &serde_json::Value::Null, &mut process).unwrap();
        assert_eq!(out[0].file_name, "a.txt");
        assert!(process.processing_updates().is_empty());
    }
}
