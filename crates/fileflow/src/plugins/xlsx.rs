//! Spreadsheet to CSV conversion.

use std::borrow::Cow;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use zip::ZipArchive;

use crate::file::ManagedFile;
use crate::plugin::{Plugin, PluginError};
use crate::status::FileProcess;

const XLSX_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const DEFAULT_SHEET: &str = "xl/worksheets/sheet1.xml";
/// Column `XFD`, the widest a sheet can be.
const MAX_COLUMNS: usize = 16_384;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XlsxCsvParams {
    /// Sheet to export. Defaults to the first sheet of the workbook.
    pub sheet: Option<String>,
}

/// Exports one sheet of an Excel workbook as CSV; other files pass through.
pub struct XlsxCsv;

impl Plugin for XlsxCsv {
    type Params = XlsxCsvParams;

    fn name(&self) -> &str {
        "FormatConverter"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        params: &XlsxCsvParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        let mut processed = Vec::with_capacity(files.len());

        for mut file in files {
            if !is_xlsx(&file) {
                processed.push(file);
                continue;
            }
            super::report(process, self.name(), format!("Converting spreadsheet: {}", file.file_name));

            let file_name = file.file_name.clone();
            let rows = {
                let content = file.load_content()?;
                let mut archive = ZipArchive::new(Cursor::new(content)).map_err(|e| {
                    PluginError::Decode {
                        file: file_name.clone(),
                        reason: format!("Failed to open XLSX: {}", e),
                    }
                })?;
                read_sheet(&mut archive, params.sheet.as_deref(), &file_name)?
            };
            let csv = to_csv(&rows);

            file.file_name = super::replace_extension(&file.file_name, "csv");
            file.mime_type = "text/csv".to_string();
            file.local_path = None;
            file.size = csv.len() as u64;
            file.set_metadata("rows", rows.len());
            file.content = Some(csv.into_bytes());
            processed.push(file);
        }

        Ok(processed)
    }
}

fn is_xlsx(file: &ManagedFile) -> bool {
    file.mime_type.eq_ignore_ascii_case(XLSX_MIME_TYPE)
        || Path::new(&file.file_name)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"))
}

fn read_sheet<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    sheet: Option<&str>,
    file_name: &str,
) -> Result<Vec<Vec<String>>, PluginError> {
    let decode = |reason: String| PluginError::Decode {
        file: file_name.to_string(),
        reason,
    };

    let shared = match read_part(archive, "xl/sharedStrings.xml").map_err(decode)? {
        Some(xml) => parse_shared_strings(&xml).map_err(decode)?,
        None => Vec::new(),
    };

    let workbook = read_part(archive, "xl/workbook.xml").map_err(decode)?;
    let rel_id = workbook.as_deref().and_then(|xml| sheet_rel_id(xml, sheet));
    if let (Some(name), None) = (sheet, &rel_id) {
        return Err(PluginError::Failed(format!("sheet not found: {}", name)));
    }

    let rels = read_part(archive, "xl/_rels/workbook.xml.rels").map_err(decode)?;
    let target = match (rel_id, rels) {
        (Some(id), Some(rels)) => relationship_target(&rels, &id),
        _ => None,
    };
    let path = match target {
        Some(target) => match target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("xl/{}", target),
        },
        None => DEFAULT_SHEET.to_string(),
    };

    let xml = read_part(archive, &path)
        .map_err(decode)?
        .ok_or_else(|| decode(format!("Missing worksheet {}", path)))?;
    parse_sheet(&xml, &shared).map_err(decode)
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>, String> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(format!("Failed to open {}: {}", name, e)),
    };
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| format!("Failed to read {}: {}", name, e))?;
    Ok(Some(xml))
}

fn attribute(element: &BytesStart, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Relationship id of the named sheet, or of the first one.
fn sheet_rel_id(workbook: &str, name: Option<&str>) -> Option<String> {
    let mut reader = Reader::from_str(workbook);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                let matches = match name {
                    Some(name) => attribute(&e, b"name").as_deref() == Some(name),
                    None => true,
                };
                if matches {
                    return attribute(&e, b"id");
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

fn relationship_target(rels: &str, id: &str) -> Option<String> {
    let mut reader = Reader::from_str(rels);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship"
                    && attribute(&e, b"Id").as_deref() == Some(id) =>
            {
                return attribute(&e, b"Target");
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // Phonetic runs (`rPh`) are reading hints, not cell text.
    let mut in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(e)) if in_text && !in_phonetic => {
                current.push_str(&e.decode().map_err(|e| format!("XML text error: {}", e))?);
            }
            Ok(Event::GeneralRef(e)) if in_text && !in_phonetic => {
                let name = e.decode().map_err(|e| format!("XML text error: {}", e))?;
                if let Some(c) = super::resolve_entity(&name) {
                    current.push(c);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parsing error: {}", e)),
            _ => {}
        }
    }
    Ok(strings)
}

struct Cell {
    column: Option<usize>,
    kind: String,
    value: String,
}

impl Cell {
    fn from_start(element: &BytesStart) -> Self {
        Self {
            column: attribute(element, b"r").and_then(|r| column_index(&r)),
            kind: attribute(element, b"t").unwrap_or_default(),
            value: String::new(),
        }
    }

    fn resolve(self, shared: &[String]) -> Result<String, String> {
        match self.kind.as_str() {
            "s" => self
                .value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared.get(i))
                .cloned()
                .ok_or_else(|| format!("Invalid shared string index: {}", self.value)),
            "b" => Ok(if self.value.trim() == "1" { "TRUE" } else { "FALSE" }.to_string()),
            _ => Ok(self.value),
        }
    }
}

/// `A1` -> 0, `AB7` -> 27.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    letters
        .iter()
        .try_fold(0usize, |acc, b| acc.checked_mul(26)?.checked_add((b - b'A' + 1) as usize))
        .map(|n| n - 1)
}

fn place(row: &mut Vec<String>, column: Option<usize>, text: String) -> Result<(), String> {
    let index = column.unwrap_or(row.len());
    if index >= MAX_COLUMNS {
        return Err(format!("Column {} is out of range", index + 1));
    }
    if row.len() <= index {
        row.resize(index + 1, String::new());
    }
    row[index] = text;
    Ok(())
}

/// Pads `rows` with empty rows up to the row's `r` attribute.
fn pad_rows(rows: &mut Vec<Vec<String>>, element: &BytesStart) {
    if let Some(number) = attribute(element, b"r").and_then(|r| r.parse::<usize>().ok()) {
        while rows.len() + 1 < number {
            rows.push(Vec::new());
        }
    }
}

fn parse_sheet(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, String> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<Cell> = None;
    let mut capturing = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    pad_rows(&mut rows, &e);
                    row.clear();
                }
                b"c" => cell = Some(Cell::from_start(&e)),
                b"v" | b"t" if cell.is_some() => capturing = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"row" => {
                pad_rows(&mut rows, &e);
                rows.push(Vec::new());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => capturing = false,
                b"c" => {
                    if let Some(done) = cell.take() {
                        let column = done.column;
                        place(&mut row, column, done.resolve(shared)?)?;
                    }
                }
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {}
            },
            Ok(Event::Text(e)) if capturing => {
                let text = e.decode().map_err(|e| format!("XML text error: {}", e))?;
                if let Some(cell) = cell.as_mut() {
                    cell.value.push_str(&text);
                }
            }
            Ok(Event::GeneralRef(e)) if capturing => {
                let name = e.decode().map_err(|e| format!("XML text error: {}", e))?;
                if let (Some(cell), Some(c)) = (cell.as_mut(), super::resolve_entity(&name)) {
                    cell.value.push(c);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parsing error: {}", e)),
            _ => {}
        }
    }
    Ok(rows)
}

/// RFC 4180 field quoting, one `\n`-terminated line per row.
fn to_csv(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        let fields: Vec<Cow<str>> = row.iter().map(|f| csv_field(f)).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(field: &str) -> Cow<'_, str> {
    let needs_quotes = field.contains(&[',', '"', '\r', '\n'][..])
        || field.starts_with(&[' ', '\t'][..]);
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
