//! `{metadata.<key>}` substitution for output file names.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::file::ManagedFile;

static METADATA_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{metadata\.([^}]+)\}").unwrap());

/// Replaces every `{metadata.<key>}` token with the file's metadata value.
///
/// Strings are inserted verbatim, other values use their JSON rendering.
/// Missing keys and `null` become the empty string. Keys are flat, so
/// `{metadata.a.b}` looks up the key `a.b`.
pub fn replace_file_name_variables(template: &str, file: &ManagedFile) -> String {
    METADATA_TOKEN
        .replace_all(template, |caps: &Captures| {
            match file.metadata_value(&caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// Renders a target file name and appends an extension when the rendered
/// name has none: the file's own extension, else `.<format>`.
pub fn render_target_name(template: &str, file: &ManagedFile, format: &str) -> String {
    let rendered = replace_file_name_variables(template, file);
    if Path::new(&rendered).extension().is_some() {
        return rendered;
    }

    let extension = file.extension();
    if !extension.is_empty() {
        format!("{}{}", rendered, extension)
    } else if !format.trim().is_empty() {
        format!("{}.{}", rendered, format.trim().trim_start_matches('.'))
    } else {
        rendered
    }
}
