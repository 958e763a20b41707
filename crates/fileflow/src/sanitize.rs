//! Helpers for file names that come from outside: span attributes and
//! names used as storage paths.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Reduces an untrusted name to a single safe path component.
///
/// Directory parts are dropped, separators and control characters become
/// `_`, and leading dots are stripped so the result is never hidden, `.`
/// or `..`. An empty result becomes `file`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .map(|c| match c {
            c if c.is_control() => '_',
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}
