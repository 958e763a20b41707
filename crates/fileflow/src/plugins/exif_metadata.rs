//! Exif extraction for photos.

use std::io::Cursor;

use exif::{In, Tag, Value};
use serde_json::Map;

use crate::file::ManagedFile;
use crate::plugin::{NoParams, Plugin, PluginError};
use crate::status::FileProcess;

/// Tags copied into `metadata.exif`, keyed by these names.
const FIELDS: [(&str, Tag); 10] = [
    ("Make", Tag::Make),
    ("Model", Tag::Model),
    ("DateTime", Tag::DateTime),
    ("GPSLatitude", Tag::GPSLatitude),
    ("GPSLongitude", Tag::GPSLongitude),
    ("GPSAltitude", Tag::GPSAltitude),
    ("FocalLength", Tag::FocalLength),
    ("FNumber", Tag::FNumber),
    ("ExposureTime", Tag::ExposureTime),
    ("ISOSpeedRatings", Tag::PhotographicSensitivity),
];

/// Containers that can carry an Exif block.
const EXIF_CONTAINERS: [&str; 6] = [
    "image/jpeg",
    "image/tiff",
    "image/png",
    "image/webp",
    "image/heic",
    "image/heif",
];

/// Copies camera metadata from photos into `metadata.exif`. Images without
/// an Exif block pass through unchanged.
pub struct ExifMetadata;

impl Plugin for ExifMetadata {
    type Params = NoParams;

    fn name(&self) -> &str {
        "ExifMetadataExtractor"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        _params: &NoParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        let mut processed = Vec::with_capacity(files.len());

        for mut file in files {
            let mime = file.mime_type.to_lowercase();
            if !EXIF_CONTAINERS.contains(&mime.as_str()) {
                processed.push(file);
                continue;
            }
            super::report(
                process,
                self.name(),
                format!("Extracting Exif metadata from image: {}", file.file_name),
            );

            let file_name = file.file_name.clone();
            let exif = {
                let content = file.load_content()?;
                exif::Reader::new().read_from_container(&mut Cursor::new(content))
            };
            let exif = match exif {
                Ok(exif) => exif,
                Err(exif::Error::NotFound(_)) => {
                    tracing::debug!(file = %file_name, "No Exif block");
                    processed.push(file);
                    continue;
                }
                Err(e) => {
                    return Err(PluginError::Decode {
                        file: file_name,
                        reason: format!("Failed to read Exif: {}", e),
                    })
                }
            };

            let mut fields = Map::new();
            for (key, tag) in FIELDS {
                if let Some(field) = exif.get_field(tag, In::PRIMARY) {
                    let text = match &field.value {
                        Value::Ascii(parts) => parts
                            .iter()
                            .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
                            .collect::<Vec<_>>()
                            .join(", "),
                        _ => field.display_value().with_unit(&exif).to_string(),
                    };
                    fields.insert(key.to_string(), text.into());
                }
            }

            file.set_metadata("exif", fields);
            processed.push(file);
        }

        Ok(processed)
    }
}
