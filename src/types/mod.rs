use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::error::TransferError;

pub mod error;
pub mod token;

/// State of a transfer, persisted as a JSON sidecar object next to the
/// destination file.
///
/// Source adapters return the same shape with only the metadata of the source
/// file filled in (`path`, `size`, `name`, `extension`, `mod_time`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInfo {
    /// Path of the destination file.
    pub path: String,

    /// Size of the file in bytes (source = destination).
    pub size: i64,

    /// Name of the destination file, without extension.
    pub name: String,

    /// File extension, without the leading dot. Always non-empty.
    pub extension: String,

    /// Modification time of the source file at transfer creation. A mismatch
    /// on resume means the source changed and the transfer restarts from zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_time: Option<DateTime<Utc>>,

    /// When the destination file was initiated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// When the destination file was finalized. Unset until then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,

    /// Byte progress durably reflected on the destination (zero-based index
    /// of the next byte to transfer).
    pub offset: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Vec<u8>>,

    /// Back-end specific hooks, e.g. the S3 multipart upload coordinates.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Components of a transfer file path in the form `<prefix>/<name>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileParts {
    pub prefix: String,
    pub name: String,
    pub extension: String,
}

impl FileParts {
    /// Splits `file_path` into prefix, base name and extension. A path
    /// without extension is rejected.
    pub fn parse(file_path: &str) -> Result<Self, TransferError> {
        if file_path.is_empty() {
            return Err(TransferError::InvalidArgument {
                reason: "file path is required".to_string(),
            });
        }

        let (prefix, base_name) = match file_path.rsplit_once('/') {
            Some((prefix, base_name)) => (prefix.to_string(), base_name),
            None => (String::new(), file_path),
        };

        let Some((name, extension)) = base_name.rsplit_once('.') else {
            return Err(TransferError::ExtensionRequired {
                path: file_path.to_string(),
            });
        };
        if extension.is_empty() {
            return Err(TransferError::ExtensionRequired {
                path: file_path.to_string(),
            });
        }

        Ok(Self {
            prefix,
            name: name.to_string(),
            extension: extension.to_string(),
        })
    }
}

/// Derives a sibling path of `file_path` with the given extension, e.g.
/// `videos/movie.mp4` with `part` becomes `videos/movie.part`.
pub fn derived_path(file_path: &str, extension: &str) -> Result<String, TransferError> {
    let parts = FileParts::parse(file_path)?;
    if parts.prefix.is_empty() {
        Ok(format!("{}.{}", parts.name, extension))
    } else {
        Ok(format!("{}/{}.{}", parts.prefix, parts.name, extension))
    }
}

/// Path of the sidecar object holding the JSON [`TransferInfo`] for
/// `file_path`.
pub fn info_path(file_path: &str) -> Result<String, TransferError> {
    derived_path(file_path, "info")
}
