use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;

use crate::types::TransferInfo;

/// Why a source file was rejected before transfer. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FileRuleError {
    #[error("file size exceeds the maximum allowed size: {got} > {required} bytes")]
    MaxFileSizeExceeded { required: i64, got: i64 },
    #[error("file size does not meet the minimum required size: {got} < {required} bytes")]
    MinFileSizeNotMet { required: i64, got: i64 },
    #[error("file extension is not allowed: {extension}")]
    ExtensionNotAllowed { extension: String },
    #[error("file extension is blocked: {extension}")]
    ExtensionBlocked { extension: String },
    #[error("file was modified before the required time: {required}")]
    ModifiedTooEarly { required: DateTime<Utc> },
    #[error("file was modified after the required time: {required}")]
    ModifiedTooLate { required: DateTime<Utc> },
    #[error("file name does not match the required pattern: {pattern}")]
    FileNamePatternMismatch { pattern: String },
}

/// Admission rules applied to the source file before a transfer starts.
#[derive(Debug, Default, Clone)]
pub struct FileRule {
    pub max_file_size: Option<i64>,
    pub min_file_size: Option<i64>,
    /// Allowed extensions, compared case-insensitively. Empty allows all.
    pub extension_whitelist: Vec<String>,
    /// Blocked extensions, compared case-insensitively.
    pub extension_blacklist: Vec<String>,
    pub modified_after: Option<DateTime<Utc>>,
    pub modified_before: Option<DateTime<Utc>>,
    /// Pattern the base file name must match.
    pub file_name_pattern: Option<Regex>,
}

impl FileRule {
    /// Checks `info` against every configured rule; the first violation is
    /// returned.
    pub fn check(&self, info: &TransferInfo) -> Result<(), FileRuleError> {
        if let Some(required) = self.max_file_size {
            if info.size > required {
                return Err(FileRuleError::MaxFileSizeExceeded {
                    required,
                    got: info.size,
                });
            }
        }
        if let Some(required) = self.min_file_size {
            if info.size < required {
                return Err(FileRuleError::MinFileSizeNotMet {
                    required,
                    got: info.size,
                });
            }
        }

        if !self.extension_whitelist.is_empty()
            && !contains_ignore_case(&self.extension_whitelist, &info.extension)
        {
            return Err(FileRuleError::ExtensionNotAllowed {
                extension: info.extension.clone(),
            });
        }
        if !self.extension_blacklist.is_empty()
            && contains_ignore_case(&self.extension_blacklist, &info.extension)
        {
            return Err(FileRuleError::ExtensionBlocked {
                extension: info.extension.clone(),
            });
        }

        if let (Some(required), Some(mod_time)) = (self.modified_after, info.mod_time) {
            if mod_time < required {
                return Err(FileRuleError::ModifiedTooEarly { required });
            }
        }
        if let (Some(required), Some(mod_time)) = (self.modified_before, info.mod_time) {
            if mod_time > required {
                return Err(FileRuleError::ModifiedTooLate { required });
            }
        }

        if let Some(pattern) = &self.file_name_pattern {
            let base_name = info.path.rsplit('/').next().unwrap_or(&info.path);
            if !pattern.is_match(base_name) {
                return Err(FileRuleError::FileNamePatternMismatch {
                    pattern: pattern.to_string(),
                });
            }
        }

        Ok(())
    }
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    list.iter().any(|item| item.eq_ignore_ascii_case(value))
}
