use anyhow::Error;
use thiserror::Error;

/// Error kinds surfaced at the transfer boundary.
#[derive(Error, Debug, PartialEq)]
pub enum TransferError {
    #[error("file path does not exist")]
    FileNotExists,
    #[error("file extension is required: {path}")]
    ExtensionRequired { path: String },
    #[error("invalid transfer argument: {reason}")]
    InvalidArgument { reason: String },
    #[error("file size exceeds maximum object size ({size} > {max_object_size})")]
    FileTooLarge { size: i64, max_object_size: i64 },
    #[error("client invalid, expected S3")]
    InvalidS3Client,
    #[error(
        "optimal part size {optimal_part_size} to upload {size} bytes exceeds maximum part size {max_part_size}"
    )]
    PartSizeConstraint {
        size: i64,
        optimal_part_size: i64,
        max_part_size: i64,
    },
    #[error("file or object cannot finalize, please retry")]
    CannotFinalize,
    #[error("short read of incomplete part object")]
    ShortRead,
    #[error("cancelled")]
    Cancelled,
}

pub fn is_cancelled_error(e: &Error) -> bool {
    matches!(
        e.downcast_ref::<TransferError>(),
        Some(TransferError::Cancelled)
    )
}

pub fn is_file_not_exists_error(e: &Error) -> bool {
    matches!(
        e.downcast_ref::<TransferError>(),
        Some(TransferError::FileNotExists)
    )
}

pub fn is_cannot_finalize_error(e: &Error) -> bool {
    matches!(
        e.downcast_ref::<TransferError>(),
        Some(TransferError::CannotFinalize)
    )
}

/// Outcome of one transfer attempt. `retryable` tells the retry loop whether
/// the attempt may be re-invoked; the loop always hands `inner` to the caller
/// so the root cause is visible.
#[derive(Debug)]
pub(crate) struct AttemptError {
    pub(crate) inner: Error,
    pub(crate) retryable: bool,
}

impl AttemptError {
    pub(crate) fn permanent(inner: Error) -> Self {
        Self {
            inner,
            retryable: false,
        }
    }

    pub(crate) fn retryable(inner: Error) -> Self {
        Self {
            inner,
            retryable: true,
        }
    }
}
