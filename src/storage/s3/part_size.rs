use crate::types::error::TransferError;

/// Part-count/part-size envelope of an S3-compatible back end.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PartSizeConstraints {
    pub(crate) min_part_size: i64,
    pub(crate) max_part_size: i64,
    pub(crate) preferred_part_size: i64,
    pub(crate) max_multipart_parts: i64,
}

/// Chooses the part size used to split an upload of `size` bytes.
///
/// Uploads up to `preferred_part_size * max_multipart_parts` bytes use the
/// preferred size. Beyond that the size is divided over the maximum part
/// count, rounding up when the division leaves a remainder; rounding up
/// unconditionally would push the result past `max_part_size` exactly when
/// `max_object_size == max_part_size * max_multipart_parts`.
pub(crate) fn calc_optimal_part_size(
    size: i64,
    constraints: &PartSizeConstraints,
) -> Result<i64, TransferError> {
    let optimal_part_size = if size <= constraints.preferred_part_size {
        constraints.preferred_part_size
    } else if size <= constraints.preferred_part_size * constraints.max_multipart_parts {
        constraints.preferred_part_size
    } else if size % constraints.max_multipart_parts == 0 {
        size / constraints.max_multipart_parts
    } else {
        size / constraints.max_multipart_parts + 1
    };

    if optimal_part_size > constraints.max_part_size {
        return Err(TransferError::PartSizeConstraint {
            size,
            optimal_part_size,
            max_part_size: constraints.max_part_size,
        });
    }

    Ok(optimal_part_size)
}
