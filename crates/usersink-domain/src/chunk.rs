//! Splitting ordered sequences into bounded chunks.
//!
//! Both the write path ([`Flusher`](crate::flusher::Flusher)) and the read
//! path ([`Resolver`](crate::resolver::Resolver)) cap the size of a single
//! storage call by partitioning their input with [`split_to_chunks`].

use crate::error::{DomainError, DomainResult};

/// Largest accepted chunk size.
pub const MAX_CHUNK_SIZE: usize = i32::MAX as usize;

/// Checks that `chunk_size` is within `1..=MAX_CHUNK_SIZE`.
pub fn validate_chunk_size(chunk_size: usize) -> DomainResult<()> {
    if chunk_size == 0 {
        return Err(DomainError::invalid_configuration(
            "chunk size must be greater than 0",
        ));
    }
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(DomainError::invalid_configuration(format!(
            "chunk size {chunk_size} exceeds maximum of {MAX_CHUNK_SIZE}"
        )));
    }
    Ok(())
}

/// Converts a chunk size read from a signed source.
pub fn chunk_size_from_signed(value: i64) -> DomainResult<usize> {
    if value <= 0 {
        return Err(DomainError::invalid_configuration(format!(
            "chunk size must be greater than 0, got {value}"
        )));
    }
    let chunk_size = usize::try_from(value).map_err(|_| {
        DomainError::invalid_configuration(format!("chunk size {value} is out of range"))
    })?;
    validate_chunk_size(chunk_size)?;
    Ok(chunk_size)
}

/// Partitions `items` into consecutive slices of at most `chunk_size`.
///
/// `None` means no collection was supplied and is rejected with
/// [`DomainError::InvalidArgument`]; an empty slice yields no chunks. The
/// chunk size is validated first, so a bad size is reported even for absent
/// input.
///
/// Concatenating the returned chunks in order reproduces `items` exactly.
pub fn split_to_chunks<T>(items: Option<&[T]>, chunk_size: usize) -> DomainResult<Vec<&[T]>> {
    validate_chunk_size(chunk_size)?;

    let items = items.ok_or_else(|| DomainError::InvalidArgument {
        message: "items to split must be provided".to_string(),
    })?;

    Ok(items.chunks(chunk_size).collect())
}
