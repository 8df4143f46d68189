use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use crate::client::Client;
use crate::types::TransferInfo;
use crate::types::token::TransferCancellationToken;

pub mod s3;

/// A readable byte stream handed from a source adapter to a destination
/// adapter.
pub type TransferStream = Box<dyn AsyncRead + Send + Unpin>;

/// Read-only view of a storage back end.
#[async_trait]
pub trait Source: Send + Sync {
    /// Fetches the metadata of the file at `file_path`.
    async fn get_file_info(
        &self,
        token: TransferCancellationToken,
        file_path: &str,
        client: Arc<dyn Client>,
    ) -> Result<TransferInfo>;

    /// Opens a byte stream over `file_path` starting at `offset`.
    async fn get_file_from_offset(
        &self,
        token: TransferCancellationToken,
        file_path: &str,
        offset: i64,
        client: Arc<dyn Client>,
    ) -> Result<TransferStream>;

    fn close(&self) {}
}

/// Read/write view of a storage back end.
///
/// Concurrent transfers targeting the same destination path are not
/// supported; callers must serialize per destination file.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Reads the transfer manifest of `file_path`. Fails with
    /// [`crate::types::error::TransferError::FileNotExists`] when no transfer
    /// exists yet.
    async fn get_file_info(
        &self,
        token: TransferCancellationToken,
        file_path: &str,
        client: Arc<dyn Client>,
    ) -> Result<TransferInfo>;

    /// Initiates a transfer of `size` bytes to `file_path` and persists its
    /// manifest. `mod_time` is the source modification time used to detect
    /// source changes on resume.
    async fn create_file(
        &self,
        token: TransferCancellationToken,
        file_path: &str,
        size: i64,
        mod_time: DateTime<Utc>,
        client: Arc<dyn Client>,
    ) -> Result<()>;

    /// Appends bytes from `reader` at `offset`. Returns the number of bytes
    /// durably accepted, excluding any carried-over incomplete part.
    async fn transfer_file_chunk(
        &self,
        token: TransferCancellationToken,
        file_path: &str,
        reader: TransferStream,
        offset: i64,
        client: Arc<dyn Client>,
    ) -> Result<i64>;

    /// Makes the fully transferred destination visible as a complete file.
    async fn finalize_transfer(
        &self,
        token: TransferCancellationToken,
        file_path: &str,
        client: Arc<dyn Client>,
    ) -> Result<()>;

    /// Removes the destination data and its manifest.
    async fn delete_file(
        &self,
        token: TransferCancellationToken,
        file_path: &str,
        client: Arc<dyn Client>,
    ) -> Result<()>;

    fn close(&self) {}
}
