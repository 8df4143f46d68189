use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_channel::Receiver;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::types::token::TransferCancellationToken;

/// Sentinel temporary directory selecting in-memory part buffering.
pub const TEMP_DIR_USE_MEMORY: &str = "_memory";

/// Environment variable selecting in-memory part buffering.
pub const TEMP_MEMORY_ENV: &str = "FILE_TRANSFERER_S3_TEMP_MEMORY";

const TEMP_FILE_PREFIX: &str = "file-transfer-s3-tmp-";

/// One part-sized slice of the incoming stream, buffered to a tempfile or to
/// memory. Dropping a chunk removes its tempfile.
pub(crate) struct PartChunk {
    body: ChunkBody,
    pub(crate) size: i64,
}

enum ChunkBody {
    OnDisk(NamedTempFile),
    InMemory(Bytes),
}

impl PartChunk {
    /// Opens the buffered bytes as an SDK byte stream. The chunk must stay
    /// alive until the stream has been fully consumed.
    pub(crate) async fn byte_stream(&self) -> Result<ByteStream> {
        match &self.body {
            ChunkBody::OnDisk(file) => Ok(ByteStream::from_path(file.path())
                .await
                .context("failed to open part tempfile")?),
            ChunkBody::InMemory(bytes) => Ok(ByteStream::from(bytes.clone())),
        }
    }

    #[cfg(test)]
    fn is_in_memory(&self) -> bool {
        matches!(self.body, ChunkBody::InMemory(_))
    }
}

/// Splits `reader` into chunks of at most `part_size` bytes and sends them
/// over the returned channel, buffered by `backlog`.
///
/// The producer stops on source EOF, on a read error (reported through the
/// join handle) or when `token` is cancelled. A consumer that stops early
/// must call [`drain_unread_chunks`] to release buffered chunks.
pub(crate) fn spawn_part_producer<R>(
    mut reader: R,
    part_size: i64,
    backlog: usize,
    temporary_directory: Option<PathBuf>,
    token: TransferCancellationToken,
) -> (Receiver<PartChunk>, JoinHandle<Result<()>>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (sender, receiver) = async_channel::bounded(backlog.max(1));
    let use_memory = temporary_directory.as_deref() == Some(Path::new(TEMP_DIR_USE_MEMORY))
        || env::var(TEMP_MEMORY_ENV).is_ok_and(|value| value == "1");

    let handle = tokio::spawn(async move {
        loop {
            let chunk = match next_chunk(
                &mut reader,
                part_size,
                use_memory,
                temporary_directory.as_deref(),
            )
            .await?
            {
                Some(chunk) => chunk,
                None => break,
            };

            tokio::select! {
                result = sender.send(chunk) => {
                    if result.is_err() {
                        // consumer is gone; the unsent chunk is dropped above
                        break;
                    }
                }
                _ = token.cancelled() => {
                    debug!("part producer cancelled");
                    break;
                }
            }
        }
        Ok(())
    });

    (receiver, handle)
}

/// Closes the channel and drops any chunks still buffered in it, removing
/// their tempfiles.
pub(crate) fn drain_unread_chunks(receiver: &Receiver<PartChunk>) {
    receiver.close();
    while receiver.try_recv().is_ok() {}
}

async fn next_chunk<R>(
    reader: &mut R,
    part_size: i64,
    use_memory: bool,
    temporary_directory: Option<&Path>,
) -> Result<Option<PartChunk>>
where
    R: AsyncRead + Send + Unpin,
{
    if use_memory {
        let mut buffer = Vec::new();
        let size = (&mut *reader)
            .take(part_size as u64)
            .read_to_end(&mut buffer)
            .await
            .context("failed to buffer part to memory")? as i64;
        if size == 0 {
            return Ok(None);
        }
        return Ok(Some(PartChunk {
            body: ChunkBody::InMemory(Bytes::from(buffer)),
            size,
        }));
    }

    let temp_file = match temporary_directory {
        Some(dir) => tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempfile_in(dir),
        None => tempfile::Builder::new().prefix(TEMP_FILE_PREFIX).tempfile(),
    }
    .context("failed to create part tempfile")?;

    let mut file = tokio::fs::File::from_std(
        temp_file
            .reopen()
            .context("failed to reopen part tempfile")?,
    );
    let size = tokio::io::copy(&mut (&mut *reader).take(part_size as u64), &mut file)
        .await
        .context("failed to buffer part to tempfile")? as i64;
    if size == 0 {
        // a final zero-byte read does not emit a chunk
        return Ok(None);
    }

    Ok(Some(PartChunk {
        body: ChunkBody::OnDisk(temp_file),
        size,
    }))
}
