/*!
# Overview
s3xfer is a resumable, progress-tracked file transfer library. It moves
potentially very large files (up to multiple terabytes) between storage back
ends over unreliable networks: an interrupted transfer survives process
restarts and resumes from the last durably persisted byte offset without
retransmitting already-uploaded data.

## How it works
The destination keeps a JSON manifest object (`<prefix>/<name>.info`) next to
the destination file. On every transfer call the engine reconciles the source
metadata, the destination state and that manifest to decide whether to
create, resume, restart or finalize the transfer.

The S3 destination implements the transfer as a multipart upload:

- incoming bytes are split into parts buffered to tempfiles (or memory, with
  `FILE_TRANSFERER_S3_TEMP_MEMORY=1`) and uploaded by up to ten concurrent
  workers;
- a tail smaller than the back end's minimum part size is persisted as a
  separate incomplete-part object (`<prefix>/<name>.part`) and reattached on
  the next attempt, so resume offsets need not align to part boundaries;
- finalizing assembles the parts with `CompleteMultipartUpload` after
  verifying they add up to the recorded size.

Transient failures are retried with exponential backoff. A progress tracker
runs alongside the pipeline and emits periodic snapshots.

## Example

```no_run
use std::sync::Arc;

use s3xfer::client::s3::{S3Client, S3ClientConfig};
use s3xfer::storage::s3::{S3Destination, S3Source};
use s3xfer::transfer::progress::progress_callback;
use s3xfer::transfer::{DestinationSpec, SourceSpec, Transferer};
use s3xfer::types::token::create_transfer_cancellation_token;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let source_client = Arc::new(S3Client::new(S3ClientConfig {
        endpoint: "https://s3.us-east-1.amazonaws.com".to_string(),
        bucket: "source-bucket".to_string(),
        region: "us-east-1".to_string(),
        access_key: "AKIA...".to_string(),
        secret_key: "secret".to_string(),
    }));
    let destination_client = Arc::new(S3Client::new(S3ClientConfig {
        endpoint: "https://minio.internal:9000".to_string(),
        bucket: "destination-bucket".to_string(),
        region: "us-east-1".to_string(),
        access_key: "minio".to_string(),
        secret_key: "secret".to_string(),
    }));

    let source = SourceSpec {
        file_path: "videos/movie.mp4".to_string(),
        storage: Arc::new(S3Source::new()),
        client: source_client,
    };
    let destination = DestinationSpec {
        file_path: "backup/movie.mp4".to_string(),
        storage: Arc::new(S3Destination::new()),
        client: destination_client,
    };

    let transferer = Transferer::builder()
        .extension_whitelist(vec!["mp4".to_string(), "mkv".to_string()])
        .build();

    transferer
        .transfer(
            create_transfer_cancellation_token(),
            &source,
            &destination,
            progress_callback(|progress| {
                println!("{}% ({} bytes/s)", progress.percentage, progress.speed);
            }),
        )
        .await
}
```

Concurrent transfers targeting the same destination path are not supported.
*/

pub mod client;
pub mod io;
pub mod storage;
pub mod transfer;
pub mod types;

pub use transfer::progress::{Progress, ProgressCallback, ProgressStatus, progress_callback};
pub use transfer::{
    ChecksumAlgorithm, DestinationSpec, RetryConfig, SourceSpec, Transferer, TransfererBuilder,
};
