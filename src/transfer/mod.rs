use std::cmp;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::io::MeteredReader;
use crate::storage::{Destination, Source};
use crate::transfer::file_rule::FileRule;
use crate::transfer::progress::{
    Progress, ProgressCallbackHandle, ProgressStatus, ProgressTracker,
};
use crate::types::TransferInfo;
use crate::types::error::{
    AttemptError, TransferError, is_cancelled_error, is_cannot_finalize_error,
    is_file_not_exists_error,
};
use crate::types::token::TransferCancellationToken;

pub mod file_rule;
pub mod progress;

const DEFAULT_MAX_FILE_SIZE: i64 = 5 << 40;
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Checksum algorithms a transfer can record. The tag is stored for future
/// verification work and not consumed by any code path yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    #[default]
    None,
    Crc32,
    Md5,
    Sha256,
}

/// Retry behavior for retryable transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_retry_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub initial_delay: Duration,
    /// Upper bound of the backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// The source side of a transfer: a file path, the adapter reading it and
/// the client the adapter connects through.
#[derive(Clone)]
pub struct SourceSpec {
    pub file_path: String,
    pub storage: Arc<dyn Source>,
    pub client: Arc<dyn Client>,
}

impl SourceSpec {
    fn validate(&self) -> Result<(), TransferError> {
        if self.file_path.is_empty() {
            return Err(TransferError::InvalidArgument {
                reason: "source file path is required".to_string(),
            });
        }
        Ok(())
    }
}

/// The destination side of a transfer.
#[derive(Clone)]
pub struct DestinationSpec {
    pub file_path: String,
    pub storage: Arc<dyn Destination>,
    pub client: Arc<dyn Client>,
}

impl DestinationSpec {
    fn validate(&self) -> Result<(), TransferError> {
        if self.file_path.is_empty() {
            return Err(TransferError::InvalidArgument {
                reason: "destination file path is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Resumable file-transfer engine.
///
/// Reconciles source state, destination state and the destination's transfer
/// manifest to decide whether to create, resume, restart or finalize a
/// transfer. Transient failures are retried with exponential backoff; an
/// interrupted transfer resumes from the last durably persisted offset on the
/// next call.
pub struct Transferer {
    file_rule: FileRule,
    refresh_progress_interval: Duration,
    #[allow(dead_code)]
    checksum_algorithm: ChecksumAlgorithm,
    disabled_retry: bool,
    retry_config: RetryConfig,
}

impl Transferer {
    pub fn builder() -> TransfererBuilder {
        TransfererBuilder::default()
    }

    /// Transfers the source file to the destination, emitting progress
    /// snapshots through `callback`.
    ///
    /// Cancelling `token` terminates the transfer cleanly without surfacing
    /// an error; already-uploaded bytes stay on the destination for a future
    /// resume.
    pub async fn transfer(
        &self,
        token: TransferCancellationToken,
        source: &SourceSpec,
        destination: &DestinationSpec,
        callback: ProgressCallbackHandle,
    ) -> Result<()> {
        source.validate()?;
        destination.validate()?;

        let mut delay = self.retry_config.initial_delay;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self
                .process_resumable_transfer(&token, source, destination, &callback)
                .await
            {
                Ok(()) => return Ok(()),
                Err(attempt_error) => {
                    if self.disabled_retry
                        || !attempt_error.retryable
                        || attempt >= self.retry_config.max_retry_attempts
                    {
                        info!(
                            src_path = source.file_path,
                            dst_path = destination.file_path,
                            error = %attempt_error.inner,
                            "failed to transfer file"
                        );
                        return Err(attempt_error.inner);
                    }

                    warn!(
                        src_path = source.file_path,
                        dst_path = destination.file_path,
                        error = %attempt_error.inner,
                        retry_attempt = attempt,
                        "retrying file transfer"
                    );
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!("transfer cancelled while waiting to retry");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = cmp::min(delay * 2, self.retry_config.max_delay);
                }
            }
        }
    }

    /// One full attempt: reconcile source and destination state, stream the
    /// remaining bytes and finalize.
    async fn process_resumable_transfer(
        &self,
        token: &TransferCancellationToken,
        source: &SourceSpec,
        destination: &DestinationSpec,
        callback: &ProgressCallbackHandle,
    ) -> Result<(), AttemptError> {
        let src_info = source
            .storage
            .get_file_info(token.clone(), &source.file_path, source.client.clone())
            .await
            .map_err(AttemptError::permanent)?;

        self.file_rule
            .check(&src_info)
            .map_err(|rule_error| AttemptError::permanent(rule_error.into()))?;

        let mut dest_info = self
            .get_or_create_destination_file(token, destination, &src_info)
            .await
            .map_err(AttemptError::permanent)?;

        if dest_info.offset == src_info.size && dest_info.finish_time.is_some() {
            info!(
                src_path = source.file_path,
                dst_path = destination.file_path,
                "file transfer is finished, please re-check the destination file"
            );
            return Ok(());
        }

        dest_info = self
            .verify_file_changes(token, destination, &src_info, dest_info)
            .await
            .map_err(AttemptError::permanent)?;

        let reader = source
            .storage
            .get_file_from_offset(
                token.clone(),
                &source.file_path,
                dest_info.offset,
                source.client.clone(),
            )
            .await
            .map_err(AttemptError::permanent)?;

        let start_time = dest_info.start_time.unwrap_or_else(Utc::now);
        let transferred = Arc::new(AtomicI64::new(dest_info.offset));
        let proxy = MeteredReader::new(reader, transferred.clone(), None);

        let interrupted = TransferCancellationToken::new();
        let completed = TransferCancellationToken::new();
        tokio::spawn(
            ProgressTracker::new(
                transferred.clone(),
                src_info.size,
                start_time,
                self.refresh_progress_interval,
            )
            .track(
                token.clone(),
                interrupted.clone(),
                completed.clone(),
                callback.clone(),
            ),
        );

        if dest_info.offset == 0 {
            info!(
                src_path = source.file_path,
                dst_path = destination.file_path,
                total_size = src_info.size,
                "starting file transfer"
            );
        } else {
            info!(
                src_path = source.file_path,
                dst_path = destination.file_path,
                from_offset = dest_info.offset,
                to_offset = src_info.size,
                "resuming file transfer"
            );
        }

        if let Err(chunk_error) = destination
            .storage
            .transfer_file_chunk(
                token.clone(),
                &destination.file_path,
                Box::new(proxy),
                dest_info.offset,
                destination.client.clone(),
            )
            .await
        {
            if token.is_cancelled() || is_cancelled_error(&chunk_error) {
                info!(
                    src_path = source.file_path,
                    dst_path = destination.file_path,
                    "file transfer is cancelled in the middle"
                );
                interrupted.cancel();
                return Ok(());
            }
            self.emit_error_progress(callback, &chunk_error, start_time)
                .await;
            interrupted.cancel();
            return Err(AttemptError::retryable(chunk_error));
        }

        if let Err(finalize_error) = destination
            .storage
            .finalize_transfer(
                token.clone(),
                &destination.file_path,
                destination.client.clone(),
            )
            .await
        {
            if is_cannot_finalize_error(&finalize_error) {
                if transferred.load(Ordering::SeqCst) < src_info.size {
                    interrupted.cancel();
                    return Err(AttemptError::retryable(finalize_error));
                }
                // everything was transferred but the parts do not assemble;
                // the destination is unusable and a retry would not help
                if let Err(delete_error) = destination
                    .storage
                    .delete_file(
                        token.clone(),
                        &destination.file_path,
                        destination.client.clone(),
                    )
                    .await
                {
                    warn!(
                        dst_path = destination.file_path,
                        error = %delete_error,
                        "failed to clean up destination after finalize mismatch"
                    );
                    interrupted.cancel();
                    return Err(AttemptError::permanent(finalize_error));
                }
            }
            self.emit_error_progress(callback, &finalize_error, start_time)
                .await;
            interrupted.cancel();
            return Err(AttemptError::permanent(finalize_error));
        }
        completed.cancel();

        let finish_at = Utc::now();
        let duration = (finish_at - start_time).to_std().unwrap_or_default();
        callback
            .lock()
            .await
            .on_progress(Progress {
                status: ProgressStatus::Finished,
                total_size: src_info.size,
                transferred_size: transferred.load(Ordering::SeqCst),
                percentage: 100,
                speed: transferred.load(Ordering::SeqCst) / duration.as_secs().max(1) as i64,
                duration,
                error: None,
                start_at: Some(start_time),
                finish_at: Some(finish_at),
            })
            .await;

        info!(
            src_path = source.file_path,
            dst_path = destination.file_path,
            total_size = src_info.size,
            "file transfer is finished"
        );
        Ok(())
    }

    /// Reads the destination manifest, creating the destination file first
    /// when no transfer exists yet.
    async fn get_or_create_destination_file(
        &self,
        token: &TransferCancellationToken,
        destination: &DestinationSpec,
        src_info: &TransferInfo,
    ) -> Result<TransferInfo> {
        match destination
            .storage
            .get_file_info(
                token.clone(),
                &destination.file_path,
                destination.client.clone(),
            )
            .await
        {
            Ok(dest_info) => Ok(dest_info),
            Err(e) if is_file_not_exists_error(&e) => {
                destination
                    .storage
                    .create_file(
                        token.clone(),
                        &destination.file_path,
                        src_info.size,
                        src_info.mod_time.unwrap_or(DateTime::UNIX_EPOCH),
                        destination.client.clone(),
                    )
                    .await?;
                destination
                    .storage
                    .get_file_info(
                        token.clone(),
                        &destination.file_path,
                        destination.client.clone(),
                    )
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Resume is meaningless when the source content changed: on a mod-time
    /// mismatch the destination is deleted and re-created from scratch.
    async fn verify_file_changes(
        &self,
        token: &TransferCancellationToken,
        destination: &DestinationSpec,
        src_info: &TransferInfo,
        dest_info: TransferInfo,
    ) -> Result<TransferInfo> {
        if src_info.mod_time == dest_info.mod_time {
            return Ok(dest_info);
        }

        info!(
            src_mod_time = ?src_info.mod_time,
            dst_mod_time = ?dest_info.mod_time,
            "source file has been modified, re-creating destination file"
        );
        destination
            .storage
            .delete_file(
                token.clone(),
                &destination.file_path,
                destination.client.clone(),
            )
            .await?;
        destination
            .storage
            .create_file(
                token.clone(),
                &destination.file_path,
                src_info.size,
                src_info.mod_time.unwrap_or(DateTime::UNIX_EPOCH),
                destination.client.clone(),
            )
            .await?;
        destination
            .storage
            .get_file_info(
                token.clone(),
                &destination.file_path,
                destination.client.clone(),
            )
            .await
    }

    async fn emit_error_progress(
        &self,
        callback: &ProgressCallbackHandle,
        error: &anyhow::Error,
        start_time: DateTime<Utc>,
    ) {
        callback
            .lock()
            .await
            .on_progress(Progress {
                status: ProgressStatus::InError,
                error: Some(format!("{error:#}")),
                duration: (Utc::now() - start_time).to_std().unwrap_or_default(),
                ..Default::default()
            })
            .await;
    }
}

impl Default for Transferer {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Configures and builds a [`Transferer`].
pub struct TransfererBuilder {
    file_rule: FileRule,
    refresh_progress_interval: Duration,
    checksum_algorithm: ChecksumAlgorithm,
    disabled_retry: bool,
    retry_config: RetryConfig,
}

impl Default for TransfererBuilder {
    fn default() -> Self {
        Self {
            file_rule: FileRule {
                max_file_size: Some(DEFAULT_MAX_FILE_SIZE),
                ..Default::default()
            },
            refresh_progress_interval: DEFAULT_REFRESH_INTERVAL,
            checksum_algorithm: ChecksumAlgorithm::None,
            disabled_retry: false,
            retry_config: RetryConfig::default(),
        }
    }
}

impl TransfererBuilder {
    /// Rejects source files larger than `size`. Non-positive values restore
    /// the 5 TiB default.
    pub fn max_file_size(mut self, size: i64) -> Self {
        self.file_rule.max_file_size = if size > 0 {
            Some(size)
        } else {
            Some(DEFAULT_MAX_FILE_SIZE)
        };
        self
    }

    /// Rejects source files smaller than `size`.
    pub fn min_file_size(mut self, size: i64) -> Self {
        self.file_rule.min_file_size = if size > 0 { Some(size) } else { None };
        self
    }

    /// Restricts transfers to the given extensions (case-insensitive).
    pub fn extension_whitelist(mut self, extensions: Vec<String>) -> Self {
        self.file_rule.extension_whitelist = extensions;
        self
    }

    /// Blocks transfers of the given extensions (case-insensitive).
    pub fn extension_blacklist(mut self, extensions: Vec<String>) -> Self {
        self.file_rule.extension_blacklist = extensions;
        self
    }

    pub fn modified_after(mut self, mod_time: DateTime<Utc>) -> Self {
        self.file_rule.modified_after = Some(mod_time);
        self
    }

    pub fn modified_before(mut self, mod_time: DateTime<Utc>) -> Self {
        self.file_rule.modified_before = Some(mod_time);
        self
    }

    /// Requires the base file name to match `pattern`.
    pub fn file_name_pattern(mut self, pattern: Regex) -> Self {
        self.file_rule.file_name_pattern = Some(pattern);
        self
    }

    /// Interval between progress snapshots. Zero restores the 1s default.
    pub fn progress_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_progress_interval = if interval.is_zero() {
            DEFAULT_REFRESH_INTERVAL
        } else {
            interval
        };
        self
    }

    /// Records the checksum algorithm on the engine. Not consumed by any
    /// verification path yet.
    pub fn checksum_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum_algorithm = algorithm;
        self
    }

    /// Disables all retries, regardless of the configured retry settings.
    pub fn disabled_retry(mut self) -> Self {
        self.disabled_retry = true;
        self
    }

    /// Overrides the retry settings. Zero fields keep their defaults.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        let defaults = RetryConfig::default();
        self.retry_config = RetryConfig {
            max_retry_attempts: if config.max_retry_attempts == 0 {
                defaults.max_retry_attempts
            } else {
                config.max_retry_attempts
            },
            initial_delay: if config.initial_delay.is_zero() {
                defaults.initial_delay
            } else {
                config.initial_delay
            },
            max_delay: if config.max_delay.is_zero() {
                defaults.max_delay
            } else {
                config.max_delay
            },
        };
        self
    }

    pub fn build(self) -> Transferer {
        Transferer {
            file_rule: self.file_rule,
            refresh_progress_interval: self.refresh_progress_interval,
            checksum_algorithm: self.checksum_algorithm,
            disabled_retry: self.disabled_retry,
            retry_config: self.retry_config,
        }
    }
}
