use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicI64;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::operation::list_parts::ListPartsError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::client::{Client, S3Session};
use crate::io::{MeteredReader, bandwidth_limiter};
use crate::storage::s3::api::S3Api;
use crate::storage::s3::part_producer::{
    TEMP_DIR_USE_MEMORY, drain_unread_chunks, spawn_part_producer,
};
use crate::storage::s3::part_size::{PartSizeConstraints, calc_optimal_part_size};
use crate::storage::{Destination, Source, TransferStream};
use crate::types::error::TransferError;
use crate::types::token::TransferCancellationToken;
use crate::types::{FileParts, TransferInfo, derived_path, info_path};

pub mod api;
mod part_producer;
mod part_size;

const BUCKET_META: &str = "bucket";
const OBJECT_KEY_META: &str = "objectKey";
const MULTIPART_KEY_META: &str = "multipartKey";
const MULTIPART_ID_META: &str = "multipartID";
const IS_SINGLE_PART_META: &str = "isSinglePart";

const UPLOAD_CONCURRENCY: usize = 10;

const MIN_SPEED: f64 = 1024.0 * 1024.0;
const MAX_SPEED: f64 = 150.0 * 1024.0 * 1024.0;
// aim for uploads to take at least this many seconds
const BASE_TIME_SECS: f64 = 60.0;

const MISSING_OBJECT_CODES: &[&str] = &["NoSuchKey", "NotFound", "AccessDenied", "Forbidden"];

/// Destination backed by AWS S3 or any S3-compatible store.
///
/// Each transfer is an S3 multipart upload plus two sidecar objects: the
/// `.info` manifest and, between attempts, at most one `.part` object holding
/// a tail smaller than `min_part_size` so resume offsets need not align to
/// part boundaries.
pub struct S3Destination {
    /// Maximum size an object can have on the back end.
    pub max_object_size: i64,

    /// Minimum size of a single uploaded part. A smaller non-final chunk is
    /// carried over as the incomplete-part object.
    pub min_part_size: i64,

    /// Maximum size of a single uploaded part.
    pub max_part_size: i64,

    /// Part size used whenever the upload fits the part-count limit with it.
    pub preferred_part_size: i64,

    /// Maximum number of parts a multipart upload may have.
    pub max_multipart_parts: i64,

    /// Number of chunks that may be buffered ahead of the part uploaders.
    pub max_buffered_parts: usize,

    /// Where part tempfiles are created. `None` uses the OS default; the
    /// `_memory` sentinel buffers parts in memory instead.
    pub temporary_directory: Option<PathBuf>,

    /// Uploads parts through a manually issued presigned request so the SDK
    /// does not hash the body bytes. Experimental.
    pub disable_content_hashes: bool,

    conns: Mutex<HashMap<String, S3Session>>,
}

impl S3Destination {
    pub fn new() -> Self {
        Self {
            max_object_size: 5 * 1024 * 1024 * 1024 * 1024,
            min_part_size: 5 * 1024 * 1024,
            max_part_size: 5 * 1024 * 1024 * 1024,
            preferred_part_size: 50 * 1024 * 1024,
            max_multipart_parts: 10_000,
            max_buffered_parts: 20,
            temporary_directory: None,
            disable_content_hashes: false,
            conns: Mutex::new(HashMap::new()),
        }
    }

    fn part_size_constraints(&self) -> PartSizeConstraints {
        PartSizeConstraints {
            min_part_size: self.min_part_size,
            max_part_size: self.max_part_size,
            preferred_part_size: self.preferred_part_size,
            max_multipart_parts: self.max_multipart_parts,
        }
    }

    fn part_temp_dir(&self) -> Option<&Path> {
        self.temporary_directory
            .as_deref()
            .filter(|dir| dir.as_os_str() != TEMP_DIR_USE_MEMORY)
    }

    async fn download_incomplete_part(&self, state: &UploadState) -> Result<tokio::fs::File> {
        let output = match state
            .api
            .get_object(&state.bucket, &state.multipart_key, None)
            .await
        {
            Ok(output) => output,
            Err(e) if is_missing_incomplete_part_get_error(&e) => {
                return Err(anyhow!(
                    "expected an incomplete part object but did not find any"
                ));
            }
            Err(e) => return Err(e.context("failed to download incomplete part object")),
        };
        let content_length = output.content_length().unwrap_or_default();

        let std_file = match self.part_temp_dir() {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        }
        .context("failed to create tempfile for incomplete part")?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut body = output.body.into_async_read();
        let copied = tokio::io::copy(&mut body, &mut file)
            .await
            .context("failed to buffer incomplete part")? as i64;
        if copied < content_length {
            return Err(TransferError::ShortRead.into());
        }

        file.rewind()
            .await
            .context("failed to rewind incomplete part tempfile")?;
        Ok(file)
    }

    async fn upload_parts(
        &self,
        token: &TransferCancellationToken,
        state: &mut UploadState,
        offset: i64,
        stream: TransferStream,
    ) -> Result<i64> {
        let size = state.info.size;
        let optimal_part_size = calc_optimal_part_size(size, &self.part_size_constraints())?;

        let producer_token = token.child_token();
        let _producer_guard = producer_token.clone().drop_guard();
        let (chunks, producer_handle) = spawn_part_producer(
            stream,
            optimal_part_size,
            self.max_buffered_parts,
            self.temporary_directory.clone(),
            producer_token,
        );

        let is_single_part =
            state.info.metadata.get(IS_SINGLE_PART_META).map(String::as_str) == Some("true");
        let mut next_part_number = state.parts.len() as i32 + 1;
        let mut bytes_uploaded: i64 = 0;

        let upload_semaphore = Arc::new(Semaphore::new(UPLOAD_CONCURRENCY));
        let mut uploads: JoinSet<Result<PartUploadOutcome>> = JoinSet::new();

        loop {
            // the semaphore is acquired before receiving the next chunk, so
            // part files are not materialized ahead of upload capacity
            let permit = tokio::select! {
                _ = token.cancelled() => {
                    drain_unread_chunks(&chunks);
                    return Err(TransferError::Cancelled.into());
                }
                permit = upload_semaphore.clone().acquire_owned() => {
                    permit.expect("upload semaphore closed")
                }
            };

            let chunk = match chunks.recv().await {
                Ok(chunk) => chunk,
                Err(_) => break,
            };
            let chunk_size = chunk.size;
            let is_final_chunk = size == offset + bytes_uploaded + chunk_size;
            let part_number = next_part_number;

            if chunk_size >= self.min_part_size || is_final_chunk || is_single_part {
                let api = state.api.clone();
                let bucket = state.bucket.clone();
                let object_key = state.object_key.clone();
                let multipart_id = state.multipart_id.clone();
                let disable_content_hashes = self.disable_content_hashes;

                uploads.spawn(async move {
                    let _permit = permit;
                    let body = chunk.byte_stream().await?;
                    let etag = if disable_content_hashes {
                        api.upload_part_unhashed(
                            &bucket,
                            &object_key,
                            &multipart_id,
                            part_number,
                            chunk.size,
                            body,
                        )
                        .await?
                    } else {
                        api.upload_part(
                            &bucket,
                            &object_key,
                            &multipart_id,
                            part_number,
                            chunk.size,
                            body,
                        )
                        .await
                        .context("failed to upload part")?
                        .e_tag()
                        .unwrap_or_default()
                        .to_string()
                    };
                    Ok(PartUploadOutcome::Part(UploadPart {
                        number: part_number,
                        size: chunk.size,
                        etag,
                    }))
                });
            } else {
                let api = state.api.clone();
                let bucket = state.bucket.clone();
                let multipart_key = state.multipart_key.clone();

                uploads.spawn(async move {
                    let _permit = permit;
                    let body = chunk.byte_stream().await?;
                    api.put_object(&bucket, &multipart_key, chunk.size, body)
                        .await
                        .context("failed to store incomplete part object")?;
                    Ok(PartUploadOutcome::IncompletePart(chunk.size))
                });
            }

            bytes_uploaded += chunk_size;
            next_part_number += 1;
        }

        let mut new_parts = Vec::new();
        let mut incomplete_part_size: i64 = 0;
        let mut upload_error: Option<anyhow::Error> = None;
        while let Some(joined) = uploads.join_next().await {
            match joined.context("part upload task failed")? {
                Ok(PartUploadOutcome::Part(part)) => new_parts.push(part),
                Ok(PartUploadOutcome::IncompletePart(size)) => incomplete_part_size = size,
                Err(e) => {
                    if upload_error.is_none() {
                        upload_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = upload_error {
            return Err(e);
        }

        new_parts.sort_by_key(|part| part.number);
        state.parts.extend(new_parts);
        state.incomplete_part_size = incomplete_part_size;

        // the producer's error surfaces only after all in-flight uploads settle
        match producer_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(anyhow!(e).context("part producer task failed")),
        }

        Ok(bytes_uploaded)
    }
}

impl Default for S3Destination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Destination for S3Destination {
    async fn get_file_info(
        &self,
        _token: TransferCancellationToken,
        file_path: &str,
        client: Arc<dyn Client>,
    ) -> Result<TransferInfo> {
        let session = checked_session(&self.conns, client.as_ref())?;
        let state = load_upload_state(&session, file_path).await?;
        Ok(state.info)
    }

    async fn create_file(
        &self,
        _token: TransferCancellationToken,
        file_path: &str,
        size: i64,
        mod_time: DateTime<Utc>,
        client: Arc<dyn Client>,
    ) -> Result<()> {
        if size > self.max_object_size {
            return Err(TransferError::FileTooLarge {
                size,
                max_object_size: self.max_object_size,
            }
            .into());
        }
        let parts = FileParts::parse(file_path)?;
        let session = checked_session(&self.conns, client.as_ref())?;

        let create_output = session
            .api
            .create_multipart_upload(&session.bucket, file_path)
            .await
            .context("failed to create multipart upload")?;
        let upload_id = create_output.upload_id().unwrap_or_default().to_string();

        let mut metadata = HashMap::new();
        metadata.insert(BUCKET_META.to_string(), session.bucket.clone());
        metadata.insert(OBJECT_KEY_META.to_string(), file_path.to_string());
        metadata.insert(
            MULTIPART_KEY_META.to_string(),
            derived_path(file_path, "part")?,
        );
        metadata.insert(MULTIPART_ID_META.to_string(), upload_id);
        if size <= self.min_part_size {
            metadata.insert(IS_SINGLE_PART_META.to_string(), "true".to_string());
        }

        let transfer_info = TransferInfo {
            path: file_path.to_string(),
            size,
            name: parts.name,
            extension: parts.extension,
            mod_time: Some(mod_time),
            start_time: Some(Utc::now()),
            finish_time: None,
            offset: 0,
            checksum: None,
            metadata,
        };
        write_info(&session, &transfer_info)
            .await
            .context("failed to create transfer info object")?;

        debug!(path = file_path, size = size, "created transfer");
        Ok(())
    }

    async fn transfer_file_chunk(
        &self,
        token: TransferCancellationToken,
        file_path: &str,
        reader: TransferStream,
        offset: i64,
        client: Arc<dyn Client>,
    ) -> Result<i64> {
        let session = checked_session(&self.conns, client.as_ref())?;
        let mut state = load_upload_state(&session, file_path).await?;
        let incomplete_part_size = state.incomplete_part_size;

        let limiter = bandwidth_limiter(calc_optimal_speed(state.info.size));
        let metered = MeteredReader::new(reader, Arc::new(AtomicI64::new(0)), Some(limiter));

        let mut offset = offset;
        let stream: TransferStream = if incomplete_part_size > 0 {
            // reattach the tail persisted by the previous attempt and step the
            // offset back to the preceding part boundary
            let incomplete_file = self.download_incomplete_part(&state).await?;
            state
                .api
                .delete_object(&session.bucket, &state.multipart_key)
                .await
                .context("failed to delete incomplete part object")?;
            offset -= incomplete_part_size;
            Box::new(incomplete_file.chain(metered))
        } else {
            Box::new(metered)
        };

        let bytes_uploaded = self.upload_parts(&token, &mut state, offset, stream).await?;

        // the carried-over incomplete part is transparent to the caller
        let bytes_uploaded = (bytes_uploaded - incomplete_part_size).max(0);

        state.info.offset += bytes_uploaded;
        if state.info.size == 0 {
            state.info.size = bytes_uploaded;
        }
        Ok(bytes_uploaded)
    }

    async fn finalize_transfer(
        &self,
        _token: TransferCancellationToken,
        file_path: &str,
        client: Arc<dyn Client>,
    ) -> Result<()> {
        let session = checked_session(&self.conns, client.as_ref())?;
        let mut state = load_upload_state(&session, file_path).await?;

        if state.parts.is_empty() {
            // S3 rejects a completion without parts; a zero-byte part stands
            // in for an empty object
            let output = state
                .api
                .upload_part(
                    &state.bucket,
                    &state.object_key,
                    &state.multipart_id,
                    1,
                    0,
                    ByteStream::from_static(b""),
                )
                .await
                .context("failed to upload empty part")?;
            state.parts.push(UploadPart {
                number: 1,
                size: 0,
                etag: output.e_tag().unwrap_or_default().to_string(),
            });
        }

        let total_part_size: i64 = state.parts.iter().map(|part| part.size).sum();
        if total_part_size != state.info.size {
            warn!(
                path = file_path,
                total_part_size = total_part_size,
                size = state.info.size,
                "assembled parts do not add up to the recorded size"
            );
            return Err(TransferError::CannotFinalize.into());
        }

        state.parts.sort_by_key(|part| part.number);
        let completed_parts: Vec<CompletedPart> = state
            .parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .e_tag(&part.etag)
                    .part_number(part.number)
                    .build()
            })
            .collect();
        state
            .api
            .complete_multipart_upload(
                &state.bucket,
                &state.object_key,
                &state.multipart_id,
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .await
            .context("failed to complete multipart upload")?;

        state.info.offset = state.info.size;
        state.info.finish_time = Some(Utc::now());
        write_info(&session, &state.info)
            .await
            .context("failed to update transfer info object")?;

        info!(path = file_path, size = state.info.size, "finalized transfer");
        Ok(())
    }

    async fn delete_file(
        &self,
        _token: TransferCancellationToken,
        file_path: &str,
        client: Arc<dyn Client>,
    ) -> Result<()> {
        let session = checked_session(&self.conns, client.as_ref())?;
        let state = load_upload_state(&session, file_path).await?;
        let info_key = info_path(file_path)?;

        let abort_upload = async {
            match state
                .api
                .abort_multipart_upload(&state.bucket, &state.object_key, &state.multipart_id)
                .await
            {
                Ok(_) => Ok(()),
                Err(e) if is_no_such_upload_abort_error(&e) => Ok(()),
                Err(e) => Err(e.context("failed to abort multipart upload")),
            }
        };

        let delete_objects = async {
            let identifiers = [
                file_path.to_string(),
                state.multipart_key.clone(),
                info_key.clone(),
            ]
            .into_iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .context("failed to build delete object identifiers")?;
            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .quiet(true)
                .build()
                .context("failed to build delete request")?;

            let output = state
                .api
                .delete_objects(&state.bucket, delete)
                .await
                .context("failed to delete transfer objects")?;

            let errors: Vec<String> = output
                .errors()
                .iter()
                .filter(|error| error.code() != Some("NoSuchKey"))
                .map(|error| {
                    format!(
                        "{} for object {}: {}",
                        error.code().unwrap_or("unknown"),
                        error.key().unwrap_or_default(),
                        error.message().unwrap_or_default()
                    )
                })
                .collect();
            if errors.is_empty() {
                Ok(())
            } else {
                Err(anyhow!("delete objects failed: {}", errors.join("; ")))
            }
        };

        let (abort_result, delete_result) = tokio::join!(abort_upload, delete_objects);
        match (abort_result, delete_result) {
            (Ok(()), Ok(())) => {
                debug!(path = file_path, "deleted transfer");
                Ok(())
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(abort_error), Err(delete_error)) => {
                Err(anyhow!("{abort_error:#}; {delete_error:#}"))
            }
        }
    }
}

/// Source backed by AWS S3 or any S3-compatible store.
pub struct S3Source {
    conns: Mutex<HashMap<String, S3Session>>,
}

impl S3Source {
    pub fn new() -> Self {
        Self {
            conns: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for S3Source {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for S3Source {
    async fn get_file_info(
        &self,
        _token: TransferCancellationToken,
        file_path: &str,
        client: Arc<dyn Client>,
    ) -> Result<TransferInfo> {
        let session = checked_session(&self.conns, client.as_ref())?;
        let head = session
            .api
            .head_object(&session.bucket, file_path)
            .await
            .context("failed to head source object")?;
        let parts = FileParts::parse(file_path)?;

        Ok(TransferInfo {
            path: file_path.to_string(),
            size: head.content_length().unwrap_or_default(),
            name: parts.name,
            extension: parts.extension,
            mod_time: head
                .last_modified()
                .and_then(|last_modified| last_modified.to_chrono_utc().ok()),
            ..Default::default()
        })
    }

    async fn get_file_from_offset(
        &self,
        _token: TransferCancellationToken,
        file_path: &str,
        offset: i64,
        client: Arc<dyn Client>,
    ) -> Result<TransferStream> {
        let session = checked_session(&self.conns, client.as_ref())?;
        let output = session
            .api
            .get_object(
                &session.bucket,
                file_path,
                Some(format!("bytes={offset}-")),
            )
            .await
            .context("failed to open source object from offset")?;
        Ok(Box::new(output.body.into_async_read()))
    }
}

struct UploadPart {
    number: i32,
    size: i64,
    etag: String,
}

enum PartUploadOutcome {
    Part(UploadPart),
    IncompletePart(i64),
}

struct UploadState {
    bucket: String,
    api: Arc<dyn S3Api>,
    object_key: String,
    multipart_key: String,
    multipart_id: String,
    info: TransferInfo,
    parts: Vec<UploadPart>,
    incomplete_part_size: i64,
}

fn checked_session(
    conns: &Mutex<HashMap<String, S3Session>>,
    client: &dyn Client,
) -> Result<S3Session> {
    let mut conns = conns.lock().unwrap();
    let connection_id = client.connection_id();
    if let Some(session) = conns.get(&connection_id) {
        return Ok(session.clone());
    }
    let session = client.s3_session().ok_or(TransferError::InvalidS3Client)?;
    conns.insert(connection_id, session.clone());
    Ok(session)
}

async fn load_upload_state(session: &S3Session, file_path: &str) -> Result<UploadState> {
    let info_key = info_path(file_path)?;
    let get_output = match session
        .api
        .get_object(&session.bucket, &info_key, None)
        .await
    {
        Ok(output) => output,
        Err(e) if is_info_not_found_error(&e) => {
            return Err(TransferError::FileNotExists.into());
        }
        Err(e) => return Err(e.context("failed to read transfer info object")),
    };
    let body = get_output
        .body
        .collect()
        .await
        .context("failed to read transfer info body")?
        .into_bytes();
    let mut transfer_info: TransferInfo =
        serde_json::from_slice(&body).context("failed to decode transfer info")?;

    let multipart_id = transfer_info
        .metadata
        .get(MULTIPART_ID_META)
        .cloned()
        .unwrap_or_default();
    let multipart_key = match transfer_info.metadata.get(MULTIPART_KEY_META) {
        Some(multipart_key) => multipart_key.clone(),
        None => derived_path(file_path, "part")?,
    };

    let mut state = UploadState {
        bucket: session.bucket.clone(),
        api: session.api.clone(),
        object_key: file_path.to_string(),
        multipart_key,
        multipart_id,
        info: TransferInfo::default(),
        parts: Vec::new(),
        incomplete_part_size: 0,
    };

    let (parts_result, incomplete_result) = tokio::join!(
        list_all_parts(
            state.api.as_ref(),
            &state.bucket,
            &state.object_key,
            &state.multipart_id,
        ),
        head_incomplete_part(state.api.as_ref(), &state.bucket, &state.multipart_key),
    );

    match parts_result {
        Ok(parts) => state.parts = parts,
        Err(e) => {
            // NoSuchUpload (or an S3-compatible store's NoSuchKey) on a
            // transfer whose info object exists means the multipart upload
            // was already completed or aborted: the offset is the size
            if is_upload_completed_error(&e) {
                transfer_info.offset = transfer_info.size;
                state.info = transfer_info;
                return Ok(state);
            }
            return Err(e.context("failed to list multipart parts"));
        }
    }

    state.incomplete_part_size = incomplete_result?;
    transfer_info.offset =
        state.incomplete_part_size + state.parts.iter().map(|part| part.size).sum::<i64>();
    state.info = transfer_info;
    Ok(state)
}

async fn list_all_parts(
    api: &dyn S3Api,
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> Result<Vec<UploadPart>> {
    let mut parts = Vec::new();
    let mut part_marker: Option<String> = None;
    loop {
        let output = api
            .list_parts(bucket, key, upload_id, part_marker.clone())
            .await?;
        for part in output.parts() {
            parts.push(UploadPart {
                number: part.part_number().unwrap_or_default(),
                size: part.size().unwrap_or_default(),
                etag: part.e_tag().unwrap_or_default().to_string(),
            });
        }
        if output.is_truncated().unwrap_or_default() {
            part_marker = output.next_part_number_marker().map(|marker| marker.to_string());
        } else {
            break;
        }
    }
    Ok(parts)
}

async fn head_incomplete_part(api: &dyn S3Api, bucket: &str, key: &str) -> Result<i64> {
    match api.head_object(bucket, key).await {
        Ok(output) => Ok(output.content_length().unwrap_or_default()),
        Err(e) if is_missing_incomplete_part_head_error(&e) => Ok(0),
        Err(e) => Err(e.context("failed to head incomplete part object")),
    }
}

async fn write_info(session: &S3Session, transfer_info: &TransferInfo) -> Result<()> {
    let info_key = info_path(&transfer_info.path)?;
    let body = serde_json::to_vec(transfer_info).context("failed to encode transfer info")?;
    session
        .api
        .put_object(
            &session.bucket,
            &info_key,
            body.len() as i64,
            ByteStream::from(body),
        )
        .await
        .context("failed to put transfer info object")?;
    Ok(())
}

/// Target bytes/second for a transfer of `size` bytes. Large uploads are
/// smoothed so they do not starve other tenants; not a user-facing knob.
fn calc_optimal_speed(size: i64) -> f64 {
    let object_size = size as f64;

    let base_speed = object_size / BASE_TIME_SECS;
    // +1 to avoid log(0)
    let scale_factor = (object_size / 1024.0 / 1024.0 + 1.0).log10();
    let scaled_speed = base_speed * scale_factor;

    let random_factor = 0.9 + 0.3 * rand::thread_rng().r#gen::<f64>();
    (scaled_speed * random_factor).clamp(MIN_SPEED, MAX_SPEED)
}

fn service_error_code<E>(e: &anyhow::Error) -> Option<String>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    e.downcast_ref::<SdkError<E, Response>>()
        .and_then(|sdk_error| sdk_error.as_service_error())
        .and_then(|service_error| service_error.code())
        .map(|code| code.to_string())
}

fn is_info_not_found_error(e: &anyhow::Error) -> bool {
    if let Some(sdk_error) = e.downcast_ref::<SdkError<GetObjectError, Response>>() {
        if matches!(
            sdk_error.as_service_error(),
            Some(GetObjectError::NoSuchKey(_))
        ) {
            return true;
        }
    }
    service_error_code::<GetObjectError>(e).as_deref() == Some("NoSuchKey")
}

fn is_upload_completed_error(e: &anyhow::Error) -> bool {
    matches!(
        service_error_code::<ListPartsError>(e).as_deref(),
        Some("NoSuchUpload") | Some("NoSuchKey")
    )
}

fn is_missing_incomplete_part_head_error(e: &anyhow::Error) -> bool {
    if let Some(sdk_error) = e.downcast_ref::<SdkError<HeadObjectError, Response>>() {
        if matches!(
            sdk_error.as_service_error(),
            Some(HeadObjectError::NotFound(_))
        ) {
            return true;
        }
    }
    matches!(
        service_error_code::<HeadObjectError>(e).as_deref(),
        Some(code) if MISSING_OBJECT_CODES.contains(&code)
    )
}

fn is_missing_incomplete_part_get_error(e: &anyhow::Error) -> bool {
    if let Some(sdk_error) = e.downcast_ref::<SdkError<GetObjectError, Response>>() {
        if matches!(
            sdk_error.as_service_error(),
            Some(GetObjectError::NoSuchKey(_))
        ) {
            return true;
        }
    }
    matches!(
        service_error_code::<GetObjectError>(e).as_deref(),
        Some(code) if MISSING_OBJECT_CODES.contains(&code)
    )
}

fn is_no_such_upload_abort_error(e: &anyhow::Error) -> bool {
    if let Some(sdk_error) = e.downcast_ref::<SdkError<AbortMultipartUploadError, Response>>() {
        if matches!(
            sdk_error.as_service_error(),
            Some(AbortMultipartUploadError::NoSuchUpload(_))
        ) {
            return true;
        }
    }
    service_error_code::<AbortMultipartUploadError>(e).as_deref() == Some("NoSuchUpload")
}
