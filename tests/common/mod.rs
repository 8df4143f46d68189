#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::error::ErrorMetadata;
use aws_sdk_s3::operation::abort_multipart_upload::{
    AbortMultipartUploadError, AbortMultipartUploadOutput,
};
use aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadOutput;
use aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadOutput;
use aws_sdk_s3::operation::delete_object::DeleteObjectOutput;
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::operation::get_object::{GetObjectError, GetObjectOutput};
use aws_sdk_s3::operation::head_object::{HeadObjectError, HeadObjectOutput};
use aws_sdk_s3::operation::list_parts::{ListPartsError, ListPartsOutput};
use aws_sdk_s3::operation::put_object::PutObjectOutput;
use aws_sdk_s3::operation::upload_part::{UploadPartError, UploadPartOutput};
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::types::error::{NoSuchKey, NoSuchUpload, NotFound};
use aws_sdk_s3::types::{CompletedMultipartUpload, Delete, Part};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::{Response, StatusCode};
use aws_smithy_types::body::SdkBody;
use bytes::Bytes;
use chrono::Utc;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use s3xfer::client::{Client, S3Session};
use s3xfer::storage::s3::api::S3Api;
use s3xfer::storage::{Destination, Source, TransferStream};
use s3xfer::transfer::progress::{Progress, ProgressCallbackHandle, progress_callback};
use s3xfer::types::error::TransferError;
use s3xfer::types::token::TransferCancellationToken;
use s3xfer::types::{FileParts, TransferInfo};

pub fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new("dummy=trace"))
                .unwrap(),
        )
        .try_init();
}

pub fn recording_callback() -> (ProgressCallbackHandle, Arc<Mutex<Vec<Progress>>>) {
    let record = Arc::new(Mutex::new(Vec::new()));
    let sink = record.clone();
    (
        progress_callback(move |progress| sink.lock().unwrap().push(progress)),
        record,
    )
}

fn http_response(status: u16) -> Response {
    Response::new(StatusCode::try_from(status).unwrap(), SdkBody::empty())
}

struct MockPart {
    data: Bytes,
    etag: String,
}

struct MockUpload {
    key: String,
    parts: BTreeMap<i32, MockPart>,
}

#[derive(Default)]
struct MockS3State {
    objects: BTreeMap<String, Bytes>,
    uploads: BTreeMap<String, MockUpload>,
    next_upload_id: usize,
}

/// In-memory S3 control plane: objects plus multipart upload state, with
/// failure injection for part uploads.
#[derive(Default)]
pub struct MockS3 {
    state: Mutex<MockS3State>,
    /// Number of upcoming `upload_part` calls that fail with a 500.
    pub fail_upload_parts: AtomicUsize,
    /// When set, `list_parts` pages with this many parts per response.
    pub parts_page_size: Mutex<Option<usize>>,
}

impl MockS3 {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(key)
            .map(|data| data.to_vec())
    }

    pub fn put_raw_object(&self, key: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), Bytes::copy_from_slice(data));
    }

    pub fn upload_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.keys().cloned().collect()
    }

    pub fn part_content(&self, upload_id: &str, part_number: i32) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .uploads
            .get(upload_id)
            .and_then(|upload| upload.parts.get(&part_number))
            .map(|part| part.data.to_vec())
    }

    pub fn part_count(&self, upload_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .uploads
            .get(upload_id)
            .map(|upload| upload.parts.len())
            .unwrap_or_default()
    }

    pub fn remove_upload(&self, upload_id: &str) {
        self.state.lock().unwrap().uploads.remove(upload_id);
    }

    pub fn has_upload(&self, upload_id: &str) -> bool {
        self.state.lock().unwrap().uploads.contains_key(upload_id)
    }
}

fn parse_range(range: &str, len: usize) -> (usize, usize) {
    let spec = range.trim_start_matches("bytes=");
    let (start, end) = spec.split_once('-').unwrap_or((spec, ""));
    let start: usize = start.parse().unwrap_or_default();
    let end: usize = if end.is_empty() {
        len.saturating_sub(1)
    } else {
        end.parse().unwrap_or_default()
    };
    (start.min(len), (end + 1).min(len))
}

#[async_trait]
impl S3Api for MockS3 {
    async fn get_object(
        &self,
        _bucket: &str,
        key: &str,
        range: Option<String>,
    ) -> Result<GetObjectOutput> {
        let state = self.state.lock().unwrap();
        let Some(data) = state.objects.get(key) else {
            return Err(anyhow::Error::new(SdkError::service_error(
                GetObjectError::NoSuchKey(NoSuchKey::builder().build()),
                http_response(404),
            )));
        };
        let data = match range {
            Some(range) => {
                let (start, end) = parse_range(&range, data.len());
                data.slice(start..end)
            }
            None => data.clone(),
        };
        Ok(GetObjectOutput::builder()
            .content_length(data.len() as i64)
            .body(ByteStream::from(data.to_vec()))
            .build())
    }

    async fn head_object(&self, _bucket: &str, key: &str) -> Result<HeadObjectOutput> {
        let state = self.state.lock().unwrap();
        let Some(data) = state.objects.get(key) else {
            return Err(anyhow::Error::new(SdkError::service_error(
                HeadObjectError::NotFound(NotFound::builder().build()),
                http_response(404),
            )));
        };
        Ok(HeadObjectOutput::builder()
            .content_length(data.len() as i64)
            .last_modified(DateTime::from_secs(1_700_000_000))
            .build())
    }

    async fn put_object(
        &self,
        _bucket: &str,
        key: &str,
        _content_length: i64,
        body: ByteStream,
    ) -> Result<PutObjectOutput> {
        let data = body.collect().await?.into_bytes();
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), data);
        Ok(PutObjectOutput::builder().e_tag("\"mock-etag\"").build())
    }

    async fn delete_object(&self, _bucket: &str, key: &str) -> Result<DeleteObjectOutput> {
        self.state.lock().unwrap().objects.remove(key);
        Ok(DeleteObjectOutput::builder().build())
    }

    async fn delete_objects(&self, _bucket: &str, delete: Delete) -> Result<DeleteObjectsOutput> {
        let mut state = self.state.lock().unwrap();
        for identifier in delete.objects() {
            state.objects.remove(identifier.key());
        }
        Ok(DeleteObjectsOutput::builder().build())
    }

    async fn create_multipart_upload(
        &self,
        _bucket: &str,
        key: &str,
    ) -> Result<CreateMultipartUploadOutput> {
        let mut state = self.state.lock().unwrap();
        state.next_upload_id += 1;
        let upload_id = format!("upload-{}", state.next_upload_id);
        state.uploads.insert(
            upload_id.clone(),
            MockUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(CreateMultipartUploadOutput::builder()
            .upload_id(upload_id)
            .build())
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        _content_length: i64,
        body: ByteStream,
    ) -> Result<UploadPartOutput> {
        if self.fail_upload_parts.load(Ordering::SeqCst) > 0 {
            self.fail_upload_parts.fetch_sub(1, Ordering::SeqCst);
            return Err(anyhow::Error::new(SdkError::service_error(
                UploadPartError::generic(
                    ErrorMetadata::builder().code("InternalError").build(),
                ),
                http_response(500),
            )));
        }

        let data = body.collect().await?.into_bytes();
        let mut state = self.state.lock().unwrap();
        let Some(upload) = state.uploads.get_mut(upload_id) else {
            return Err(anyhow::Error::new(SdkError::service_error(
                UploadPartError::generic(ErrorMetadata::builder().code("NoSuchUpload").build()),
                http_response(404),
            )));
        };
        let etag = format!("\"{upload_id}-part-{part_number}\"");
        upload.parts.insert(
            part_number,
            MockPart {
                data,
                etag: etag.clone(),
            },
        );
        Ok(UploadPartOutput::builder().e_tag(etag).build())
    }

    async fn upload_part_unhashed(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        content_length: i64,
        body: ByteStream,
    ) -> Result<String> {
        let output = self
            .upload_part(bucket, key, upload_id, part_number, content_length, body)
            .await?;
        Ok(output.e_tag().unwrap_or_default().to_string())
    }

    async fn list_parts(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number_marker: Option<String>,
    ) -> Result<ListPartsOutput> {
        let state = self.state.lock().unwrap();
        let Some(upload) = state.uploads.get(upload_id) else {
            return Err(anyhow::Error::new(SdkError::service_error(
                ListPartsError::generic(ErrorMetadata::builder().code("NoSuchUpload").build()),
                http_response(404),
            )));
        };

        let marker: i32 = part_number_marker
            .and_then(|marker| marker.parse().ok())
            .unwrap_or(0);
        let page_size = self
            .parts_page_size
            .lock()
            .unwrap()
            .unwrap_or(usize::MAX);

        let mut parts = Vec::new();
        let mut next_marker = None;
        let mut truncated = false;
        for (number, part) in upload.parts.range((marker + 1)..) {
            if parts.len() == page_size {
                truncated = true;
                break;
            }
            parts.push(
                Part::builder()
                    .part_number(*number)
                    .size(part.data.len() as i64)
                    .e_tag(&part.etag)
                    .build(),
            );
            next_marker = Some(number.to_string());
        }

        Ok(ListPartsOutput::builder()
            .set_parts(Some(parts))
            .is_truncated(truncated)
            .set_next_part_number_marker(if truncated { next_marker } else { None })
            .build())
    }

    async fn complete_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        multipart_upload: CompletedMultipartUpload,
    ) -> Result<CompleteMultipartUploadOutput> {
        let mut state = self.state.lock().unwrap();
        let Some(upload) = state.uploads.remove(upload_id) else {
            return Err(anyhow!("upload {upload_id} does not exist"));
        };

        let mut assembled = Vec::new();
        for completed_part in multipart_upload.parts() {
            let number = completed_part
                .part_number()
                .context("completed part without number")?;
            let part = upload
                .parts
                .get(&number)
                .with_context(|| format!("part {number} was never uploaded"))?;
            assembled.extend_from_slice(&part.data);
        }
        state.objects.insert(upload.key, Bytes::from(assembled));

        Ok(CompleteMultipartUploadOutput::builder().build())
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<AbortMultipartUploadOutput> {
        let mut state = self.state.lock().unwrap();
        if state.uploads.remove(upload_id).is_none() {
            return Err(anyhow::Error::new(SdkError::service_error(
                AbortMultipartUploadError::NoSuchUpload(NoSuchUpload::builder().build()),
                http_response(404),
            )));
        }
        Ok(AbortMultipartUploadOutput::builder().build())
    }
}

/// Client handing out sessions over a [`MockS3`].
pub struct MockClient {
    pub bucket: String,
    pub api: Arc<MockS3>,
    pub id: String,
}

impl MockClient {
    pub fn new(api: Arc<MockS3>) -> Self {
        Self {
            bucket: "test-bucket".to_string(),
            api,
            id: "mock-connection".to_string(),
        }
    }
}

impl Client for MockClient {
    fn connection_id(&self) -> String {
        self.id.clone()
    }

    fn s3_session(&self) -> Option<S3Session> {
        Some(S3Session {
            bucket: self.bucket.clone(),
            api: self.api.clone(),
        })
    }
}

/// Client that does not speak S3.
pub struct ForeignClient;

impl Client for ForeignClient {
    fn connection_id(&self) -> String {
        "foreign-connection".to_string()
    }
}

pub struct MemoryFile {
    pub content: Vec<u8>,
    pub mod_time: chrono::DateTime<Utc>,
}

/// In-memory source adapter.
#[derive(Default)]
pub struct MemorySource {
    files: Mutex<HashMap<String, MemoryFile>>,
    serve_limit_once: Mutex<Option<usize>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, content: &[u8], mod_time: chrono::DateTime<Utc>) {
        self.files.lock().unwrap().insert(
            path.to_string(),
            MemoryFile {
                content: content.to_vec(),
                mod_time,
            },
        );
    }

    pub fn set_mod_time(&self, path: &str, mod_time: chrono::DateTime<Utc>) {
        self.files
            .lock()
            .unwrap()
            .get_mut(path)
            .expect("unknown source file")
            .mod_time = mod_time;
    }

    /// The next `get_file_from_offset` call serves at most `limit` bytes.
    pub fn set_serve_limit_once(&self, limit: usize) {
        *self.serve_limit_once.lock().unwrap() = Some(limit);
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn get_file_info(
        &self,
        _token: TransferCancellationToken,
        file_path: &str,
        _client: Arc<dyn Client>,
    ) -> Result<TransferInfo> {
        let files = self.files.lock().unwrap();
        let file = files
            .get(file_path)
            .with_context(|| format!("source file {file_path} does not exist"))?;
        let parts = FileParts::parse(file_path)?;
        Ok(TransferInfo {
            path: file_path.to_string(),
            size: file.content.len() as i64,
            name: parts.name,
            extension: parts.extension,
            mod_time: Some(file.mod_time),
            ..Default::default()
        })
    }

    async fn get_file_from_offset(
        &self,
        _token: TransferCancellationToken,
        file_path: &str,
        offset: i64,
        _client: Arc<dyn Client>,
    ) -> Result<TransferStream> {
        let files = self.files.lock().unwrap();
        let file = files
            .get(file_path)
            .with_context(|| format!("source file {file_path} does not exist"))?;
        let mut slice = file.content[offset as usize..].to_vec();
        if let Some(limit) = self.serve_limit_once.lock().unwrap().take() {
            slice.truncate(limit);
        }
        Ok(Box::new(Cursor::new(slice)))
    }
}

struct ScriptedState {
    info: Option<TransferInfo>,
    data: Vec<u8>,
}

/// Destination with an in-memory byte sink, a manifest and scriptable
/// failures, for exercising the transfer engine itself.
pub struct ScriptedDestination {
    state: Mutex<ScriptedState>,
    /// Number of upcoming `transfer_file_chunk` calls that fail.
    pub fail_chunk_times: AtomicUsize,
    /// Number of upcoming `finalize_transfer` calls that fail with
    /// `CannotFinalize`.
    pub fail_finalize_times: AtomicUsize,
    /// Makes `transfer_file_chunk` wait for cancellation instead of reading.
    pub block_chunk_until_cancelled: AtomicBool,
    /// Slows chunk ingestion so the progress ticker observes the transfer.
    pub read_chunk_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedDestination {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptedState {
                info: None,
                data: Vec::new(),
            }),
            fail_chunk_times: AtomicUsize::new(0),
            fail_finalize_times: AtomicUsize::new(0),
            block_chunk_until_cancelled: AtomicBool::new(false),
            read_chunk_delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Seeds a pre-existing transfer, `data` being the durably transferred
    /// bytes.
    pub fn seed(&self, info: TransferInfo, data: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.info = Some(info);
        state.data = data;
    }

    pub fn data(&self) -> Vec<u8> {
        self.state.lock().unwrap().data.clone()
    }

    pub fn info(&self) -> Option<TransferInfo> {
        self.state.lock().unwrap().info.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == name)
            .count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl Destination for ScriptedDestination {
    async fn get_file_info(
        &self,
        _token: TransferCancellationToken,
        _file_path: &str,
        _client: Arc<dyn Client>,
    ) -> Result<TransferInfo> {
        self.record("get_file_info");
        let state = self.state.lock().unwrap();
        let Some(info) = state.info.clone() else {
            return Err(TransferError::FileNotExists.into());
        };
        let mut info = info;
        info.offset = state.data.len() as i64;
        Ok(info)
    }

    async fn create_file(
        &self,
        _token: TransferCancellationToken,
        file_path: &str,
        size: i64,
        mod_time: chrono::DateTime<Utc>,
        _client: Arc<dyn Client>,
    ) -> Result<()> {
        self.record("create_file");
        let parts = FileParts::parse(file_path)?;
        let mut state = self.state.lock().unwrap();
        state.info = Some(TransferInfo {
            path: file_path.to_string(),
            size,
            name: parts.name,
            extension: parts.extension,
            mod_time: Some(mod_time),
            start_time: Some(Utc::now()),
            ..Default::default()
        });
        state.data.clear();
        Ok(())
    }

    async fn transfer_file_chunk(
        &self,
        token: TransferCancellationToken,
        _file_path: &str,
        mut reader: TransferStream,
        _offset: i64,
        _client: Arc<dyn Client>,
    ) -> Result<i64> {
        self.record("transfer_file_chunk");

        if self.block_chunk_until_cancelled.load(Ordering::SeqCst) {
            token.cancelled().await;
            return Err(TransferError::Cancelled.into());
        }
        if self.fail_chunk_times.load(Ordering::SeqCst) > 0 {
            self.fail_chunk_times.fetch_sub(1, Ordering::SeqCst);
            return Err(anyhow!("simulated network failure"));
        }

        let delay = *self.read_chunk_delay.lock().unwrap();
        let mut received = Vec::new();
        match delay {
            Some(delay) => {
                let mut buffer = [0u8; 4096];
                loop {
                    let n = reader.read(&mut buffer).await?;
                    if n == 0 {
                        break;
                    }
                    received.extend_from_slice(&buffer[..n]);
                    tokio::time::sleep(delay).await;
                }
            }
            None => {
                reader.read_to_end(&mut received).await?;
            }
        }

        let n = received.len() as i64;
        self.state.lock().unwrap().data.extend_from_slice(&received);
        Ok(n)
    }

    async fn finalize_transfer(
        &self,
        _token: TransferCancellationToken,
        _file_path: &str,
        _client: Arc<dyn Client>,
    ) -> Result<()> {
        self.record("finalize_transfer");

        if self.fail_finalize_times.load(Ordering::SeqCst) > 0 {
            self.fail_finalize_times.fetch_sub(1, Ordering::SeqCst);
            return Err(TransferError::CannotFinalize.into());
        }

        let mut state = self.state.lock().unwrap();
        let data_len = state.data.len() as i64;
        let Some(info) = state.info.as_mut() else {
            return Err(TransferError::FileNotExists.into());
        };
        if data_len != info.size {
            return Err(TransferError::CannotFinalize.into());
        }
        info.offset = info.size;
        info.finish_time = Some(Utc::now());
        Ok(())
    }

    async fn delete_file(
        &self,
        _token: TransferCancellationToken,
        _file_path: &str,
        _client: Arc<dyn Client>,
    ) -> Result<()> {
        self.record("delete_file");
        let mut state = self.state.lock().unwrap();
        state.info = None;
        state.data.clear();
        Ok(())
    }
}
