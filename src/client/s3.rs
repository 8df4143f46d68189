use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadOutput;
use aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadOutput;
use aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadOutput;
use aws_sdk_s3::operation::delete_object::DeleteObjectOutput;
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::operation::list_parts::ListPartsOutput;
use aws_sdk_s3::operation::put_object::PutObjectOutput;
use aws_sdk_s3::operation::upload_part::UploadPartOutput;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, Delete};
use tokio_util::io::ReaderStream;
use uuid::Uuid;
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

use crate::client::{Client, S3Session};
use crate::storage::s3::api::S3Api;

/// Namespace for deriving stable connection ids from credential material.
const CONNECTION_ID_NAMESPACE: Uuid = uuid::uuid!("7c9e4a21-5d8f-4f0a-9b3c-2f6d1e8a4b53");

const PRESIGNED_UPLOAD_EXPIRY: Duration = Duration::from_secs(15 * 60);

/// Credentials and endpoint of an S3 or S3-compatible storage. Wiped from
/// memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct S3ClientConfig {
    /// Base endpoint URL. Empty uses the SDK's default AWS endpoint.
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// S3 protocol client. Builds the SDK client on demand and derives a stable
/// connection id from `(endpoint, bucket, region, access key, secret key)`.
pub struct S3Client {
    config: S3ClientConfig,
}

impl S3Client {
    pub fn new(config: S3ClientConfig) -> Self {
        Self { config }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn create_sdk_client(&self) -> aws_sdk_s3::Client {
        let credentials = Credentials::new(
            self.config.access_key.clone(),
            self.config.secret_key.clone(),
            None,
            None,
            "s3xfer",
        );

        let mut config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.config.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::standard())
            .force_path_style(true);

        if !self.config.endpoint.is_empty() {
            config_builder = config_builder.endpoint_url(self.config.endpoint.clone());
        }

        aws_sdk_s3::Client::from_conf(config_builder.build())
    }
}

impl Client for S3Client {
    fn connection_id(&self) -> String {
        let seed = format!(
            "{}:{}:{}:{}:{}",
            self.config.endpoint,
            self.config.bucket,
            self.config.region,
            self.config.access_key,
            self.config.secret_key
        );
        Uuid::new_v5(&CONNECTION_ID_NAMESPACE, seed.as_bytes()).to_string()
    }

    fn s3_session(&self) -> Option<S3Session> {
        Some(S3Session {
            bucket: self.config.bucket.clone(),
            api: Arc::new(SdkS3Api::new(self.create_sdk_client())),
        })
    }
}

/// [`S3Api`] implementation over the real AWS SDK client.
pub struct SdkS3Api {
    client: aws_sdk_s3::Client,
}

impl SdkS3Api {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl S3Api for SdkS3Api {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<String>,
    ) -> Result<GetObjectOutput> {
        Ok(self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_range(range)
            .send()
            .await?)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<HeadObjectOutput> {
        Ok(self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_length: i64,
        body: ByteStream,
    ) -> Result<PutObjectOutput> {
        Ok(self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(content_length)
            .body(body)
            .send()
            .await?)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<DeleteObjectOutput> {
        Ok(self
            .client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?)
    }

    async fn delete_objects(&self, bucket: &str, delete: Delete) -> Result<DeleteObjectsOutput> {
        Ok(self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await?)
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<CreateMultipartUploadOutput> {
        Ok(self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await?)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        content_length: i64,
        body: ByteStream,
    ) -> Result<UploadPartOutput> {
        Ok(self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(content_length)
            .body(body)
            .send()
            .await?)
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
        // The presigned request is computed without the body, then issued
        // manually, so the SDK never hashes the part bytes. Content-Length is
        // set explicitly: S3 does not accept chunked transfer encoding here.
        let presigned = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(content_length)
            .presigned(
                PresigningConfig::expires_in(PRESIGNED_UPLOAD_EXPIRY)
                    .context("failed to build presigning config")?,
            )
            .await
            .context("failed to presign upload_part")?;

        let response = reqwest::Client::new()
            .put(presigned.uri())
            .header(reqwest::header::CONTENT_LENGTH, content_length)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(
                body.into_async_read(),
            )))
            .send()
            .await
            .context("presigned upload_part request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            bail!("unexpected response code {status} for presigned upload: {body_text}");
        }

        Ok(response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string())
    }

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number_marker: Option<String>,
    ) -> Result<ListPartsOutput> {
        Ok(self
            .client
            .list_parts()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .set_part_number_marker(part_number_marker)
            .send()
            .await?)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        multipart_upload: CompletedMultipartUpload,
    ) -> Result<CompleteMultipartUploadOutput> {
        Ok(self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(multipart_upload)
            .send()
            .await?)
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<AbortMultipartUploadOutput> {
        Ok(self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await?)
    }
}
