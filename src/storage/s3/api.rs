use anyhow::Result;
use async_trait::async_trait;
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
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, Delete};

/// The S3 control-plane surface the source and destination engines consume.
///
/// `aws_sdk_s3::Client` sits behind this trait so the engines can be
/// exercised against an in-memory implementation.
#[async_trait]
pub trait S3Api: Send + Sync {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<String>,
    ) -> Result<GetObjectOutput>;

    async fn head_object(&self, bucket: &str, key: &str) -> Result<HeadObjectOutput>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_length: i64,
        body: ByteStream,
    ) -> Result<PutObjectOutput>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<DeleteObjectOutput>;

    async fn delete_objects(&self, bucket: &str, delete: Delete) -> Result<DeleteObjectsOutput>;

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<CreateMultipartUploadOutput>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        content_length: i64,
        body: ByteStream,
    ) -> Result<UploadPartOutput>;

    /// Uploads a part through a manually issued presigned request so the SDK
    /// does not hash the body bytes. Returns the part ETag.
    async fn upload_part_unhashed(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        content_length: i64,
        body: ByteStream,
    ) -> Result<String>;

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number_marker: Option<String>,
    ) -> Result<ListPartsOutput>;

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        multipart_upload: CompletedMultipartUpload,
    ) -> Result<CompleteMultipartUploadOutput>;

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<AbortMultipartUploadOutput>;
}
