use async_trait::async_trait;
use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
    Delete, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::backend::{ObjectReader, StorageBackend};
use crate::error::StorageError;
use crate::types::{BatchDeleteOutcome, BucketEntry, KeyFailure, ObjectEntry, Page};

const DEFAULT_REGION: &str = "us-east-1";

/// 后端返回这些错误码时视为不存在
const NOT_FOUND_CODES: &[&str] = &["NotFound", "NoSuchBucket", "NoSuchKey"];

/// S3 后端配置
///
/// 凭证获取顺序：
/// 1. `access_key_id` + `secret_access_key`
/// 2. SDK 默认凭证链（环境变量、`~/.aws/credentials`、ECS/EC2 元数据）
#[derive(Debug, Deserialize, Serialize, SmartDefault, Clone, Validate, PartialEq, Eq)]
#[serde(default)]
pub struct AwsS3BackendConfig {
    /// 自定义端点（MinIO 等 S3 兼容存储）
    #[garde(skip)]
    pub endpoint: Option<String>,

    /// 区域，为空时使用 us-east-1
    #[garde(skip)]
    #[default = "us-east-1"]
    pub region: String,

    /// 是否使用 path-style URL，设置了 endpoint 时默认为 true
    #[garde(skip)]
    pub force_path_style: Option<bool>,

    #[garde(length(min = 1))]
    pub access_key_id: Option<String>,

    #[garde(length(min = 1))]
    pub secret_access_key: Option<String>,
}

impl AwsS3BackendConfig {
    pub fn effective_region(&self) -> &str {
        if self.region.trim().is_empty() {
            DEFAULT_REGION
        } else {
            self.region.trim()
        }
    }

    /// 字段校验外加 endpoint 格式检查
    pub fn check(&self) -> Result<(), StorageError> {
        if let Err(errors) = self.validate() {
            return Err(StorageError::Configuration(format!("{}", errors)));
        }

        if let Some(endpoint) = &self.endpoint {
            let uri: http::Uri = endpoint.parse().map_err(|e| {
                StorageError::Configuration(format!("无效的 endpoint {}: {}", endpoint, e))
            })?;
            let has_host = uri.host().map_or(false, |host| !host.is_empty());
            if !matches!(uri.scheme_str(), Some("http" | "https")) || !has_host {
                return Err(StorageError::Configuration(format!(
                    "endpoint 需要 http(s) scheme 和 host: {}",
                    endpoint
                )));
            }
        }

        Ok(())
    }
}

/// 基于 aws-sdk-s3 的存储后端
#[derive(Clone)]
pub struct AwsS3Backend {
    client: Client,
    region: String,
}

impl AwsS3Backend {
    pub async fn new(config: AwsS3BackendConfig) -> Result<Self, StorageError> {
        config.check()?;

        let region = config.effective_region().to_string();
        let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.clone()));

        if let (Some(ak), Some(sk)) = (&config.access_key_id, &config.secret_access_key) {
            let credentials = Credentials::new(ak, sk, None, None, "simple-s3");
            builder = builder.credentials_provider(credentials);
        }

        let sdk_config = builder.load().await;

        let client = match &config.endpoint {
            Some(endpoint) => {
                let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
                    .endpoint_url(endpoint)
                    .force_path_style(config.force_path_style.unwrap_or(true))
                    .build();
                Client::from_conf(s3_config)
            }
            None => Client::new(&sdk_config),
        };

        debug!(region = %region, endpoint = ?config.endpoint, "s3 client created");

        Ok(Self { client, region })
    }

    /// 使用已有客户端
    pub fn from_client(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::backend(e, "create_multipart_upload", bucket, Some(key)))?;

        output.upload_id.ok_or_else(|| {
            StorageError::backend(
                "no upload_id returned",
                "create_multipart_upload",
                bucket,
                Some(key),
            )
        })
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
        part_size: u64,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let part_size = usize::try_from(part_size)
            .map_err(|_| StorageError::Configuration(format!("分片过大: {}", part_size)))?;
        let mut reader = reader.take(size);
        let mut parts = Vec::new();
        let mut part_number: i32 = 1;

        loop {
            let mut buffer = vec![0u8; part_size];
            let mut buffer_len = 0;

            while buffer_len < part_size {
                let n = reader
                    .read(&mut buffer[buffer_len..])
                    .await
                    .map_err(|e| StorageError::io("upload_part", e))?;
                if n == 0 {
                    break;
                }
                buffer_len += n;
            }

            if buffer_len == 0 {
                break;
            }
            buffer.truncate(buffer_len);

            let output = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(Bytes::from(buffer)))
                .send()
                .await
                .map_err(|e| StorageError::backend(e, "upload_part", bucket, Some(key)))?;

            let etag = output.e_tag.ok_or_else(|| {
                StorageError::backend("no ETag returned for part", "upload_part", bucket, Some(key))
            })?;

            debug!(bucket, key, part_number, bytes = buffer_len, "part uploaded");

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );
            part_number += 1;
        }

        Ok(parts)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| StorageError::backend(e, "complete_multipart_upload", bucket, Some(key)))?;

        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| StorageError::backend(e, "abort_multipart_upload", bucket, Some(key)))?;

        Ok(())
    }
}

fn is_not_found<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::ServiceError(se) => se
            .err()
            .code()
            .map(|code| NOT_FOUND_CODES.contains(&code))
            .unwrap_or(false),
        _ => false,
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl StorageBackend for AwsS3Backend {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 不接受 LocationConstraint
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::backend(e, "create_bucket", bucket, None))?;

        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(StorageError::backend(e, "head_bucket", bucket, None)),
        }
    }

    async fn list_buckets_page(
        &self,
        prefix: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<Page<BucketEntry>, StorageError> {
        let output = self
            .client
            .list_buckets()
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(cursor.map(str::to_string))
            .send()
            .await
            .map_err(|e| StorageError::backend(e, "list_buckets", prefix.unwrap_or(""), None))?;

        let items = output
            .buckets()
            .iter()
            .filter_map(|b| {
                b.name().map(|name| BucketEntry {
                    name: name.to_string(),
                    creation_date: b.creation_date().and_then(to_chrono),
                })
            })
            .collect();

        Ok(Page {
            items,
            next_cursor: output.continuation_token().map(str::to_string),
        })
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| StorageError::backend(e, "delete_bucket", bucket, None))?;

        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<Page<ObjectEntry>, StorageError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(cursor.map(str::to_string))
            .send()
            .await
            .map_err(|e| StorageError::backend(e, "list_objects", bucket, prefix))?;

        let items = output
            .contents()
            .iter()
            .map(|obj| ObjectEntry {
                key: obj.key().map(str::to_string),
                size: obj.size().unwrap_or(0).max(0) as u64,
                last_modified: obj.last_modified().and_then(to_chrono),
                etag: obj.e_tag().map(str::to_string),
            })
            .collect();

        Ok(Page {
            items,
            next_cursor: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, StorageError> {
        match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Box::pin(output.body.into_async_read())),
            Err(e) if is_not_found(&e) => Err(StorageError::not_found(bucket, Some(key))),
            Err(e) => Err(StorageError::backend(e, "get_object", bucket, Some(key))),
        }
    }

    async fn put_object_simple(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::backend(e, "put_object", bucket, Some(key)))?;

        Ok(())
    }

    async fn put_object_multipart(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
        part_size: u64,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let upload_id = self.create_multipart_upload(bucket, key, content_type).await?;

        let result = match self
            .upload_parts(bucket, key, &upload_id, reader, size, part_size)
            .await
        {
            Ok(parts) if parts.is_empty() => Err(StorageError::backend(
                "multipart upload without parts",
                "upload_part",
                bucket,
                Some(key),
            )),
            Ok(parts) => {
                self.complete_multipart_upload(bucket, key, &upload_id, parts)
                    .await
            }
            Err(e) => Err(e),
        };

        // 出错时取消分片上传（取消失败只记录日志）
        if result.is_err() {
            if let Err(e) = self.abort_multipart_upload(bucket, key, &upload_id).await {
                warn!(bucket, key, error = %e, "abort multipart upload failed");
            }
        }

        result
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::backend(e, "delete_object", bucket, Some(key)))?;

        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StorageError> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::backend(e, "delete_objects", bucket, None))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .map_err(|e| StorageError::backend(e, "delete_objects", bucket, None))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::backend(e, "delete_objects", bucket, None))?;

        Ok(BatchDeleteOutcome {
            deleted: output
                .deleted()
                .iter()
                .filter_map(|d| d.key().map(str::to_string))
                .collect(),
            errors: output
                .errors()
                .iter()
                .map(|e| KeyFailure::new(e.key().unwrap_or_default(), e.code(), e.message()))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AwsS3BackendConfig::default();
        assert_eq!(config.region, "us-east-1");
        assert!(config.endpoint.is_none());
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_empty_region_falls_back() {
        let config = AwsS3BackendConfig {
            region: "".to_string(),
            ..Default::default()
        };
        assert_eq!(config.effective_region(), "us-east-1");

        let config = AwsS3BackendConfig {
            region: "eu-west-1".to_string(),
            ..Default::default()
        };
        assert_eq!(config.effective_region(), "eu-west-1");
    }

    #[test]
    fn test_endpoint_validation() {
        let valid = AwsS3BackendConfig {
            endpoint: Some("http://localhost:9000".to_string()),
            ..Default::default()
        };
        assert!(valid.check().is_ok());

        let invalid = AwsS3BackendConfig {
            endpoint: Some("://bad-url".to_string()),
            ..Default::default()
        };
        assert!(invalid.check().is_err());

        let no_scheme = AwsS3BackendConfig {
            endpoint: Some("localhost".to_string()),
            ..Default::default()
        };
        assert!(no_scheme.check().is_err());

        for endpoint in ["ftp://localhost:21", "http://", "https://:9000"] {
            let config = AwsS3BackendConfig {
                endpoint: Some(endpoint.to_string()),
                ..Default::default()
            };
            assert!(config.check().is_err(), "{}", endpoint);
        }

        let tls = AwsS3BackendConfig {
            endpoint: Some("https://s3.example.com".to_string()),
            ..Default::default()
        };
        assert!(tls.check().is_ok());

        let empty_key = AwsS3BackendConfig {
            access_key_id: Some("".to_string()),
            ..Default::default()
        };
        assert!(empty_key.check().is_err());
    }

    #[test]
    fn test_config_deserialize() {
        let config: AwsS3BackendConfig = serde_yaml::from_str(
            r#"
endpoint: http://127.0.0.1:9000
region: eu-west-1
access_key_id: ak
secret_access_key: sk
"#,
        )
        .unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.access_key_id.as_deref(), Some("ak"));
        assert!(config.force_path_style.is_none());
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_endpoint() {
        let config = AwsS3BackendConfig {
            endpoint: Some("://bad-url".to_string()),
            ..Default::default()
        };
        let err = AwsS3Backend::new(config).await.err().unwrap();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_new_with_static_credentials() {
        let config = AwsS3BackendConfig {
            endpoint: Some("http://127.0.0.1:9000".to_string()),
            region: "eu-west-1".to_string(),
            access_key_id: Some("ak".to_string()),
            secret_access_key: Some("sk".to_string()),
            ..Default::default()
        };
        let backend = AwsS3Backend::new(config).await.unwrap();
        assert_eq!(backend.region, "eu-west-1");
    }
}
