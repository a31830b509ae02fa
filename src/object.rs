//! 对象读写
//!
//! 上传前嗅探内容类型并复位流，按大小在单次 PUT 和分片上传之间选择。
//! 下载和单次上传都会把整个对象放进内存，调用方需要自行限制对象大小。

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek};
use tracing::{debug, info};

use crate::backend::StorageBackend;
use crate::context::Context;
use crate::error::StorageError;
use crate::paging;
use crate::sniff;
use crate::types::{PutOutcome, TransferOptions, UploadStrategy};

pub struct ObjectCoordinator {
    backend: Arc<dyn StorageBackend>,
    options: TransferOptions,
}

impl ObjectCoordinator {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_options(backend, TransferOptions::default())
    }

    pub fn with_options(backend: Arc<dyn StorageBackend>, options: TransferOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// 上传 `reader` 当前位置到末尾的内容
    ///
    /// 内容类型从前 512 字节判断，读取后流会回到原位置；无法回到原位置时
    /// 返回 [`StorageError::Io`]，不会发起上传。后端错误原样返回，不重试。
    pub async fn put_object<R>(
        &self,
        ctx: &Context,
        bucket: &str,
        key: &str,
        reader: &mut R,
    ) -> Result<PutOutcome, StorageError>
    where
        R: AsyncRead + AsyncSeek + Send + Unpin,
    {
        ctx.check("put_object")?;

        let content_type = sniff::read_content_type(reader).await?;
        let size = sniff::remaining_len(reader).await?;
        let strategy = self.options.decide(size);
        info!(bucket, key, size, %strategy, content_type, "uploading object");

        match strategy {
            UploadStrategy::Simple => {
                let mut body = Vec::with_capacity(size as usize);
                (&mut *reader)
                    .take(size)
                    .read_to_end(&mut body)
                    .await
                    .map_err(|e| StorageError::io("read_body", e))?;
                ctx.run(
                    "put_object",
                    self.backend
                        .put_object_simple(bucket, key, Bytes::from(body), content_type),
                )
                .await?;
            }
            UploadStrategy::Multipart { part_size } => {
                ctx.run(
                    "put_object_multipart",
                    self.backend.put_object_multipart(
                        bucket,
                        key,
                        reader,
                        size,
                        part_size,
                        content_type,
                    ),
                )
                .await?;
            }
        }

        Ok(PutOutcome {
            strategy,
            content_type: content_type.to_string(),
            size,
        })
    }

    /// 读取整个对象，不存在时返回 [`StorageError::NotFound`]
    pub async fn fetch_object(
        &self,
        ctx: &Context,
        bucket: &str,
        key: &str,
    ) -> Result<Bytes, StorageError> {
        ctx.run("get_object", async {
            let mut reader = self.backend.get_object(bucket, key).await?;
            let mut data = Vec::new();
            reader
                .read_to_end(&mut data)
                .await
                .map_err(|e| StorageError::backend(e, "get_object", bucket, Some(key)))?;
            Ok(Bytes::from(data))
        })
        .await
    }

    /// 列出匹配前缀的全部 key，跳过缺失或为空的 key
    pub async fn list_objects(
        &self,
        ctx: &Context,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, StorageError> {
        let backend = &self.backend;
        let entries = paging::drain(ctx, "list_objects", bucket, |cursor| async move {
            backend
                .list_objects_page(bucket, prefix, cursor.as_deref())
                .await
        })
        .await?;

        let keys: Vec<String> = entries
            .into_iter()
            .filter_map(|entry| entry.key.filter(|k| !k.is_empty()))
            .collect();
        debug!(bucket, prefix, keys = keys.len(), "objects listed");
        Ok(keys)
    }

    /// 删除单个对象，后端的返回不做转换
    pub async fn delete_object(
        &self,
        ctx: &Context,
        bucket: &str,
        key: &str,
    ) -> Result<(), StorageError> {
        ctx.run("delete_object", self.backend.delete_object(bucket, key))
            .await
    }
}
