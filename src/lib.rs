//! simple-s3 - S3 存储桶和对象的便捷操作层
//!
//! 在对象存储客户端之上提供简化的存储桶和对象操作，并附带少量策略：
//!
//! - **bucket**: 创建前检查存在性，删除时分页列出全部对象并按 1000 个一批删除
//! - **object**: 上传前嗅探内容类型，按大小选择单次上传或分片上传
//! - **backend**: 存储后端接口，提供 S3 实现和用于测试的内存实现
//! - **context**: 贯穿每次远程调用的取消和超时控制
//! - **config**: 从 YAML / JSON5 / TOML 文件加载配置

pub mod backend;
pub mod bucket;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod object;
mod paging;
pub mod sniff;
pub mod types;

pub use backend::{AwsS3Backend, AwsS3BackendConfig, MemoryBackend, ObjectReader, StorageBackend};
pub use bucket::{BucketManager, TeardownReport};
pub use client::SimpleS3;
pub use config::SimpleS3Config;
pub use context::Context;
pub use error::StorageError;
pub use object::ObjectCoordinator;
pub use types::{
    BatchDeleteOutcome, BucketEntry, KeyFailure, ObjectEntry, Page, PutOutcome, TeardownOptions,
    TransferOptions, UploadStrategy,
};
