// 该文件是 Tianjian （田间） 项目的一部分。
// src/cloud.rs - 云端文档存储
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::future::Future;

use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

#[cfg(any(feature = "directory_sink", feature = "http_sink"))]
use crate::FromUrlWithScheme;
use crate::FromUrl;

/// 写入云端的扁平键值文档
pub type Document = Map<String, Value>;

/// 以 `collection/id` 路径写入文档，已存在时整体覆盖
pub trait DocumentSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
  fn write_document(
    &self,
    path: &str,
    document: &Document,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

#[cfg(feature = "directory_sink")]
mod directory_sink;
#[cfg(feature = "directory_sink")]
pub use self::directory_sink::DirectorySink;

#[cfg(feature = "http_sink")]
mod http_sink;
#[cfg(feature = "http_sink")]
pub use self::http_sink::HttpSink;

#[derive(Error, Debug)]
pub enum CloudError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的文档路径: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("HTTP 错误: {0}")]
  HttpError(#[from] reqwest::Error),
  #[error("云端返回状态码: {0}")]
  Status(u16),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 拆分并校验文档路径，只允许简单的路径段
pub fn split_document_path(path: &str) -> Result<Vec<&str>, CloudError> {
  let segments: Vec<&str> = path.split('/').collect();
  let valid = segments.iter().all(|segment| {
    !segment.is_empty()
      && *segment != "."
      && *segment != ".."
      && segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
  });
  if !valid {
    return Err(CloudError::InvalidPath(path.to_string()));
  }
  Ok(segments)
}

pub enum CloudWrapper {
  #[cfg(feature = "directory_sink")]
  Directory(DirectorySink),
  #[cfg(feature = "http_sink")]
  Http(HttpSink),
}

impl FromUrl for CloudWrapper {
  type Error = CloudError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "directory_sink")]
      DirectorySink::SCHEME => Ok(CloudWrapper::Directory(DirectorySink::from_url(url)?)),
      #[cfg(feature = "http_sink")]
      HttpSink::SCHEME | "http" => Ok(CloudWrapper::Http(HttpSink::from_url(url)?)),
      _ => Err(CloudError::SchemeMismatch),
    }
  }
}

impl DocumentSink for CloudWrapper {
  type Error = CloudError;

  async fn write_document(&self, path: &str, document: &Document) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "directory_sink")]
      CloudWrapper::Directory(sink) => sink.write_document(path, document).await,
      #[cfg(feature = "http_sink")]
      CloudWrapper::Http(sink) => sink.write_document(path, document).await,
    }
  }
}
