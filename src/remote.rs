// 该文件是 Tianjian （田间） 项目的一部分。
// src/remote.rs - 野外单元 HTTP 接口
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

use thiserror::Error;

pub const MANIFEST_ENDPOINT: &str = "/api/pests";
pub const STATUS_ENDPOINT: &str = "/api/status";
pub const CONTROL_ENDPOINT: &str = "/api/control";
pub const IMAGES_PREFIX: &str = "/images/";

#[derive(Error, Debug)]
pub enum RemoteError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("Server returned code: {0}")]
  Status(u16),
  #[error("Empty response body")]
  EmptyBody,
  #[error("HTTP 错误: {0}")]
  Http(#[from] reqwest::Error),
  #[error("URL 错误: {0}")]
  Url(#[from] url::ParseError),
  #[error("JSON 错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 拉取流程所需的数据来源
pub trait FieldUnitSource: Send + Sync {
  /// 获取清单原文（JSON 数组）
  fn fetch_manifest(&self) -> impl Future<Output = Result<String, RemoteError>> + Send;
  /// 下载清单条目引用的图像
  fn fetch_image(&self, reference: &str)
  -> impl Future<Output = Result<Vec<u8>, RemoteError>> + Send;
}

mod client;
pub use self::client::{DEFAULT_FIELD_UNIT_URL, DEFAULT_HTTP_TIMEOUT, FieldUnitClient};

mod control;
pub use self::control::ControlClient;

mod manifest;
pub use self::manifest::{ManifestItem, parse_manifest};
