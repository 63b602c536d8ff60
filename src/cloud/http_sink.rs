// 该文件是 Tianjian （田间） 项目的一部分。
// src/cloud/http_sink.rs - REST 风格的云端文档存储
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

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  cloud::{CloudError, Document, DocumentSink, split_document_path},
};

const CLOUD_TIMEOUT: Duration = Duration::from_secs(30);

/// `PUT <base>/<collection>/<id>.json`，基础 URL 的查询参数（如访问令牌）原样保留
pub struct HttpSink {
  base: Url,
  http: Client,
}

impl FromUrlWithScheme for HttpSink {
  const SCHEME: &'static str = "https";
}

impl FromUrl for HttpSink {
  type Error = CloudError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME && url.scheme() != "http" {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CloudError::SchemeMismatch);
    }
    if url.cannot_be_a_base() {
      return Err(CloudError::InvalidPath(url.to_string()));
    }
    let http = Client::builder().timeout(CLOUD_TIMEOUT).build()?;
    Ok(HttpSink {
      base: url.clone(),
      http,
    })
  }
}

impl HttpSink {
  pub fn document_url(&self, path: &str) -> Result<Url, CloudError> {
    let segments = split_document_path(path)?;
    let mut url = self.base.clone();
    {
      let mut parts = url
        .path_segments_mut()
        .map_err(|_| CloudError::InvalidPath(self.base.to_string()))?;
      parts.pop_if_empty();
      if let Some((last, parents)) = segments.split_last() {
        parts.extend(parents);
        parts.push(&format!("{}.json", last));
      }
    }
    Ok(url)
  }
}

impl DocumentSink for HttpSink {
  type Error = CloudError;

  async fn write_document(&self, path: &str, document: &Document) -> Result<(), Self::Error> {
    let url = self.document_url(path)?;
    debug!("PUT {}", url.path());
    let response = self.http.put(url).json(document).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(CloudError::Status(status.as_u16()));
    }
    Ok(())
  }
}
