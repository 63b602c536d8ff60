// 该文件是 Tianjian （田间） 项目的一部分。
// src/cloud/directory_sink.rs - 以本地目录模拟的云端文档存储
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

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  cloud::{CloudError, Document, DocumentSink, split_document_path},
};

/// 每个文档保存为 `<root>/<collection>/<id>.json`
pub struct DirectorySink {
  root: PathBuf,
}

impl FromUrlWithScheme for DirectorySink {
  const SCHEME: &'static str = "file";
}

impl FromUrl for DirectorySink {
  type Error = CloudError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CloudError::SchemeMismatch);
    }
    let root = url
      .to_file_path()
      .map_err(|_| CloudError::InvalidPath(url.to_string()))?;
    Ok(DirectorySink::new(root))
  }
}

impl DirectorySink {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    DirectorySink { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn document_file(&self, path: &str) -> Result<PathBuf, CloudError> {
    let segments = split_document_path(path)?;
    let mut file = self.root.clone();
    if let Some((last, parents)) = segments.split_last() {
      for parent in parents {
        file.push(parent);
      }
      file.push(format!("{}.json", last));
    }
    Ok(file)
  }
}

impl DocumentSink for DirectorySink {
  type Error = CloudError;

  async fn write_document(&self, path: &str, document: &Document) -> Result<(), Self::Error> {
    let file = self.document_file(path)?;
    if let Some(parent) = file.parent() {
      fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(document)?;
    let partial = file.with_extension("json.part");
    fs::write(&partial, body).await?;
    fs::rename(&partial, &file).await?;
    debug!("文档已写入 {}", file.display());
    Ok(())
  }
}
