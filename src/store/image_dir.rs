// 该文件是 Tianjian （田间） 项目的一部分。
// src/store/image_dir.rs - 下载图像的本地目录
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

#[derive(Debug, Clone)]
pub struct ImageDir {
  root: PathBuf,
}

impl ImageDir {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    ImageDir { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// 写入图像并返回绝对路径；同名文件被覆盖
  pub async fn save(&self, file_name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    fs::create_dir_all(&self.root).await?;
    let path = self.root.join(file_name);
    let partial = self.root.join(format!(".{}.part", file_name));
    fs::write(&partial, bytes).await?;
    fs::rename(&partial, &path).await?;
    Ok(std::path::absolute(&path).unwrap_or(path))
  }

  /// 记录中的图像可能已被删除，不存在时返回 `None`
  pub fn resolve_existing(image_path: &str) -> Option<PathBuf> {
    if image_path.is_empty() {
      return None;
    }
    let path = PathBuf::from(image_path);
    path.is_file().then_some(path)
  }
}
