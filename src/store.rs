// 该文件是 Tianjian （田间） 项目的一部分。
// src/store.rs - 本地存储
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

use std::sync::Arc;

use thiserror::Error;

use crate::model::{DetectionRecord, ModelError, RecordKind};

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的数据库路径: {0}")]
  InvalidPath(String),
  #[error("SQLite 错误: {0}")]
  SqliteError(#[from] rusqlite::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("数据错误: {0}")]
  ModelError(#[from] ModelError),
}

/// 检测记录的本地存储
///
/// 每条记录的写入都是原子的；并发写入由实现串行化。
pub trait DetectionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 按 (类型, 自然键) 插入或整体替换，返回本地 id；没有自然键的记录总是插入
  fn upsert(&self, kind: RecordKind, record: &DetectionRecord) -> Result<i64, Self::Error>;
  fn unsynced(&self, kind: RecordKind) -> Result<Vec<DetectionRecord>, Self::Error>;
  fn mark_synced(&self, kind: RecordKind, id: i64) -> Result<(), Self::Error>;
  /// 按检测时间倒序
  fn all(&self, kind: RecordKind) -> Result<Vec<DetectionRecord>, Self::Error>;
  fn count(&self, kind: RecordKind) -> Result<usize, Self::Error>;
  /// 所有类型合计的 (标签, 检测次数)
  fn label_counts(&self) -> Result<Vec<(String, u64)>, Self::Error>;
}

/// 在阻塞线程池上执行一次存储操作
pub async fn run_blocking<D, T, F>(
  store: &Arc<D>,
  op: F,
) -> Result<T, Box<dyn std::error::Error + Send + Sync>>
where
  D: DetectionStore + 'static,
  T: Send + 'static,
  F: FnOnce(&D) -> Result<T, D::Error> + Send + 'static,
{
  let store = Arc::clone(store);
  match tokio::task::spawn_blocking(move || op(&store)).await {
    Ok(result) => result.map_err(Into::into),
    Err(e) => Err(Box::new(e)),
  }
}

mod sqlite_store;
pub use self::sqlite_store::SqliteStore;

mod image_dir;
pub use self::image_dir::ImageDir;

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Category;

  #[tokio::test]
  async fn blocking_operations_reach_the_store() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let record = DetectionRecord::new("Aphids", Category::Pest, 0.5);
    let id = run_blocking(&store, move |store| store.upsert(RecordKind::Captured, &record))
      .await
      .unwrap();
    assert!(id > 0);
    let count = run_blocking(&store, |store| store.count(RecordKind::Captured))
      .await
      .unwrap();
    assert_eq!(count, 1);
  }
}
