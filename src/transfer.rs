// 该文件是 Tianjian （田间） 项目的一部分。
// src/transfer.rs - 从野外单元拉取检测数据
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
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
  model::RecordKind,
  remote::{FieldUnitSource, ManifestItem, RemoteError, parse_manifest},
  status::TransferStatus,
  store::{DetectionStore, ImageDir, run_blocking},
};

#[derive(Error, Debug)]
pub enum TransferError {
  #[error(transparent)]
  Remote(#[from] RemoteError),
  #[error("清单格式错误: {0}")]
  Manifest(serde_json::Error),
  #[error("第 {index} 个清单条目无效: {source}")]
  Item {
    index: usize,
    source: serde_json::Error,
  },
  #[error("本地存储失败: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 第 `index` 个条目（从 0 开始）处理完后的进度，四舍五入到整数百分比
pub fn progress_percent(index: usize, total: usize) -> u8 {
  if total == 0 {
    return 100;
  }
  let done = (index + 1).min(total);
  ((done * 100 + total / 2) / total) as u8
}

/// 驱动一次完整的拉取，并以状态机的形式对外发布进度。
///
/// 同一时刻最多只有一次拉取；条目按清单顺序逐个处理，不并发请求野外单元。
pub struct TransferOrchestrator<S, D> {
  source: Arc<S>,
  store: Arc<D>,
  images: ImageDir,
  status: watch::Sender<TransferStatus>,
}

impl<S, D> TransferOrchestrator<S, D>
where
  S: FieldUnitSource + 'static,
  D: DetectionStore + 'static,
{
  pub fn new(source: Arc<S>, store: Arc<D>, images: ImageDir) -> Self {
    let (status, _) = watch::channel(TransferStatus::Idle);
    TransferOrchestrator {
      source,
      store,
      images,
      status,
    }
  }

  pub fn status(&self) -> TransferStatus {
    self.status.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<TransferStatus> {
    self.status.subscribe()
  }

  /// 从终止状态回到 `Idle`；连接或传输过程中调用无效
  pub fn reset_status(&self) -> bool {
    self.status.send_if_modified(|status| {
      if status.is_terminal() {
        *status = TransferStatus::Idle;
        true
      } else {
        false
      }
    })
  }

  /// 执行一次拉取并返回最终状态；已有拉取在进行时直接返回当前状态
  pub async fn run_transfer(&self) -> TransferStatus {
    let started = self.status.send_if_modified(|status| {
      if status.is_in_flight() {
        false
      } else {
        *status = TransferStatus::Connecting;
        true
      }
    });
    if !started {
      info!("已有拉取在进行中，忽略本次请求");
      return self.status();
    }

    info!("开始从野外单元拉取数据");
    let last = match self.pull().await {
      Ok(item_count) => {
        info!("拉取完成，共 {} 条", item_count);
        TransferStatus::Success { item_count }
      }
      Err(e) => {
        error!("拉取失败: {}", e);
        TransferStatus::Error {
          message: e.to_string(),
        }
      }
    };
    self.status.send_replace(last.clone());
    last
  }

  async fn pull(&self) -> Result<usize, TransferError> {
    let body = self.source.fetch_manifest().await?;
    let items = parse_manifest(&body).map_err(TransferError::Manifest)?;
    let total = items.len();
    info!("清单包含 {} 个条目", total);
    if total == 0 {
      return Ok(0);
    }

    self.publish(0, format!("准备传输 {} 个条目", total));
    let mut processed = 0;
    for (index, value) in items.into_iter().enumerate() {
      let item = ManifestItem::from_value(value)
        .map_err(|source| TransferError::Item { index, source })?;
      let image_path = self.download_image(&item).await;
      let record = item.to_record(image_path);
      let label = record.label.clone();
      run_blocking(&self.store, move |store| {
        store.upsert(RecordKind::FieldUnit, &record)
      })
      .await
      .map_err(TransferError::Store)?;
      processed += 1;
      self.publish(
        progress_percent(index, total),
        format!("已处理 {}/{}: {}", index + 1, total, label),
      );
    }
    Ok(processed)
  }

  /// 图像失败不影响条目本身，记录的图像路径留空
  async fn download_image(&self, item: &ManifestItem) -> String {
    let Some(reference) = item.first_image() else {
      return String::new();
    };
    let bytes = match self.source.fetch_image(reference).await {
      Ok(bytes) => bytes,
      Err(e) => {
        warn!("条目 {} 的图像 {} 下载失败: {}", item.id, reference, e);
        return String::new();
      }
    };
    match self.images.save(&item.image_file_name(), &bytes).await {
      Ok(path) => path.to_string_lossy().into_owned(),
      Err(e) => {
        warn!("条目 {} 的图像保存失败: {}", item.id, e);
        String::new()
      }
    }
  }

  fn publish(&self, progress: u8, message: String) {
    self
      .status
      .send_replace(TransferStatus::Transferring { progress, message });
  }

  /// 在后台任务中执行拉取，进度通过 [`Self::subscribe`] 观察
  pub fn spawn_transfer(self: &Arc<Self>) -> JoinHandle<TransferStatus> {
    let this = Arc::clone(self);
    tokio::spawn(async move { this.run_transfer().await })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn percent_is_rounded_and_ends_at_full() {
    assert_eq!(progress_percent(0, 3), 33);
    assert_eq!(progress_percent(1, 3), 67);
    assert_eq!(progress_percent(2, 3), 100);
    assert_eq!(progress_percent(0, 1), 100);
    assert_eq!(progress_percent(0, 0), 100);
  }

  #[test]
  fn percent_never_decreases() {
    for total in 1..=250 {
      let values: Vec<u8> = (0..total).map(|i| progress_percent(i, total)).collect();
      assert!(values.windows(2).all(|w| w[0] <= w[1]), "total = {total}");
      assert_eq!(values.last(), Some(&100));
    }
  }
}
