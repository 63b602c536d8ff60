// 该文件是 Tianjian （田间） 项目的一部分。
// src/sync.rs - 本地记录推送到云端
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

use std::{collections::HashMap, sync::Arc};

use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::{
  catalog::ReferenceMatcher,
  cloud::{Document, DocumentSink},
  model::{Category, RecordKind},
  now_millis,
  status::PushStatus,
  store::{DetectionStore, run_blocking},
};

pub const DEFAULT_TOP_N: usize = 10;
pub const ANALYTICS_PATH: &str = "statistics/pest_analytics";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum SyncError {
  #[error("已有推送在进行中")]
  AlreadyRunning,
  #[error("本地存储错误: {0}")]
  Store(#[source] BoxError),
  #[error("写入云端文档 {path} 失败: {source}")]
  Cloud { path: String, source: BoxError },
}

/// 目录条目的累计检测次数
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogCount {
  pub key: String,
  pub name: String,
  pub category: Category,
  pub count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PushReport {
  pub pushed: Vec<(RecordKind, usize)>,
  pub most_detected: Vec<CatalogCount>,
  pub pushed_at: i64,
}

impl PushReport {
  pub fn total_pushed(&self) -> usize {
    self.pushed.iter().map(|(_, n)| n).sum()
  }
}

/// 云端文档 id：去掉重音，非字母数字折叠为 `_`
pub fn document_id(key: &str) -> String {
  let folded: String = key
    .chars()
    .map(|c| match c {
      'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
      'é' | 'è' | 'ê' | 'ë' => 'e',
      'í' | 'ì' | 'î' | 'ï' => 'i',
      'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
      'ú' | 'ù' | 'û' | 'ü' => 'u',
      'ç' => 'c',
      'ñ' => 'n',
      c if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
      _ => '_',
    })
    .collect();
  folded
    .split('_')
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("_")
}

/// 把本地未同步的记录推送到云端，并更新聚合统计。
///
/// 中途失败不回滚：已推送的记录保持已同步，重跑时跳过。
pub struct CloudSync<D, K> {
  store: Arc<D>,
  sink: Arc<K>,
  matcher: Arc<ReferenceMatcher>,
  top_n: usize,
  status: watch::Sender<PushStatus>,
  last_push: watch::Sender<Option<i64>>,
}

impl<D, K> CloudSync<D, K>
where
  D: DetectionStore + 'static,
  K: DocumentSink,
{
  pub fn new(store: Arc<D>, sink: Arc<K>, matcher: Arc<ReferenceMatcher>) -> Self {
    let (status, _) = watch::channel(PushStatus::Idle);
    let (last_push, _) = watch::channel(None);
    CloudSync {
      store,
      sink,
      matcher,
      top_n: DEFAULT_TOP_N,
      status,
      last_push,
    }
  }

  pub fn with_top_n(mut self, top_n: usize) -> Self {
    self.top_n = top_n;
    self
  }

  pub fn status(&self) -> PushStatus {
    self.status.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<PushStatus> {
    self.status.subscribe()
  }

  /// 最近一次成功推送的时间（Unix 毫秒）
  pub fn last_push_ms(&self) -> Option<i64> {
    *self.last_push.borrow()
  }

  pub fn subscribe_last_push(&self) -> watch::Receiver<Option<i64>> {
    self.last_push.subscribe()
  }

  pub fn reset_status(&self) -> bool {
    self.status.send_if_modified(|status| match status {
      PushStatus::Success { .. } | PushStatus::Error { .. } => {
        *status = PushStatus::Idle;
        true
      }
      _ => false,
    })
  }

  pub async fn push(&self) -> Result<PushReport, SyncError> {
    let started = self.status.send_if_modified(|status| {
      if *status == PushStatus::Syncing {
        false
      } else {
        *status = PushStatus::Syncing;
        true
      }
    });
    if !started {
      return Err(SyncError::AlreadyRunning);
    }

    match self.push_all().await {
      Ok(report) => {
        info!(
          "推送完成: {} 条记录, {} 个统计条目",
          report.total_pushed(),
          report.most_detected.len()
        );
        self.last_push.send_replace(Some(report.pushed_at));
        self.status.send_replace(PushStatus::Success {
          pushed: report.total_pushed(),
        });
        Ok(report)
      }
      Err(e) => {
        error!("推送失败: {}", e);
        self.status.send_replace(PushStatus::Error {
          message: e.to_string(),
        });
        Err(e)
      }
    }
  }

  async fn push_all(&self) -> Result<PushReport, SyncError> {
    let mut report = PushReport::default();
    for kind in RecordKind::ALL {
      let pending = run_blocking(&self.store, move |store| store.unsynced(kind))
        .await
        .map_err(SyncError::Store)?;
      debug!("{} 类记录待推送 {} 条", kind, pending.len());
      let mut pushed = 0;
      for record in pending {
        let path = format!("detections/{}", record.id);
        self.write(&path, &record.to_document(kind)).await?;
        let id = record.id;
        run_blocking(&self.store, move |store| store.mark_synced(kind, id))
          .await
          .map_err(SyncError::Store)?;
        pushed += 1;
      }
      report.pushed.push((kind, pushed));
    }

    let labels = run_blocking(&self.store, |store| store.label_counts())
      .await
      .map_err(SyncError::Store)?;
    let counts = self.tally(labels);
    report.pushed_at = now_millis();
    for entry in &counts {
      let mut doc = Document::new();
      doc.insert("name".into(), json!(entry.name));
      doc.insert("category".into(), json!(entry.category.as_str()));
      doc.insert("detectionCount".into(), json!(entry.count));
      self
        .write(&format!("pests/{}", document_id(&entry.key)), &doc)
        .await?;
    }

    report.most_detected = counts.into_iter().take(self.top_n).collect();
    let most_detected: Vec<Value> = report
      .most_detected
      .iter()
      .map(|entry| {
        json!({
          "pestId": entry.key,
          "pestName": entry.name,
          "detectionCount": entry.count,
          "type": entry.category.as_str(),
        })
      })
      .collect();
    let mut analytics = Document::new();
    analytics.insert("mostDetected".into(), Value::Array(most_detected));
    analytics.insert("lastUpdated".into(), json!(report.pushed_at));
    self.write(ANALYTICS_PATH, &analytics).await?;

    Ok(report)
  }

  /// 按目录条目汇总全部检测次数，次数降序，相同次数按键排序
  pub fn catalog_counts(&self) -> Result<Vec<CatalogCount>, SyncError> {
    let labels = self
      .store
      .label_counts()
      .map_err(|e| SyncError::Store(Box::new(e)))?;
    Ok(self.tally(labels))
  }

  fn tally(&self, labels: Vec<(String, u64)>) -> Vec<CatalogCount> {
    let mut by_key: HashMap<String, CatalogCount> = HashMap::new();
    for (label, count) in labels {
      let Some(entry) = self.matcher.resolve(&label) else {
        debug!("标签 '{}' 不在目录中，不计入统计", label);
        continue;
      };
      by_key
        .entry(entry.key.clone())
        .and_modify(|c| c.count += count)
        .or_insert(CatalogCount {
          key: entry.key,
          name: entry.display_name,
          category: entry.category,
          count,
        });
    }
    let mut counts: Vec<CatalogCount> = by_key.into_values().collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    counts
  }

  async fn write(&self, path: &str, document: &Document) -> Result<(), SyncError> {
    self
      .sink
      .write_document(path, document)
      .await
      .map_err(|e| SyncError::Cloud {
        path: path.to_string(),
        source: Box::new(e),
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{collections::BTreeMap, sync::Mutex};

  use crate::{
    model::DetectionRecord,
    store::{SqliteStore, StoreError},
  };

  #[derive(Default)]
  struct MemorySink {
    docs: Mutex<BTreeMap<String, Document>>,
    fail_prefix: Option<&'static str>,
  }

  impl DocumentSink for MemorySink {
    type Error = std::io::Error;

    async fn write_document(&self, path: &str, document: &Document) -> Result<(), Self::Error> {
      if self.fail_prefix.is_some_and(|prefix| path.starts_with(prefix)) {
        return Err(std::io::Error::other("offline"));
      }
      self
        .docs
        .lock()
        .unwrap()
        .insert(path.to_string(), document.clone());
      Ok(())
    }
  }

  fn seeded_store() -> Result<Arc<SqliteStore>, StoreError> {
    let store = SqliteStore::open_in_memory()?;
    for (i, label) in ["Aphids", "Early Blight", "aphids", "Healthy"].iter().enumerate() {
      let record = DetectionRecord::new(*label, Category::Pest, 0.9).with_remote_id(format!("r{i}"));
      store.upsert(RecordKind::FieldUnit, &record)?;
    }
    store.upsert(
      RecordKind::Captured,
      &DetectionRecord::new("late_blight", Category::Disease, 0.7),
    )?;
    Ok(Arc::new(store))
  }

  fn sync(
    store: Arc<SqliteStore>,
    sink: Arc<MemorySink>,
  ) -> CloudSync<SqliteStore, MemorySink> {
    CloudSync::new(store, sink, Arc::new(ReferenceMatcher::bundled().unwrap()))
  }

  #[test]
  fn document_ids_are_plain() {
    assert_eq!(document_id("Spider Mites"), "spider_mites");
    assert_eq!(document_id("Vírus do Enrolamento da Folha"), "virus_do_enrolamento_da_folha");
    assert_eq!(document_id("Mancha-de-Septória"), "mancha_de_septoria");
  }

  #[tokio::test]
  async fn pushes_unsynced_records_and_analytics() {
    let store = seeded_store().unwrap();
    let sink = Arc::new(MemorySink::default());
    let sync = sync(store.clone(), sink.clone());

    let report = sync.push().await.unwrap();
    assert_eq!(report.total_pushed(), 5);
    assert_eq!(sync.status(), PushStatus::Success { pushed: 5 });
    assert_eq!(sync.last_push_ms(), Some(report.pushed_at));

    let docs = sink.docs.lock().unwrap();
    assert_eq!(docs.keys().filter(|k| k.starts_with("detections/")).count(), 5);

    let analytics = &docs[ANALYTICS_PATH];
    let most = analytics["mostDetected"].as_array().unwrap();
    assert_eq!(most[0]["pestId"], "Aphids");
    assert_eq!(most[0]["detectionCount"], 2);
    assert_eq!(most[0]["type"], "PEST");
    assert_eq!(most.len(), 3);
    assert_eq!(analytics["lastUpdated"], report.pushed_at);

    assert_eq!(docs["pests/pinta_preta"]["detectionCount"], 1);
    assert_eq!(docs["pests/requeima"]["category"], "DISEASE");
    assert!(store.unsynced(RecordKind::FieldUnit).unwrap().is_empty());
    assert!(store.unsynced(RecordKind::Captured).unwrap().is_empty());
  }

  #[tokio::test]
  async fn rerun_skips_synced_records() {
    let store = seeded_store().unwrap();
    let sink = Arc::new(MemorySink::default());
    let sync = sync(store, sink);

    sync.push().await.unwrap();
    let again = sync.push().await.unwrap();
    assert_eq!(again.total_pushed(), 0);
    assert_eq!(again.most_detected.len(), 3);
  }

  #[tokio::test]
  async fn failure_keeps_already_pushed_records() {
    let store = seeded_store().unwrap();
    let sink = Arc::new(MemorySink {
      fail_prefix: Some("statistics/"),
      ..Default::default()
    });
    let sync = sync(store.clone(), sink);

    let result = sync.push().await;
    assert!(matches!(result, Err(SyncError::Cloud { ref path, .. }) if path == ANALYTICS_PATH));
    assert!(matches!(sync.status(), PushStatus::Error { .. }));
    assert_eq!(sync.last_push_ms(), None);
    assert!(store.unsynced(RecordKind::FieldUnit).unwrap().is_empty());

    assert!(sync.reset_status());
    assert_eq!(sync.status(), PushStatus::Idle);
  }

  #[tokio::test]
  async fn top_n_limits_the_aggregate() {
    let store = seeded_store().unwrap();
    let sync = sync(store, Arc::new(MemorySink::default())).with_top_n(1);
    let report = sync.push().await.unwrap();
    assert_eq!(report.most_detected.len(), 1);
    assert_eq!(report.most_detected[0].key, "Aphids");
  }
}
