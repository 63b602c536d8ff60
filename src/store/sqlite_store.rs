// 该文件是 Tianjian （田间） 项目的一部分。
// src/store/sqlite_store.rs - SQLite 检测记录存储
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

use std::{
  path::{Path, PathBuf},
  sync::{Mutex, MutexGuard},
};

use rusqlite::{Connection, Row, params, types::Type};
use tokio::sync::watch;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Category, DetectionRecord, RecordKind, normalize_confidence},
  store::{DetectionStore, StoreError},
};

const MEMORY_PATH: &str = ":memory:";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS detections (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    kind            TEXT NOT NULL,
    remote_id       TEXT,
    label           TEXT NOT NULL,
    category        TEXT NOT NULL,
    confidence      REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    image_path      TEXT NOT NULL DEFAULT '',
    detected_at     INTEGER NOT NULL,
    synced_to_cloud INTEGER NOT NULL DEFAULT 0,
    UNIQUE (kind, remote_id)
);
CREATE INDEX IF NOT EXISTS idx_detections_unsynced ON detections (kind, synced_to_cloud);
CREATE INDEX IF NOT EXISTS idx_detections_detected_at ON detections (detected_at DESC);
";

const SELECT_COLUMNS: &str =
  "SELECT id, remote_id, label, category, confidence, image_path, detected_at, synced_to_cloud FROM detections";

pub struct SqliteStore {
  conn: Mutex<Connection>,
  path: Option<PathBuf>,
  /// 每次写入后递增，供界面重新查询
  changes: watch::Sender<u64>,
}

impl FromUrlWithScheme for SqliteStore {
  const SCHEME: &'static str = "sqlite";
}

impl FromUrl for SqliteStore {
  type Error = StoreError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(StoreError::SchemeMismatch);
    }
    if url.path() == MEMORY_PATH {
      return Self::open_in_memory();
    }
    let path = urlencoding::decode(url.path())
      .map_err(|_| StoreError::InvalidPath(url.path().to_string()))?;
    Self::open(path.as_ref())
  }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<DetectionRecord> {
  let category: String = row.get(3)?;
  let category = category
    .parse::<Category>()
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
  Ok(DetectionRecord {
    id: row.get(0)?,
    remote_id: row.get(1)?,
    label: row.get(2)?,
    category,
    confidence: row.get(4)?,
    image_path: row.get(5)?,
    detected_at: row.get(6)?,
    synced_to_cloud: row.get(7)?,
  })
}

impl SqliteStore {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }
    let conn = Connection::open(path)?;
    info!("本地数据库: {}", path.display());
    Self::init(conn, Some(path.to_path_buf()))
  }

  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::init(Connection::open_in_memory()?, None)
  }

  fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
    conn.execute_batch(SCHEMA)?;
    let (changes, _) = watch::channel(0);
    Ok(SqliteStore {
      conn: Mutex::new(conn),
      path,
      changes,
    })
  }

  pub fn path(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
    self.changes.subscribe()
  }

  fn conn(&self) -> MutexGuard<'_, Connection> {
    match self.conn.lock() {
      Ok(conn) => conn,
      Err(poisoned) => poisoned.into_inner(),
    }
  }

  fn notify_changed(&self) {
    self.changes.send_modify(|revision| *revision += 1);
  }

  fn query_records(&self, sql: &str, kind: RecordKind) -> Result<Vec<DetectionRecord>, StoreError> {
    let conn = self.conn();
    let mut stmt = conn.prepare(sql)?;
    let records = stmt
      .query_map(params![kind.as_str()], row_to_record)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
  }
}

impl DetectionStore for SqliteStore {
  type Error = StoreError;

  fn upsert(&self, kind: RecordKind, record: &DetectionRecord) -> Result<i64, Self::Error> {
    let id = self.conn().query_row(
      "INSERT INTO detections
         (kind, remote_id, label, category, confidence, image_path, detected_at, synced_to_cloud)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
       ON CONFLICT (kind, remote_id) DO UPDATE SET
         label = excluded.label,
         category = excluded.category,
         confidence = excluded.confidence,
         image_path = excluded.image_path,
         detected_at = excluded.detected_at,
         synced_to_cloud = excluded.synced_to_cloud
       RETURNING id",
      params![
        kind.as_str(),
        record.remote_id,
        record.label,
        record.category.as_str(),
        normalize_confidence(record.confidence),
        record.image_path,
        record.detected_at,
        record.synced_to_cloud,
      ],
      |row| row.get(0),
    )?;
    self.notify_changed();
    Ok(id)
  }

  fn unsynced(&self, kind: RecordKind) -> Result<Vec<DetectionRecord>, Self::Error> {
    self.query_records(
      &format!("{} WHERE kind = ?1 AND synced_to_cloud = 0 ORDER BY id", SELECT_COLUMNS),
      kind,
    )
  }

  fn mark_synced(&self, kind: RecordKind, id: i64) -> Result<(), Self::Error> {
    self.conn().execute(
      "UPDATE detections SET synced_to_cloud = 1 WHERE kind = ?1 AND id = ?2",
      params![kind.as_str(), id],
    )?;
    self.notify_changed();
    Ok(())
  }

  fn all(&self, kind: RecordKind) -> Result<Vec<DetectionRecord>, Self::Error> {
    self.query_records(
      &format!("{} WHERE kind = ?1 ORDER BY detected_at DESC, id DESC", SELECT_COLUMNS),
      kind,
    )
  }

  fn count(&self, kind: RecordKind) -> Result<usize, Self::Error> {
    let count: i64 = self.conn().query_row(
      "SELECT COUNT(*) FROM detections WHERE kind = ?1",
      params![kind.as_str()],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }

  fn label_counts(&self) -> Result<Vec<(String, u64)>, Self::Error> {
    let conn = self.conn();
    let mut stmt = conn.prepare(
      "SELECT label, COUNT(*) FROM detections GROUP BY label ORDER BY COUNT(*) DESC, label",
    )?;
    let counts = stmt
      .query_map([], |row| {
        let count: i64 = row.get(1)?;
        Ok((row.get::<_, String>(0)?, count as u64))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(counts)
  }
}
