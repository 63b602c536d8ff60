// 该文件是 Tianjian （田间） 项目的一部分。
// src/model/detection.rs - 检测记录
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

use std::{fmt, str::FromStr};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::model::ModelError;

/// 检测对象的类别：虫害或病害
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
  Pest,
  Disease,
}

impl Category {
  pub fn as_str(&self) -> &'static str {
    match self {
      Category::Pest => "PEST",
      Category::Disease => "DISEASE",
    }
  }

  /// 解析野外单元上报的类别字符串（`PRAGA` / `DOENCA`），无法识别时按虫害处理
  pub fn from_upstream(raw: &str) -> Self {
    match raw.trim().to_uppercase().as_str() {
      "PRAGA" | "PEST" => Category::Pest,
      "DOENCA" | "DOENÇA" | "DISEASE" => Category::Disease,
      other => {
        warn!("未知的上游类别 '{}'，按虫害处理", other);
        Category::Pest
      }
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Category {
  type Err = ModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "PEST" => Ok(Category::Pest),
      "DISEASE" => Ok(Category::Disease),
      _ => Err(ModelError::UnknownCategory(s.to_string())),
    }
  }
}

/// 参与同步的记录来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
  /// 从野外单元拉取的检测
  FieldUnit,
  /// 本机分类得到的检测
  Captured,
}

impl RecordKind {
  pub const ALL: [RecordKind; 2] = [RecordKind::FieldUnit, RecordKind::Captured];

  pub fn as_str(&self) -> &'static str {
    match self {
      RecordKind::FieldUnit => "field_unit",
      RecordKind::Captured => "captured",
    }
  }
}

impl fmt::Display for RecordKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RecordKind {
  type Err = ModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "field_unit" => Ok(RecordKind::FieldUnit),
      "captured" => Ok(RecordKind::Captured),
      _ => Err(ModelError::UnknownRecordKind(s.to_string())),
    }
  }
}

/// 将上游置信度归一化到 [0.0, 1.0]
///
/// 大于 1.0 的值视为百分比。
pub fn normalize_confidence(raw: f64) -> f64 {
  if raw.is_nan() {
    return 0.0;
  }
  let value = if raw > 1.0 { raw / 100.0 } else { raw };
  value.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
  /// 本地 id，插入前为 0
  pub id: i64,
  /// 野外单元提供的自然键
  pub remote_id: Option<String>,
  pub label: String,
  pub category: Category,
  pub confidence: f64,
  /// 本地图像路径，没有图像时为空字符串
  pub image_path: String,
  /// Unix 毫秒
  pub detected_at: i64,
  pub synced_to_cloud: bool,
}

impl DetectionRecord {
  pub fn new(label: impl Into<String>, category: Category, confidence: f64) -> Self {
    DetectionRecord {
      id: 0,
      remote_id: None,
      label: label.into(),
      category,
      confidence: normalize_confidence(confidence),
      image_path: String::new(),
      detected_at: crate::now_millis(),
      synced_to_cloud: false,
    }
  }

  pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
    self.remote_id = Some(remote_id.into());
    self
  }

  pub fn with_image_path(mut self, image_path: impl Into<String>) -> Self {
    self.image_path = image_path.into();
    self
  }

  pub fn with_detected_at(mut self, detected_at: i64) -> Self {
    self.detected_at = detected_at;
    self
  }

  pub fn has_image(&self) -> bool {
    !self.image_path.is_empty()
  }

  /// 生成写入云端的扁平文档
  pub fn to_document(&self, kind: RecordKind) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert("source".into(), Value::from(kind.as_str()));
    doc.insert(
      "remoteId".into(),
      self
        .remote_id
        .as_deref()
        .map(Value::from)
        .unwrap_or(Value::Null),
    );
    doc.insert("label".into(), Value::from(self.label.as_str()));
    doc.insert("category".into(), Value::from(self.category.as_str()));
    doc.insert("confidence".into(), Value::from(self.confidence));
    doc.insert("imagePath".into(), Value::from(self.image_path.as_str()));
    doc.insert("detectedAt".into(), Value::from(self.detected_at));
    doc
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn confidence_is_kept_in_unit_range() {
    assert_eq!(normalize_confidence(0.82), 0.82);
    assert_eq!(normalize_confidence(82.0), 0.82);
    assert_eq!(normalize_confidence(-0.3), 0.0);
    assert_eq!(normalize_confidence(250.0), 1.0);
    assert_eq!(normalize_confidence(f64::NAN), 0.0);
    assert_eq!(normalize_confidence(1.0), 1.0);
  }

  #[test]
  fn upstream_category_names() {
    assert_eq!(Category::from_upstream("PRAGA"), Category::Pest);
    assert_eq!(Category::from_upstream("doenca"), Category::Disease);
    assert_eq!(Category::from_upstream("DISEASE"), Category::Disease);
    assert_eq!(Category::from_upstream("whatever"), Category::Pest);
  }

  #[test]
  fn category_and_kind_round_trip_through_storage_names() {
    for category in [Category::Pest, Category::Disease] {
      assert_eq!(category.as_str().parse::<Category>(), Ok(category));
    }
    for kind in RecordKind::ALL {
      assert_eq!(kind.as_str().parse::<RecordKind>(), Ok(kind));
    }
    assert!("PRAGA".parse::<Category>().is_err());
  }

  #[test]
  fn document_is_flat() {
    let record = DetectionRecord::new("Aphids", Category::Pest, 0.5)
      .with_remote_id("p1")
      .with_detected_at(1_000);
    let doc = record.to_document(RecordKind::FieldUnit);
    assert_eq!(doc["source"], "field_unit");
    assert_eq!(doc["remoteId"], "p1");
    assert_eq!(doc["category"], "PEST");
    assert_eq!(doc["detectedAt"], 1_000);
    assert!(doc.values().all(|v| !v.is_object() && !v.is_array()));
  }
}
