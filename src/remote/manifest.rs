// 该文件是 Tianjian （田间） 项目的一部分。
// src/remote/manifest.rs - 清单条目解析
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

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::model::{Category, DetectionRecord, parse_detected_at};

const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

/// 清单必须是 JSON 数组；条目在遍历时逐个解码
pub fn parse_manifest(body: &str) -> Result<Vec<Value>, serde_json::Error> {
  serde_json::from_str(body)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!(
      "expected string or number, found {}",
      other
    ))),
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestItem {
  #[serde(deserialize_with = "string_or_number")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub name_en: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub images: Vec<String>,
  #[serde(default, rename = "type")]
  pub kind: Option<String>,
  #[serde(default)]
  pub confidence: Option<f64>,
  #[serde(default)]
  pub timestamp: Option<String>,
}

impl ManifestItem {
  pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
    serde_json::from_value(value)
  }

  /// 优先使用英文名称
  pub fn label(&self) -> &str {
    match self.name_en.as_deref() {
      Some(name_en) if !name_en.trim().is_empty() => name_en,
      _ => &self.name,
    }
  }

  pub fn category(&self) -> Category {
    self
      .kind
      .as_deref()
      .map(Category::from_upstream)
      .unwrap_or(Category::Pest)
  }

  pub fn first_image(&self) -> Option<&str> {
    self
      .images
      .iter()
      .map(String::as_str)
      .find(|image| !image.trim().is_empty())
  }

  /// 由条目 id 派生的本地文件名，重复拉取时保持不变。
  ///
  /// id 经百分号编码（`.` 也编码），不同的 id 不会得到同一个文件名。
  pub fn image_file_name(&self) -> String {
    let stem = match self.id.as_str() {
      "" => "%".to_string(),
      id => urlencoding::encode(id).replace('.', "%2E"),
    };
    let extension = self
      .first_image()
      .and_then(|image| image.rsplit('/').next())
      .and_then(|file| file.rsplit_once('.'))
      .map(|(_, ext)| ext.to_ascii_lowercase())
      .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
      .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string());
    format!("{}.{}", stem, extension)
  }

  pub fn to_record(&self, image_path: String) -> DetectionRecord {
    DetectionRecord::new(self.label(), self.category(), self.confidence.unwrap_or(0.0))
      .with_remote_id(self.id.clone())
      .with_image_path(image_path)
      .with_detected_at(parse_detected_at(self.timestamp.as_deref().unwrap_or("")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn manifest_must_be_an_array() {
    assert_eq!(parse_manifest("[]").unwrap().len(), 0);
    assert!(parse_manifest("{\"id\":\"p1\"}").is_err());
    assert!(parse_manifest("").is_err());
  }

  #[test]
  fn optional_fields_fall_back() {
    let item = ManifestItem::from_value(json!({"id": 7, "name": "Ferrugem"})).unwrap();
    assert_eq!(item.id, "7");
    assert_eq!(item.label(), "Ferrugem");
    assert_eq!(item.category(), Category::Pest);
    assert_eq!(item.first_image(), None);
    assert_eq!(item.image_file_name(), "7.jpg");

    let record = item.to_record(String::new());
    assert_eq!(record.confidence, 0.0);
    assert_eq!(record.remote_id.as_deref(), Some("7"));
  }

  #[test]
  fn english_name_wins_unless_blank() {
    let item = ManifestItem::from_value(json!({
      "id": "d1", "name": "Requeima", "name_en": "Late Blight", "type": "DOENCA",
      "images": ["/images/d1_0.PNG"], "confidence": 91.0
    }))
    .unwrap();
    assert_eq!(item.label(), "Late Blight");
    assert_eq!(item.category(), Category::Disease);
    assert_eq!(item.image_file_name(), "d1.png");
    assert_eq!(item.to_record(String::new()).confidence, 0.91);

    let blank = ManifestItem::from_value(json!({"id": "x", "name": "Sarna", "name_en": " "})).unwrap();
    assert_eq!(blank.label(), "Sarna");
  }

  #[test]
  fn missing_id_is_an_error() {
    assert!(ManifestItem::from_value(json!({"name": "Aphid"})).is_err());
    assert!(ManifestItem::from_value(json!({"id": null, "name": "Aphid"})).is_err());
  }

  #[test]
  fn file_name_is_sanitized() {
    let item = ManifestItem::from_value(json!({
      "id": "../p 1", "name": "Aphid", "images": ["/images/weird"]
    }))
    .unwrap();
    assert_eq!(item.image_file_name(), "%2E%2E%2Fp%201.jpg");
    assert!(!item.image_file_name().contains('/'));
  }

  #[test]
  fn distinct_ids_get_distinct_file_names() {
    let names: Vec<String> = ["p/1", "p_1", "p.1", "p 1", "p%2F1", "", "%"]
      .iter()
      .map(|id| {
        ManifestItem::from_value(json!({"id": id, "name": "x", "images": ["/images/a.png"]}))
          .unwrap()
          .image_file_name()
      })
      .collect();
    let unique: std::collections::HashSet<&String> = names.iter().collect();
    assert_eq!(unique.len(), names.len(), "{names:?}");
    assert_eq!(names[1], "p_1.png");
    assert!(names.iter().all(|name| !name.starts_with('.')));
  }
}
