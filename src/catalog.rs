// 该文件是 Tianjian （田间） 项目的一部分。
// src/catalog.rs - 虫害与病害参考目录及标签匹配
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

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::model::{Category, ReferenceEntry};

pub const PEST_CATALOG_FILE: &str = "pragas.json";
pub const DISEASE_CATALOG_FILE: &str = "doencas.json";

const BUNDLED_PESTS: &str = include_str!("../assets/pragas.json");
const BUNDLED_DISEASES: &str = include_str!("../assets/doencas.json");

/// 现场设备上报的标识 → 目录键
const ID_TO_KEY: &[(&str, &str)] = &[
  ("aphids", "Aphids"),
  ("spider_mites", "Spider Mites"),
  ("pragas_diversas", "pragas_diversas"),
  ("ferrugem", "Ferrugem"),
  ("antracnose", "Antracnose"),
  ("mildio", "Míldio"),
  ("mancha_foliar", "Mancha-Foliar"),
  ("podridao", "Podridão"),
  ("oidio", "Oídio"),
  ("bacterial_blight", "Crestamento Bacteriano"),
  ("black_measles", "Esca da Videira"),
  ("brusone", "Brusone"),
  ("cercospora_leaf_blight", "Mancha-de-Cercospora"),
  ("curl_virus", "Vírus do Enrolamento da Folha"),
  ("early_blight", "Pinta-Preta"),
  ("greening", "Huanglongbing"),
  ("late_blight", "Requeima"),
  ("late_leaf_spot", "Mancha-Tardia"),
  ("leaf_mold", "Mofo-Foliar"),
  ("mosaic_virus", "Vírus do Mosaico"),
  ("northern_leaf_blight", "Mancha-Foliar-do-Milho"),
  ("red_rot", "Podridão-Vermelha"),
  ("sarna", "Sarna"),
  ("septoria_leaf_spot", "Mancha-de-Septória"),
  ("target_spot", "Mancha-Alvo"),
];

/// 分类模型输出的英文名称 → 目录键
const ENGLISH_ALIASES: &[(&str, &str)] = &[
  ("Slug Sawfly", "pragas_diversas"),
  ("Rust", "Ferrugem"),
  ("Bacterial Spot", "Antracnose"),
  ("Powdery Mildew", "Oídio"),
  ("Leaf Scorch", "Mancha-Foliar"),
  ("Black Rot", "Podridão"),
  ("Mosaic Disease", "Míldio"),
  ("Black Measles", "Esca da Videira"),
  ("Blast", "Brusone"),
  ("Yellow Leaf Curl", "Vírus do Enrolamento da Folha"),
  ("Scab", "Sarna"),
];

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录 JSON 解析失败: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("目录条目 '{key}' 无效: {source}")]
  InvalidEntry {
    key: String,
    source: serde_json::Error,
  },
}

#[derive(Deserialize)]
struct CatalogItem {
  nome: String,
  descricao: String,
  #[serde(default)]
  metodo_controle: Option<String>,
  #[serde(default)]
  imagem: Option<String>,
  #[serde(default)]
  nome_cientifico: Option<String>,
}

/// 小写，`_` 与 `-` 视为空格，连续空白合并
pub fn normalize_label(label: &str) -> String {
  label
    .to_lowercase()
    .replace(['_', '-'], " ")
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

fn mapped_key(label: &str) -> Option<&'static str> {
  let normalized = normalize_label(label);
  ID_TO_KEY
    .iter()
    .chain(ENGLISH_ALIASES)
    .find(|(from, _)| normalize_label(from) == normalized)
    .map(|(_, key)| *key)
}

fn fuzzy_matches(key: &str, normalized_label: &str) -> bool {
  let key = normalize_label(key);
  key == normalized_label || key.contains(normalized_label) || normalized_label.contains(&key)
}

fn load_catalog(json: &str, category: Category) -> Result<Vec<ReferenceEntry>, CatalogError> {
  let raw: Map<String, Value> = serde_json::from_str(json)?;
  raw
    .into_iter()
    .map(|(key, value)| {
      let item: CatalogItem = serde_json::from_value(value).map_err(|source| {
        CatalogError::InvalidEntry {
          key: key.clone(),
          source,
        }
      })?;
      Ok(ReferenceEntry {
        key,
        display_name: item.nome,
        scientific_name: item.nome_cientifico.filter(|name| !name.is_empty()),
        description: item.descricao,
        control_method: item.metodo_controle.filter(|method| !method.is_empty()),
        images: item.imagem.into_iter().filter(|image| !image.is_empty()).collect(),
        category,
      })
    })
    .collect()
}

/// 加载一次、之后只读的参考目录。
///
/// 条目保持 JSON 中声明的顺序，虫害目录在前，因此模糊匹配的"首个命中"是确定的。
#[derive(Debug, Clone)]
pub struct ReferenceMatcher {
  pests: Vec<ReferenceEntry>,
  diseases: Vec<ReferenceEntry>,
}

impl ReferenceMatcher {
  pub fn bundled() -> Result<Self, CatalogError> {
    Self::from_json(BUNDLED_PESTS, BUNDLED_DISEASES)
  }

  pub fn from_json(pests: &str, diseases: &str) -> Result<Self, CatalogError> {
    Ok(ReferenceMatcher {
      pests: load_catalog(pests, Category::Pest)?,
      diseases: load_catalog(diseases, Category::Disease)?,
    })
  }

  /// 从包含 `pragas.json` 与 `doencas.json` 的目录加载
  pub fn from_dir(dir: &Path) -> Result<Self, CatalogError> {
    let pests = std::fs::read_to_string(dir.join(PEST_CATALOG_FILE))?;
    let diseases = std::fs::read_to_string(dir.join(DISEASE_CATALOG_FILE))?;
    Self::from_json(&pests, &diseases)
  }

  pub fn entries(&self) -> impl Iterator<Item = &ReferenceEntry> {
    self.pests.iter().chain(self.diseases.iter())
  }

  pub fn len(&self) -> usize {
    self.pests.len() + self.diseases.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn exact(&self, key: &str) -> Option<&ReferenceEntry> {
    self.entries().find(|entry| entry.key == key)
  }

  fn lookup(&self, label: &str) -> Option<&ReferenceEntry> {
    if let Some(key) = mapped_key(label) {
      if let Some(entry) = self.exact(key) {
        return Some(entry);
      }
    }
    self.exact(label)
  }

  fn find(&self, label: &str) -> Option<&ReferenceEntry> {
    if let Some(entry) = self.lookup(label) {
      return Some(entry);
    }
    let normalized = normalize_label(label);
    if normalized.is_empty() {
      return None;
    }
    let key = self
      .entries()
      .map(|entry| entry.key.as_str())
      .find(|key| fuzzy_matches(key, &normalized))?;
    debug!("标签 '{}' 模糊匹配到目录键 '{}'", label, key);
    self.lookup(key)
  }

  /// 为检测标签查找目录条目；没有匹配时返回 `None`，调用方应显示"暂无资料"
  pub fn resolve(&self, label: &str) -> Option<ReferenceEntry> {
    self.find(label).cloned()
  }

  /// 标签对应的目录键，用于按目录条目聚合检测次数
  pub fn catalog_key_for(&self, label: &str) -> Option<&str> {
    self.find(label).map(|entry| entry.key.as_str())
  }
}
