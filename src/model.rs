// 该文件是 Tianjian （田间） 项目的一部分。
// src/model.rs - 数据模型
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

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
  #[error("未知的类别: {0}")]
  UnknownCategory(String),
  #[error("未知的记录类型: {0}")]
  UnknownRecordKind(String),
}

mod detection;
pub use self::detection::{Category, DetectionRecord, RecordKind, normalize_confidence};

mod reference;
pub use self::reference::ReferenceEntry;

mod timestamp;
pub use self::timestamp::{parse_detected_at, parse_upstream_timestamp};
