// 该文件是 Tianjian （田间） 项目的一部分。
// src/model/reference.rs - 参考目录条目
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

use serde::Serialize;

use crate::model::Category;

/// 内置目录中描述一种虫害或病害的条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceEntry {
  pub key: String,
  pub display_name: String,
  pub scientific_name: Option<String>,
  pub description: String,
  pub control_method: Option<String>,
  /// 本地资源标识，按顺序
  pub images: Vec<String>,
  pub category: Category,
}
