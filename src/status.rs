// 该文件是 Tianjian （田间） 项目的一部分。
// src/status.rs - 传输与推送状态
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

use std::fmt;

/// 拉取流程对外可见的状态机
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransferStatus {
  #[default]
  Idle,
  Connecting,
  Transferring {
    progress: u8,
    message: String,
  },
  Success {
    item_count: usize,
  },
  Error {
    message: String,
  },
}

impl TransferStatus {
  /// 正在连接或传输
  pub fn is_in_flight(&self) -> bool {
    matches!(
      self,
      TransferStatus::Connecting | TransferStatus::Transferring { .. }
    )
  }

  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      TransferStatus::Success { .. } | TransferStatus::Error { .. }
    )
  }
}

impl fmt::Display for TransferStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TransferStatus::Idle => write!(f, "空闲"),
      TransferStatus::Connecting => write!(f, "正在连接..."),
      TransferStatus::Transferring { progress, message } => write!(f, "[{:>3}%] {}", progress, message),
      TransferStatus::Success { item_count } => write!(f, "完成，共 {} 条", item_count),
      TransferStatus::Error { message } => write!(f, "错误: {}", message),
    }
  }
}

/// 云端推送状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PushStatus {
  #[default]
  Idle,
  Syncing,
  Success {
    pushed: usize,
  },
  Error {
    message: String,
  },
}

impl fmt::Display for PushStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PushStatus::Idle => write!(f, "空闲"),
      PushStatus::Syncing => write!(f, "正在同步..."),
      PushStatus::Success { pushed } => write!(f, "同步完成，推送 {} 条", pushed),
      PushStatus::Error { message } => write!(f, "同步错误: {}", message),
    }
  }
}
