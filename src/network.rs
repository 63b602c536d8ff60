// 该文件是 Tianjian （田间） 项目的一部分。
// src/network.rs - 网络状态监测
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

use std::net::IpAddr;

use thiserror::Error;

pub const DEFAULT_TARGET_SSID: &str = "FIELD_UNIT_DATA";

#[derive(Error, Debug)]
pub enum NetworkError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("命令 `{0}` 执行失败: {1}")]
  CommandFailed(String, String),
}

/// 一个可用的网络接口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
  pub interface: String,
  /// 无线网络的 SSID，有线或未知时为 `None`
  pub ssid: Option<String>,
  pub address: Option<IpAddr>,
}

impl NetworkInfo {
  /// SSID 两侧可能带引号
  pub fn ssid_matches(&self, target: &str) -> bool {
    self
      .ssid
      .as_deref()
      .map(|ssid| ssid.trim_matches('"') == target)
      .unwrap_or(false)
  }
}

/// 列出当前可用的网络
pub trait NetworkProbe: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
  fn networks(&self) -> Result<Vec<NetworkInfo>, Self::Error>;
}

/// 将后续出站连接绑定到指定网络接口，绕过默认路由
pub trait NetworkBinder: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
  /// `None` 恢复默认路由；重复绑定同一接口不产生效果
  fn bind_network(&self, network: Option<&NetworkInfo>) -> Result<(), Self::Error>;
}

mod monitor;
pub use self::monitor::NetworkMonitor;

mod nmcli;
pub use self::nmcli::NmcliProbe;
