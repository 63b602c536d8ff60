// 该文件是 Tianjian （田间） 项目的一部分。
// src/network/nmcli.rs - 基于 NetworkManager 命令行的网络探测
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

use std::{net::IpAddr, process::Command};

use tracing::debug;

use crate::network::{NetworkError, NetworkInfo, NetworkProbe};

/// 通过 `nmcli` 列出当前已连接的无线网络
#[derive(Debug, Clone)]
pub struct NmcliProbe {
  program: String,
}

impl Default for NmcliProbe {
  fn default() -> Self {
    NmcliProbe {
      program: "nmcli".to_string(),
    }
  }
}

impl NmcliProbe {
  pub fn with_program(program: impl Into<String>) -> Self {
    NmcliProbe {
      program: program.into(),
    }
  }

  fn run(&self, args: &[&str]) -> Result<String, NetworkError> {
    let output = Command::new(&self.program).args(args).output()?;
    if !output.status.success() {
      return Err(NetworkError::CommandFailed(
        format!("{} {}", self.program, args.join(" ")),
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
      ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

impl NetworkProbe for NmcliProbe {
  type Error = NetworkError;

  fn networks(&self) -> Result<Vec<NetworkInfo>, Self::Error> {
    let listing = self.run(&[
      "-t", "-f", "ACTIVE,SSID,DEVICE", "device", "wifi", "list", "--rescan", "no",
    ])?;
    let mut networks = Vec::new();
    for (ssid, interface) in parse_active_wifi(&listing) {
      let address = self
        .run(&["-g", "IP4.ADDRESS", "device", "show", &interface])
        .map(|out| parse_first_address(&out))
        .unwrap_or(None);
      debug!("无线接口 {} 已连接 '{}'，地址 {:?}", interface, ssid, address);
      networks.push(NetworkInfo {
        interface,
        ssid: Some(ssid),
        address,
      });
    }
    Ok(networks)
  }
}

/// 按未转义的 `:` 切分 nmcli 简洁输出的一行
fn split_terse(line: &str) -> Vec<String> {
  let mut fields = Vec::new();
  let mut current = String::new();
  let mut chars = line.chars();
  while let Some(c) = chars.next() {
    match c {
      '\\' => {
        if let Some(escaped) = chars.next() {
          current.push(escaped);
        }
      }
      ':' => fields.push(std::mem::take(&mut current)),
      _ => current.push(c),
    }
  }
  fields.push(current);
  fields
}

/// 返回 (SSID, 接口) 列表，只包含 ACTIVE 为 yes 的行
fn parse_active_wifi(listing: &str) -> Vec<(String, String)> {
  listing
    .lines()
    .filter_map(|line| {
      let fields = split_terse(line.trim_end());
      match fields.as_slice() {
        [active, ssid, device] if active == "yes" && !ssid.is_empty() && !device.is_empty() => {
          Some((ssid.clone(), device.clone()))
        }
        _ => None,
      }
    })
    .collect()
}

/// `192.168.4.2/24 | 10.0.0.3/8` 取第一个地址
fn parse_first_address(output: &str) -> Option<IpAddr> {
  output
    .split(['|', '\n'])
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .find_map(|entry| entry.split('/').next()?.parse().ok())
}
