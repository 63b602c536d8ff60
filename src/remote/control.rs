// 该文件是 Tianjian （田间） 项目的一部分。
// src/remote/control.rs - 野外单元脚本控制
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

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::remote::{FieldUnitClient, RemoteError};

/// 控制野外单元上的检测脚本，并记住最近一次已知的运行状态
pub struct ControlClient {
  client: Arc<FieldUnitClient>,
  running: watch::Sender<bool>,
}

impl ControlClient {
  pub fn new(client: Arc<FieldUnitClient>) -> Self {
    let (running, _) = watch::channel(false);
    ControlClient { client, running }
  }

  pub fn is_running(&self) -> bool {
    *self.running.borrow()
  }

  pub fn subscribe_running(&self) -> watch::Receiver<bool> {
    self.running.subscribe()
  }

  /// 发送启动/停止信号，不做重试
  pub async fn send_control(&self, run: bool) -> Result<String, RemoteError> {
    let body = self.client.post_control(run).await?;
    info!("控制信号 {} 已送达: {}", run, body.trim());
    self.running.send_replace(run);
    Ok(body)
  }

  /// 查询脚本状态，任何失败都视为未运行
  pub async fn poll_status(&self) -> bool {
    match self.client.get_running().await {
      Ok(running) => {
        self.running.send_replace(running);
        running
      }
      Err(e) => {
        warn!("无法查询脚本状态: {}", e);
        false
      }
    }
  }

  pub async fn toggle(&self) -> Result<String, RemoteError> {
    let run = !self.is_running();
    self.send_control(run).await
  }
}
