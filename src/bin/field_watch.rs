// 该文件是 Tianjian （田间） 项目的一部分。
// src/bin/field_watch.rs - 常驻监测：加入野外单元热点后自动拉取
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

use std::{sync::Arc, thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use tianjian::{
  FromUrl,
  catalog::ReferenceMatcher,
  cloud::CloudWrapper,
  config::{ConfigArgs, SyncConfig},
  network::{NetworkMonitor, NmcliProbe},
  remote::{ControlClient, FieldUnitClient},
  status::TransferStatus,
  store::{ImageDir, SqliteStore},
  sync::CloudSync,
  transfer::TransferOrchestrator,
};

/// 监测野外单元热点，加入后自动拉取检测数据
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub config: ConfigArgs,

  /// 拉取成功后，离开热点恢复外网时推送到云端
  #[arg(long)]
  pub push: bool,

  #[arg(short, long)]
  pub verbose: bool,
}

/// 热点没有外网，拉取成功后的推送要等离开热点才执行
#[derive(Debug)]
struct PushSchedule {
  enabled: bool,
  pending: bool,
}

impl PushSchedule {
  fn new(enabled: bool) -> Self {
    PushSchedule {
      enabled,
      pending: false,
    }
  }

  fn pulled(&mut self, last: &TransferStatus) {
    if matches!(last, TransferStatus::Success { .. }) {
      self.pending = self.enabled;
    }
  }

  /// 加入状态变化后是否应当推送
  fn due(&self, joined: bool) -> bool {
    self.pending && !joined
  }

  fn pushed(&mut self) {
    self.pending = false;
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  tianjian::logging::init(args.verbose);
  let config = SyncConfig::from_args(&args.config)?;

  let (shutdown_tx, mut shutdown) = watch::channel(false);
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    shutdown_tx.send_replace(true);
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let client = Arc::new(FieldUnitClient::new(
    config.field_unit.clone(),
    config.http_timeout,
  )?);
  let control = Arc::new(ControlClient::new(Arc::clone(&client)));
  let store = Arc::new(SqliteStore::from_url(&config.store_url)?);
  let orchestrator = Arc::new(TransferOrchestrator::new(
    Arc::clone(&client),
    Arc::clone(&store),
    ImageDir::new(&config.image_dir),
  ));
  let cloud = if args.push {
    let matcher = match &config.catalog_dir {
      Some(dir) => ReferenceMatcher::from_dir(dir)?,
      None => ReferenceMatcher::bundled()?,
    };
    Some(
      CloudSync::new(
        Arc::clone(&store),
        Arc::new(CloudWrapper::from_url(&config.cloud_url)?),
        Arc::new(matcher),
      )
      .with_top_n(config.top_n),
    )
  } else {
    None
  };

  let monitor = NetworkMonitor::new(
    config.target_ssid.clone(),
    NmcliProbe::default(),
    Arc::clone(&client),
  )
  .with_status_poll(Arc::clone(&control));
  let mut joined = monitor.subscribe();
  monitor.start(config.poll_interval);

  let mut running = control.subscribe_running();
  let mut schedule = PushSchedule::new(cloud.is_some());
  loop {
    tokio::select! {
      changed = joined.changed() => {
        if changed.is_err() {
          break;
        }
        let is_joined = *joined.borrow_and_update();
        if !is_joined {
          info!("已离开热点 '{}'", monitor.target_ssid());
          if let Some(cloud) = cloud.as_ref().filter(|_| schedule.due(is_joined)) {
            match cloud.push().await {
              Ok(report) => {
                schedule.pushed();
                info!("已推送 {} 条记录到云端", report.total_pushed());
              }
              Err(e) => error!("推送失败，下次离开热点时重试: {}", e),
            }
          }
          continue;
        }
        info!("已加入热点 '{}'，开始拉取", monitor.target_ssid());
        let last = orchestrator.spawn_transfer().await?;
        schedule.pulled(&last);
        if let TransferStatus::Error { message } = &last {
          warn!("拉取失败: {}", message);
        }
        orchestrator.reset_status();
      }
      changed = running.changed() => {
        if changed.is_ok() {
          info!("检测脚本{}", if *running.borrow_and_update() { "运行中" } else { "已停止" });
        }
      }
      _ = shutdown.changed() => break,
    }
  }

  monitor.stop();
  info!("监测结束");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn push_waits_until_the_hotspot_is_left() {
    let mut schedule = PushSchedule::new(true);
    assert!(!schedule.due(false));

    schedule.pulled(&TransferStatus::Success { item_count: 3 });
    assert!(!schedule.due(true));
    assert!(schedule.due(false));

    schedule.pushed();
    assert!(!schedule.due(false));
  }

  #[test]
  fn failed_pulls_and_disabled_push_schedule_nothing() {
    let mut schedule = PushSchedule::new(true);
    schedule.pulled(&TransferStatus::Error {
      message: "Server returned code: 500".into(),
    });
    assert!(!schedule.due(false));

    let mut disabled = PushSchedule::new(false);
    disabled.pulled(&TransferStatus::Success { item_count: 1 });
    assert!(!disabled.due(false));
  }
}
