// 该文件是 Tianjian （田间） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{path::Path, sync::Arc};

use anyhow::{Result, anyhow};
use chrono::{Local, TimeZone};
use clap::Parser;
use tracing::{info, warn};

use args::{Args, Command, ControlAction};
use tianjian::{
  FromUrl,
  catalog::ReferenceMatcher,
  cloud::CloudWrapper,
  config::SyncConfig,
  model::{Category, DetectionRecord, RecordKind},
  network::{NetworkMonitor, NmcliProbe},
  now_millis,
  remote::{ControlClient, FieldUnitClient},
  status::TransferStatus,
  store::{DetectionStore, ImageDir, SqliteStore, run_blocking},
  sync::CloudSync,
  transfer::TransferOrchestrator,
};

fn load_matcher(config: &SyncConfig) -> Result<ReferenceMatcher> {
  let matcher = match &config.catalog_dir {
    Some(dir) => ReferenceMatcher::from_dir(dir)?,
    None => ReferenceMatcher::bundled()?,
  };
  Ok(matcher)
}

fn field_unit(config: &SyncConfig) -> Result<Arc<FieldUnitClient>> {
  Ok(Arc::new(FieldUnitClient::new(
    config.field_unit.clone(),
    config.http_timeout,
  )?))
}

fn format_time(millis: i64) -> String {
  Local
    .timestamp_millis_opt(millis)
    .single()
    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
    .unwrap_or_else(|| millis.to_string())
}

async fn pull(config: &SyncConfig, no_bind: bool) -> Result<()> {
  let client = field_unit(config)?;
  // 监测器只用于本次绑定，离开作用域时一并释放
  let _monitor = if no_bind {
    None
  } else {
    let monitor = Arc::new(NetworkMonitor::new(
      config.target_ssid.clone(),
      NmcliProbe::default(),
      Arc::clone(&client),
    ));
    // nmcli 是阻塞的子进程调用
    let probing = Arc::clone(&monitor);
    if !tokio::task::spawn_blocking(move || probing.refresh()).await? {
      warn!("未加入热点 '{}'，按默认路由访问野外单元", config.target_ssid);
    }
    Some(monitor)
  };

  let store = Arc::new(SqliteStore::from_url(&config.store_url)?);
  let orchestrator = Arc::new(TransferOrchestrator::new(
    client,
    store,
    ImageDir::new(&config.image_dir),
  ));

  let mut progress = orchestrator.subscribe();
  let reporter = tokio::spawn(async move {
    while progress.changed().await.is_ok() {
      let status = progress.borrow_and_update().clone();
      info!("{}", status);
      if status.is_terminal() {
        break;
      }
    }
  });

  let last = orchestrator.spawn_transfer().await?;
  reporter.abort();
  match last {
    TransferStatus::Success { item_count } => {
      println!("拉取完成，共 {} 条记录", item_count);
      Ok(())
    }
    TransferStatus::Error { message } => Err(anyhow!(message)),
    other => Err(anyhow!("拉取未完成: {}", other)),
  }
}

async fn push(config: &SyncConfig) -> Result<()> {
  let store = Arc::new(SqliteStore::from_url(&config.store_url)?);
  let sink = Arc::new(CloudWrapper::from_url(&config.cloud_url)?);
  let matcher = Arc::new(load_matcher(config)?);
  let sync = CloudSync::new(store, sink, matcher).with_top_n(config.top_n);

  let report = sync.push().await?;
  for (kind, pushed) in &report.pushed {
    println!("{:<10} 推送 {} 条", kind, pushed);
  }
  println!("检测最多的条目:");
  for (rank, entry) in report.most_detected.iter().enumerate() {
    println!(
      "  {:>2}. {} ({}) - {} 次",
      rank + 1,
      entry.name,
      entry.category,
      entry.count
    );
  }
  println!("推送时间: {}", format_time(report.pushed_at));
  Ok(())
}

async fn control(config: &SyncConfig, action: ControlAction) -> Result<()> {
  let control = ControlClient::new(field_unit(config)?);
  let body = match action {
    ControlAction::Start => control.send_control(true).await?,
    ControlAction::Stop => control.send_control(false).await?,
    ControlAction::Toggle => {
      control.poll_status().await;
      control.toggle().await?
    }
  };
  println!("{}", body.trim());
  println!("脚本状态: {}", if control.is_running() { "运行中" } else { "已停止" });
  Ok(())
}

async fn status(config: &SyncConfig) -> Result<()> {
  let control = ControlClient::new(field_unit(config)?);
  let running = control.poll_status().await;
  println!("脚本状态: {}", if running { "运行中" } else { "已停止或不可达" });
  Ok(())
}

fn resolve(config: &SyncConfig, label: &str) -> Result<()> {
  let matcher = load_matcher(config)?;
  match matcher.resolve(label) {
    Some(entry) => {
      println!("{} [{}]", entry.display_name, entry.category);
      if let Some(scientific) = &entry.scientific_name {
        println!("学名: {}", scientific);
      }
      println!("{}", entry.description);
      if let Some(method) = &entry.control_method {
        println!("防治: {}", method);
      }
    }
    None => println!("暂无 '{}' 的资料", label),
  }
  Ok(())
}

fn list(config: &SyncConfig, kind: RecordKind, limit: usize) -> Result<()> {
  let store = SqliteStore::from_url(&config.store_url)?;
  let records = store.all(kind)?;
  println!("{} 类记录共 {} 条", kind, records.len());
  for record in records.iter().take(limit) {
    let image = if !record.has_image() {
      "无图像"
    } else if ImageDir::resolve_existing(&record.image_path).is_some() {
      "有图像"
    } else {
      "图像已丢失"
    };
    println!(
      "#{:<5} {} {:<24} {:<8} {:>5.1}% {} {}",
      record.id,
      format_time(record.detected_at),
      record.label,
      record.category,
      record.confidence * 100.0,
      if record.synced_to_cloud { "已同步" } else { "未同步" },
      image
    );
  }
  Ok(())
}

async fn capture(
  config: &SyncConfig,
  label: &str,
  category: Category,
  confidence: f64,
  image: Option<&Path>,
) -> Result<()> {
  let store = Arc::new(SqliteStore::from_url(&config.store_url)?);
  let mut record = DetectionRecord::new(label, category, confidence);
  if let Some(source) = image {
    let bytes = tokio::fs::read(source).await?;
    let extension = source
      .extension()
      .and_then(|ext| ext.to_str())
      .unwrap_or("jpg");
    let file_name = format!("captured_{}.{}", now_millis(), extension);
    let saved = ImageDir::new(&config.image_dir)
      .save(&file_name, &bytes)
      .await?;
    record = record.with_image_path(saved.to_string_lossy());
  }
  let label = record.label.clone();
  let confidence = record.confidence;
  let id = run_blocking(&store, move |store| store.upsert(RecordKind::Captured, &record))
    .await
    .map_err(|e| anyhow!(e))?;
  println!("已记录 #{}: {} ({:.1}%)", id, label, confidence * 100.0);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  tianjian::logging::init(args.verbose);

  let config = SyncConfig::from_args(&args.config)?;
  info!("野外单元: {}", config.field_unit);
  info!("本地存储: {}", config.store_url);

  match args.command {
    Command::Pull { no_bind } => pull(&config, no_bind).await,
    Command::Push => push(&config).await,
    Command::Control { action } => control(&config, action).await,
    Command::Status => status(&config).await,
    Command::Resolve { label } => resolve(&config, &label),
    Command::List { kind, limit } => list(&config, kind, limit),
    Command::Capture {
      label,
      category,
      confidence,
      image,
    } => capture(&config, &label, category, confidence, image.as_deref()).await,
  }
}
