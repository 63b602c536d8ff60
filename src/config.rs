// 该文件是 Tianjian （田间） 项目的一部分。
// src/config.rs - 运行配置
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

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use thiserror::Error;
use url::Url;

use crate::{network::DEFAULT_TARGET_SSID, remote::DEFAULT_FIELD_UNIT_URL, sync::DEFAULT_TOP_N};

pub const APP_DIR: &str = "tianjian";
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_POLL_SECS: u64 = 3;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法确定数据目录，请通过 --data-dir 或 TIANJIAN_DATA_DIR 指定")]
  NoDataDir,
  #[error("无效的路径: {0}")]
  InvalidPath(PathBuf),
  #[error("{0} 必须大于 0")]
  InvalidValue(&'static str),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URL 错误: {0}")]
  UrlError(#[from] url::ParseError),
}

/// 两个可执行文件共用的参数，均可由 `TIANJIAN_*` 环境变量提供
#[derive(clap::Args, Debug, Clone)]
pub struct ConfigArgs {
  /// 野外单元热点的 SSID
  #[arg(long, env = "TIANJIAN_SSID", default_value = DEFAULT_TARGET_SSID)]
  pub ssid: String,

  /// 野外单元 HTTP 服务地址
  #[arg(long, env = "TIANJIAN_FIELD_UNIT", default_value = DEFAULT_FIELD_UNIT_URL)]
  pub field_unit: Url,

  /// 单次 HTTP 请求超时（秒）
  #[arg(long, env = "TIANJIAN_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
  pub timeout_secs: u64,

  /// 网络状态轮询间隔（秒）
  #[arg(long, env = "TIANJIAN_POLL_SECS", default_value_t = DEFAULT_POLL_SECS)]
  pub poll_secs: u64,

  /// 数据目录，默认为系统数据目录下的 tianjian/
  #[arg(long, env = "TIANJIAN_DATA_DIR", value_name = "DIR")]
  pub data_dir: Option<PathBuf>,

  /// 下载图像的保存目录，默认为 <数据目录>/images
  #[arg(long, env = "TIANJIAN_IMAGE_DIR", value_name = "DIR")]
  pub image_dir: Option<PathBuf>,

  /// 本地存储，例如 sqlite:///path/tianjian.db 或 sqlite::memory:
  #[arg(long, env = "TIANJIAN_STORE", value_name = "URL")]
  pub store: Option<Url>,

  /// 云端文档存储，file:///dir 或 https://host/prefix
  #[arg(long, env = "TIANJIAN_CLOUD", value_name = "URL")]
  pub cloud: Option<Url>,

  /// 统计中保留的条目数
  #[arg(long, env = "TIANJIAN_TOP_N", default_value_t = DEFAULT_TOP_N)]
  pub top_n: usize,

  /// 外部参考目录（含 pragas.json 与 doencas.json），默认使用内置目录
  #[arg(long, env = "TIANJIAN_CATALOG_DIR", value_name = "DIR")]
  pub catalog_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
  pub target_ssid: String,
  pub field_unit: Url,
  pub http_timeout: Duration,
  pub poll_interval: Duration,
  pub image_dir: PathBuf,
  pub store_url: Url,
  pub cloud_url: Url,
  pub top_n: usize,
  pub catalog_dir: Option<PathBuf>,
}

fn default_data_dir() -> Result<PathBuf, ConfigError> {
  dirs::data_dir()
    .map(|dir| dir.join(APP_DIR))
    .ok_or(ConfigError::NoDataDir)
}

/// `sqlite:///<absolute path>`
pub fn sqlite_url(path: &Path) -> Result<Url, ConfigError> {
  let path = std::path::absolute(path)?;
  let mut url = Url::parse("sqlite://")?;
  url.set_path(&path.to_string_lossy());
  Ok(url)
}

pub fn directory_url(path: &Path) -> Result<Url, ConfigError> {
  let path = std::path::absolute(path)?;
  Url::from_directory_path(&path).map_err(|_| ConfigError::InvalidPath(path))
}

impl SyncConfig {
  /// 以给定数据目录生成全部默认值
  pub fn with_data_dir(data_dir: &Path) -> Result<Self, ConfigError> {
    Ok(SyncConfig {
      target_ssid: DEFAULT_TARGET_SSID.to_string(),
      field_unit: Url::parse(DEFAULT_FIELD_UNIT_URL)?,
      http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
      poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
      image_dir: data_dir.join("images"),
      store_url: sqlite_url(&data_dir.join("tianjian.db"))?,
      cloud_url: directory_url(&data_dir.join("cloud"))?,
      top_n: DEFAULT_TOP_N,
      catalog_dir: None,
    })
  }

  pub fn from_args(args: &ConfigArgs) -> Result<Self, ConfigError> {
    if args.timeout_secs == 0 {
      return Err(ConfigError::InvalidValue("timeout-secs"));
    }
    if args.poll_secs == 0 {
      return Err(ConfigError::InvalidValue("poll-secs"));
    }
    let data_dir = match &args.data_dir {
      Some(dir) => dir.clone(),
      None => default_data_dir()?,
    };
    let defaults = SyncConfig::with_data_dir(&data_dir)?;
    Ok(SyncConfig {
      target_ssid: args.ssid.clone(),
      field_unit: args.field_unit.clone(),
      http_timeout: Duration::from_secs(args.timeout_secs),
      poll_interval: Duration::from_secs(args.poll_secs),
      image_dir: args.image_dir.clone().unwrap_or(defaults.image_dir),
      store_url: args.store.clone().unwrap_or(defaults.store_url),
      cloud_url: args.cloud.clone().unwrap_or(defaults.cloud_url),
      top_n: args.top_n,
      catalog_dir: args.catalog_dir.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser)]
  struct TestCli {
    #[command(flatten)]
    config: ConfigArgs,
  }

  #[test]
  fn defaults_live_under_the_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let cli = TestCli::parse_from(["test", "--data-dir", dir.path().to_str().unwrap()]);
    let config = SyncConfig::from_args(&cli.config).unwrap();

    assert_eq!(config.target_ssid, "FIELD_UNIT_DATA");
    assert_eq!(config.field_unit.as_str(), "http://192.168.4.1:8080/");
    assert_eq!(config.http_timeout, Duration::from_secs(90));
    assert_eq!(config.top_n, 10);
    assert_eq!(config.image_dir, dir.path().join("images"));
    assert_eq!(config.store_url.scheme(), "sqlite");
    assert!(config.store_url.path().ends_with("tianjian.db"));
    assert_eq!(config.cloud_url.scheme(), "file");
  }

  #[test]
  fn explicit_values_win() {
    let cli = TestCli::parse_from([
      "test",
      "--data-dir",
      "/tmp/tianjian-test",
      "--store",
      "sqlite::memory:",
      "--cloud",
      "https://db.example.com/farm/",
      "--timeout-secs",
      "5",
    ]);
    let config = SyncConfig::from_args(&cli.config).unwrap();
    assert_eq!(config.store_url.as_str(), "sqlite::memory:");
    assert_eq!(config.cloud_url.host_str(), Some("db.example.com"));
    assert_eq!(config.http_timeout, Duration::from_secs(5));
  }

  #[test]
  fn zero_intervals_are_rejected() {
    let cli = TestCli::parse_from(["test", "--data-dir", "/tmp/x", "--poll-secs", "0"]);
    assert!(matches!(
      SyncConfig::from_args(&cli.config),
      Err(ConfigError::InvalidValue("poll-secs"))
    ));
  }
}
