// 该文件是 Tianjian （田间） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use tianjian::{
  config::ConfigArgs,
  model::{Category, RecordKind},
};

/// Tianjian 田间检测数据同步工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub config: ConfigArgs,

  /// 输出调试日志
  #[arg(short, long, global = true)]
  pub verbose: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 从野外单元拉取全部检测及图像
  Pull {
    /// 不尝试绑定到野外单元热点所在的接口
    #[arg(long)]
    no_bind: bool,
  },
  /// 把未同步的记录和统计推送到云端
  Push,
  /// 启动或停止野外单元上的检测脚本
  Control {
    #[arg(value_enum)]
    action: ControlAction,
  },
  /// 查询检测脚本是否在运行
  Status,
  /// 在参考目录中查找标签
  Resolve {
    label: String,
  },
  /// 列出本地记录，最新的在前
  List {
    #[arg(long, default_value = "field_unit", value_name = "KIND")]
    kind: RecordKind,
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
  /// 记录一次本机分类结果
  Capture {
    label: String,
    #[arg(long, default_value = "PEST")]
    category: Category,
    /// 置信度，0-1 或百分比
    #[arg(long)]
    confidence: f64,
    /// 分类所用的图像，会被复制到图像目录
    #[arg(long, value_name = "FILE")]
    image: Option<PathBuf>,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
  Start,
  Stop,
  Toggle,
}
