// 该文件是 Tianjian （田间） 项目的一部分。
// src/logging.rs - 日志初始化
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

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub fn default_directive(verbose: bool) -> &'static str {
  if verbose { "tianjian=debug" } else { "tianjian=info" }
}

/// 安装全局日志订阅者，`RUST_LOG` 优先；重复调用时保留第一次的设置
pub fn init(verbose: bool) {
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
  let _ = tracing_subscriber::registry()
    .with(fmt::layer().with_target(false))
    .with(filter)
    .try_init();
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn init_twice_is_harmless() {
    init(false);
    init(true);
    assert_eq!(default_directive(true), "tianjian=debug");
  }
}
