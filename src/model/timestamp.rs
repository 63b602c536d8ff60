// 该文件是 Tianjian （田间） 项目的一部分。
// src/model/timestamp.rs - 上游时间戳解析
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

use chrono::{Local, NaiveDateTime, TimeZone};
use tracing::warn;

const UPSTREAM_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 解析 `2025-11-27T01:42:04.589788` 形式的时间戳（本地时区）。
///
/// 只读取到秒为止，其后的小数秒或时区后缀一律忽略。
pub fn parse_upstream_timestamp(raw: &str) -> Option<i64> {
  let (naive, _rest) = NaiveDateTime::parse_and_remainder(raw.trim(), UPSTREAM_FORMAT).ok()?;
  Local
    .from_local_datetime(&naive)
    .earliest()
    .map(|dt| dt.timestamp_millis())
}

/// 解析失败或为空时退回到当前时间
pub fn parse_detected_at(raw: &str) -> i64 {
  match parse_upstream_timestamp(raw) {
    Some(ms) => ms,
    None => {
      if !raw.is_empty() {
        warn!("无法解析时间戳 '{}'，使用当前时间", raw);
      }
      crate::now_millis()
    }
  }
}
