// 该文件是 Tianjian （田间） 项目的一部分。
// src/network/monitor.rs - 野外单元热点加入检测与流量绑定
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
  sync::{Arc, Mutex, OnceLock},
  time::Duration,
};

use tokio::{
  sync::watch,
  task::JoinHandle,
  time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
  network::{NetworkBinder, NetworkInfo, NetworkProbe},
  remote::ControlClient,
};

struct Shared<P, B> {
  target_ssid: String,
  probe: P,
  binder: Arc<B>,
  joined: watch::Sender<bool>,
  /// 当前绑定的接口
  bound: Mutex<Option<NetworkInfo>>,
  status_poll: OnceLock<Arc<ControlClient>>,
}

/// 监测设备是否加入了目标热点，加入后把本进程的出站流量绑定到该接口
pub struct NetworkMonitor<P, B> {
  shared: Arc<Shared<P, B>>,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl<P, B> NetworkMonitor<P, B>
where
  P: NetworkProbe + 'static,
  B: NetworkBinder + 'static,
{
  pub fn new(target_ssid: impl Into<String>, probe: P, binder: Arc<B>) -> Self {
    let (joined, _) = watch::channel(false);
    NetworkMonitor {
      shared: Arc::new(Shared {
        target_ssid: target_ssid.into(),
        probe,
        binder,
        joined,
        bound: Mutex::new(None),
        status_poll: OnceLock::new(),
      }),
      task: Mutex::new(None),
    }
  }

  /// 加入热点时顺带查询一次脚本状态
  pub fn with_status_poll(self, control: Arc<ControlClient>) -> Self {
    let _ = self.shared.status_poll.set(control);
    self
  }

  pub fn target_ssid(&self) -> &str {
    &self.shared.target_ssid
  }

  pub fn is_joined(&self) -> bool {
    *self.shared.joined.borrow()
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.shared.joined.subscribe()
  }

  /// 立即重新计算加入状态并按需重新绑定
  pub fn refresh(&self) -> bool {
    self.shared.refresh()
  }

  /// 按固定间隔轮询网络状态；重复调用会替换之前的轮询任务
  pub fn start(&self, interval: Duration) {
    let shared = Arc::clone(&self.shared);
    let handle = tokio::spawn(async move {
      let mut ticker = time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let shared = Arc::clone(&shared);
        if let Err(e) = tokio::task::spawn_blocking(move || shared.refresh()).await {
          warn!("网络状态检测任务异常: {}", e);
        }
      }
    });
    if let Some(previous) = self.lock_task().replace(handle) {
      previous.abort();
    }
    info!("开始监测热点 '{}'", self.shared.target_ssid);
  }

  pub fn stop(&self) {
    if let Some(handle) = self.lock_task().take() {
      handle.abort();
      debug!("网络监测已停止");
    }
  }

  fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    match self.task.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

impl<P, B> Drop for NetworkMonitor<P, B> {
  fn drop(&mut self) {
    let task = match self.task.get_mut() {
      Ok(task) => task.take(),
      Err(poisoned) => poisoned.into_inner().take(),
    };
    if let Some(handle) = task {
      handle.abort();
    }
  }
}

impl<P, B> Shared<P, B>
where
  P: NetworkProbe,
  B: NetworkBinder,
{
  fn refresh(&self) -> bool {
    let target = match self.probe.networks() {
      Ok(networks) => networks
        .into_iter()
        .find(|network| network.ssid_matches(&self.target_ssid)),
      Err(e) => {
        warn!("无法获取网络列表: {}", e);
        None
      }
    };

    let joined = target.is_some();
    self.rebind(target);

    let changed = self.joined.send_if_modified(|current| {
      if *current == joined {
        false
      } else {
        *current = joined;
        true
      }
    });
    if changed {
      info!("热点 '{}' 连接状态: {}", self.target_ssid, joined);
      if joined {
        self.poll_script_status();
      }
    }
    joined
  }

  fn rebind(&self, target: Option<NetworkInfo>) {
    let mut bound = match self.bound.lock() {
      Ok(bound) => bound,
      Err(poisoned) => poisoned.into_inner(),
    };
    // 没有地址的接口无法承载流量，与未加入同样处理
    let target = match target {
      Some(network) if network.address.is_none() => {
        warn!("接口 {} 尚未分配地址，暂不绑定", network.interface);
        None
      }
      target => target,
    };
    if *bound == target {
      return;
    }

    match self.binder.bind_network(target.as_ref()) {
      Ok(()) => *bound = target,
      Err(e) => warn!("绑定网络失败: {}", e),
    }
  }

  fn poll_script_status(&self) {
    let Some(control) = self.status_poll.get() else {
      return;
    };
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      return;
    };
    let control = Arc::clone(control);
    runtime.spawn(async move {
      let running = control.poll_status().await;
      debug!("野外单元脚本运行状态: {}", running);
    });
  }
}
