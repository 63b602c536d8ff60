// 该文件是 Tianjian （田间） 项目的一部分。
// src/remote/client.rs - 野外单元 HTTP 客户端
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

use std::{sync::RwLock, time::Duration};

use reqwest::{Client, ClientBuilder, header};
use serde::Deserialize;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  network::{NetworkBinder, NetworkInfo},
  remote::{
    CONTROL_ENDPOINT, FieldUnitSource, IMAGES_PREFIX, MANIFEST_ENDPOINT, RemoteError,
    STATUS_ENDPOINT,
  },
};

pub const DEFAULT_FIELD_UNIT_URL: &str = "http://192.168.4.1:8080";
/// 野外单元由电池供电，响应可能很慢
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Deserialize)]
struct StatusResponse {
  is_running: bool,
}

/// 这些平台上可以用 SO_BINDTODEVICE 绑定接口，其余平台只能固定源地址
const BIND_TO_DEVICE: bool = cfg!(any(
  target_os = "android",
  target_os = "fuchsia",
  target_os = "linux"
));

struct Transport {
  http: Client,
  bound: Option<NetworkInfo>,
}

/// 决定是否需要重建客户端：按接口名，无法绑定接口时按地址
fn same_binding(current: Option<&NetworkInfo>, next: Option<&NetworkInfo>) -> bool {
  match (current, next) {
    (None, None) => true,
    (Some(current), Some(next)) if BIND_TO_DEVICE => current.interface == next.interface,
    (Some(current), Some(next)) => current.address == next.address,
    _ => false,
  }
}

pub struct FieldUnitClient {
  base: Url,
  timeout: Duration,
  transport: RwLock<Transport>,
}

impl FromUrlWithScheme for FieldUnitClient {
  const SCHEME: &'static str = "http";
}

impl FromUrl for FieldUnitClient {
  type Error = RemoteError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME && url.scheme() != "https" {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(RemoteError::SchemeMismatch);
    }
    Self::new(url.clone(), DEFAULT_HTTP_TIMEOUT)
  }
}

fn build_http(timeout: Duration, network: Option<&NetworkInfo>) -> Result<Client, reqwest::Error> {
  let builder = Client::builder()
    .no_proxy()
    .timeout(timeout)
    .connect_timeout(timeout);
  let builder = match network {
    Some(network) => bind_builder(builder, network),
    None => builder,
  };
  builder.build()
}

#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
fn bind_builder(builder: ClientBuilder, network: &NetworkInfo) -> ClientBuilder {
  builder.interface(&network.interface)
}

#[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
fn bind_builder(builder: ClientBuilder, network: &NetworkInfo) -> ClientBuilder {
  builder.local_address(network.address)
}

impl FieldUnitClient {
  pub fn new(base: Url, timeout: Duration) -> Result<Self, RemoteError> {
    let http = build_http(timeout, None)?;
    Ok(FieldUnitClient {
      base,
      timeout,
      transport: RwLock::new(Transport { http, bound: None }),
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  /// 当前绑定的网络
  pub fn bound_network(&self) -> Option<NetworkInfo> {
    match self.transport.read() {
      Ok(transport) => transport.bound.clone(),
      Err(poisoned) => poisoned.into_inner().bound.clone(),
    }
  }

  fn http(&self) -> Client {
    match self.transport.read() {
      Ok(transport) => transport.http.clone(),
      Err(poisoned) => poisoned.into_inner().http.clone(),
    }
  }

  pub fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
    Ok(self.base.join(path)?)
  }

  /// 清单中的图像引用可以是绝对 URL、以 `/` 开头的路径或单纯的文件名
  pub fn image_url(&self, reference: &str) -> Result<Url, RemoteError> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
      return Ok(Url::parse(reference)?);
    }
    if reference.starts_with('/') {
      return self.endpoint(reference);
    }
    self.endpoint(&format!("{}{}", IMAGES_PREFIX, urlencoding::encode(reference)))
  }

  pub async fn get_text(&self, path: &str) -> Result<String, RemoteError> {
    let url = self.endpoint(path)?;
    debug!("GET {}", url);
    let response = self
      .http()
      .get(url)
      .header(header::ACCEPT, "application/json")
      .send()
      .await?;
    let status = response.status();
    if !status.is_success() {
      return Err(RemoteError::Status(status.as_u16()));
    }
    Ok(response.text().await?)
  }

  pub async fn get_bytes(&self, url: Url) -> Result<Vec<u8>, RemoteError> {
    debug!("GET {}", url);
    let response = self.http().get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(RemoteError::Status(status.as_u16()));
    }
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
      return Err(RemoteError::EmptyBody);
    }
    Ok(bytes.to_vec())
  }

  /// `POST /api/control?signal=<bool>`，返回应答正文
  pub async fn post_control(&self, signal: bool) -> Result<String, RemoteError> {
    let mut url = self.endpoint(CONTROL_ENDPOINT)?;
    url
      .query_pairs_mut()
      .append_pair("signal", if signal { "true" } else { "false" });
    debug!("POST {}", url);
    let response = self.http().post(url).body(Vec::new()).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(RemoteError::Status(status.as_u16()));
    }
    let body = response.text().await?;
    if body.is_empty() {
      Ok("OK".to_string())
    } else {
      Ok(body)
    }
  }

  /// `GET /api/status` 中的 `is_running`
  pub async fn get_running(&self) -> Result<bool, RemoteError> {
    let body = self.get_text(STATUS_ENDPOINT).await?;
    let status: StatusResponse = serde_json::from_str(&body)?;
    Ok(status.is_running)
  }
}

impl FieldUnitSource for FieldUnitClient {
  async fn fetch_manifest(&self) -> Result<String, RemoteError> {
    self.get_text(MANIFEST_ENDPOINT).await
  }

  async fn fetch_image(&self, reference: &str) -> Result<Vec<u8>, RemoteError> {
    let url = self.image_url(reference)?;
    self.get_bytes(url).await
  }
}

impl NetworkBinder for FieldUnitClient {
  type Error = RemoteError;

  fn bind_network(&self, network: Option<&NetworkInfo>) -> Result<(), Self::Error> {
    let mut transport = match self.transport.write() {
      Ok(transport) => transport,
      Err(poisoned) => poisoned.into_inner(),
    };
    if same_binding(transport.bound.as_ref(), network) {
      return Ok(());
    }
    transport.http = build_http(self.timeout, network)?;
    transport.bound = network.cloned();
    match network {
      Some(network) if BIND_TO_DEVICE => info!("HTTP 流量已绑定到接口 {}", network.interface),
      Some(network) => info!(
        "HTTP 流量已绑定到接口 {} 的地址 {:?}",
        network.interface, network.address
      ),
      None => info!("HTTP 流量恢复默认路由"),
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> FieldUnitClient {
    FieldUnitClient::from_url(&Url::parse(DEFAULT_FIELD_UNIT_URL).unwrap()).unwrap()
  }

  #[test]
  fn rejects_foreign_scheme() {
    let url = Url::parse("ftp://192.168.4.1").unwrap();
    assert!(matches!(
      FieldUnitClient::from_url(&url),
      Err(RemoteError::SchemeMismatch)
    ));
  }

  #[test]
  fn image_references_resolve_against_base() {
    let client = client();
    assert_eq!(
      client.image_url("/images/p1_0.jpg").unwrap().as_str(),
      "http://192.168.4.1:8080/images/p1_0.jpg"
    );
    assert_eq!(
      client.image_url("p1 0.jpg").unwrap().as_str(),
      "http://192.168.4.1:8080/images/p1%200.jpg"
    );
    assert_eq!(
      client.image_url("http://10.0.0.2/x.png").unwrap().as_str(),
      "http://10.0.0.2/x.png"
    );
  }

  fn hotspot(interface: &str, address: &str) -> NetworkInfo {
    NetworkInfo {
      interface: interface.into(),
      ssid: Some("FIELD_UNIT_DATA".into()),
      address: Some(address.parse().unwrap()),
    }
  }

  #[test]
  fn binding_is_idempotent() {
    let client = client();
    let wlan = hotspot("wlan0", "192.168.4.2");
    client.bind_network(Some(&wlan)).unwrap();
    client.bind_network(Some(&wlan)).unwrap();
    assert_eq!(client.bound_network(), Some(wlan.clone()));

    let renewed = hotspot("wlan0", "192.168.4.9");
    client.bind_network(Some(&renewed)).unwrap();
    let expected = if BIND_TO_DEVICE { wlan } else { renewed };
    assert_eq!(client.bound_network(), Some(expected));

    client.bind_network(None).unwrap();
    assert_eq!(client.bound_network(), None);
  }

  #[test]
  fn binding_follows_the_interface() {
    let client = client();
    client.bind_network(Some(&hotspot("wlan0", "192.168.4.2"))).unwrap();
    client.bind_network(Some(&hotspot("wlan1", "192.168.4.2"))).unwrap();
    if BIND_TO_DEVICE {
      assert_eq!(client.bound_network().unwrap().interface, "wlan1");
    }
    assert!(same_binding(None, None));
    assert!(!same_binding(Some(&hotspot("wlan0", "10.0.0.1")), None));
  }
}
