// 该文件是 Tianjian （田间） 项目的一部分。
// tests/remote.rs - 野外单元 HTTP 接口测试
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

use std::{sync::Arc, time::Duration};

use serde_json::json;
use url::Url;
use wiremock::{
  Mock, MockServer, ResponseTemplate,
  matchers::{method, path, query_param},
};

use tianjian::{
  model::RecordKind,
  remote::{ControlClient, FieldUnitClient, FieldUnitSource, RemoteError},
  status::TransferStatus,
  store::{DetectionStore, ImageDir, SqliteStore},
  transfer::TransferOrchestrator,
};

fn client(server: &MockServer) -> Arc<FieldUnitClient> {
  Arc::new(FieldUnitClient::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(5)).unwrap())
}

#[tokio::test]
async fn control_signal_is_sent_as_query() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/control"))
    .and(query_param("signal", "true"))
    .respond_with(ResponseTemplate::new(200).set_body_string("Script started"))
    .expect(1)
    .mount(&server)
    .await;

  let control = ControlClient::new(client(&server));
  assert_eq!(control.send_control(true).await.unwrap(), "Script started");
  assert!(control.is_running());
}

#[tokio::test]
async fn control_failure_carries_the_status() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/control"))
    .respond_with(ResponseTemplate::new(500))
    .expect(1)
    .mount(&server)
    .await;

  let control = ControlClient::new(client(&server));
  let err = control.send_control(true).await.unwrap_err();
  assert!(matches!(err, RemoteError::Status(500)));
  assert_eq!(err.to_string(), "Server returned code: 500");
  assert!(!control.is_running());
}

#[tokio::test]
async fn status_poll_reads_the_running_flag() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/api/status"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"is_running": true})))
    .mount(&server)
    .await;

  let control = ControlClient::new(client(&server));
  let mut running = control.subscribe_running();
  assert!(control.poll_status().await);
  assert!(running.has_changed().unwrap());
  assert!(*running.borrow_and_update());
}

#[tokio::test]
async fn status_poll_failures_read_as_stopped() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/api/status"))
    .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
    .mount(&server)
    .await;

  let control = ControlClient::new(client(&server));
  assert!(!control.poll_status().await);

  let unreachable = FieldUnitClient::new(
    Url::parse("http://127.0.0.1:9").unwrap(),
    Duration::from_millis(500),
  )
  .unwrap();
  assert!(!ControlClient::new(Arc::new(unreachable)).poll_status().await);
}

#[tokio::test]
async fn toggle_sends_the_complement() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/control"))
    .and(query_param("signal", "true"))
    .respond_with(ResponseTemplate::new(200))
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/api/control"))
    .and(query_param("signal", "false"))
    .respond_with(ResponseTemplate::new(200).set_body_string("stopped"))
    .expect(1)
    .mount(&server)
    .await;

  let control = ControlClient::new(client(&server));
  assert_eq!(control.toggle().await.unwrap(), "OK");
  assert!(control.is_running());
  assert_eq!(control.toggle().await.unwrap(), "stopped");
  assert!(!control.is_running());
}

#[tokio::test]
async fn manifest_and_images_are_fetched() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/api/pests"))
    .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/images/leaf%201.jpg"))
    .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/images/empty.jpg"))
    .respond_with(ResponseTemplate::new(200))
    .mount(&server)
    .await;

  let client = client(&server);
  assert_eq!(client.fetch_manifest().await.unwrap(), "[]");
  assert_eq!(client.fetch_image("leaf 1.jpg").await.unwrap(), b"jpeg");
  assert!(matches!(
    client.fetch_image("/images/empty.jpg").await,
    Err(RemoteError::EmptyBody)
  ));
  assert!(matches!(
    client.fetch_image("/images/missing.jpg").await,
    Err(RemoteError::Status(404))
  ));
}

#[tokio::test]
async fn pull_against_a_mock_field_unit() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/api/pests"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([
      {
        "id": "p1",
        "name": "Aphid",
        "name_en": "Aphids",
        "type": "PRAGA",
        "images": ["/images/p1_0.jpg"],
        "confidence": 0.82,
        "timestamp": "2025-01-01T10:00:00.123"
      },
      {
        "id": "d1",
        "name": "Requeima",
        "type": "DOENCA",
        "images": ["/images/d1_0.jpg"],
        "confidence": 91.5
      }
    ])))
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/images/p1_0.jpg"))
    .respond_with(ResponseTemplate::new(200).set_body_bytes(b"p1".to_vec()))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let store = Arc::new(SqliteStore::open_in_memory().unwrap());
  let orchestrator = TransferOrchestrator::new(
    client(&server),
    Arc::clone(&store),
    ImageDir::new(dir.path()),
  );

  assert_eq!(
    orchestrator.run_transfer().await,
    TransferStatus::Success { item_count: 2 }
  );
  let records = store.all(RecordKind::FieldUnit).unwrap();
  assert_eq!(records.len(), 2);
  let requeima = records.iter().find(|r| r.label == "Requeima").unwrap();
  assert_eq!(requeima.image_path, "");
  assert!((requeima.confidence - 0.915).abs() < 1e-9);
  let aphids = records.iter().find(|r| r.label == "Aphids").unwrap();
  assert!(ImageDir::resolve_existing(&aphids.image_path).is_some());
}

#[tokio::test]
async fn manifest_server_error_surfaces_in_the_status() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/api/pests"))
    .respond_with(ResponseTemplate::new(500))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let store = Arc::new(SqliteStore::open_in_memory().unwrap());
  let orchestrator =
    TransferOrchestrator::new(client(&server), Arc::clone(&store), ImageDir::new(dir.path()));

  assert_eq!(
    orchestrator.run_transfer().await,
    TransferStatus::Error {
      message: "Server returned code: 500".to_string()
    }
  );
  assert_eq!(store.count(RecordKind::FieldUnit).unwrap(), 0);
}
