//! Tests for the HTTP delivery client against a loopback responder
//!
//! The responder is a bare `TcpListener` that answers every request with a
//! fixed status and records the request head and body.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fieldsafe_core::config::EndpointConfig;
use fieldsafe_core::connectivity::ConnectivityMonitor;
use fieldsafe_core::delivery::{DeliveryClient, HttpDeliveryClient};
use fieldsafe_core::sync::{EventSyncService, SubmitOutcome};
use fieldsafe_core::{idempotency_key, DurableQueueStore, Error, EventKind, MemoryQueueStore, SosEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct RecordedRequest {
    head: String,
    body: String,
}

impl RecordedRequest {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

struct Responder {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Start a responder answering every request with `status_line`
async fn start_responder(status_line: &'static str, delay: Duration) -> Responder {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                recorded.lock().unwrap().push(request);

                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: 16\r\nConnection: close\r\n\r\n{{\"success\":true}}",
                    status_line
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    Responder {
        base_url: format!("http://{}", addr),
        requests,
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        let Some(head_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let head = text[..head_end].to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);

        let body_start = head_end + 4;
        if buf.len() >= body_start + content_length {
            let body = String::from_utf8_lossy(&buf[body_start..body_start + content_length]).to_string();
            return Some(RecordedRequest { head, body });
        }
    }
}

fn client_for(responder: &Responder, timeout_secs: u64) -> HttpDeliveryClient {
    HttpDeliveryClient::new(EndpointConfig {
        server_url: Some(responder.base_url.clone()),
        api_key: Some("sk_test".to_string()),
        timeout_secs,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_deliver_posts_payload_with_headers() {
    let responder = start_responder("200 OK", Duration::ZERO).await;
    let client = client_for(&responder, 5);

    let payload = serde_json::to_value(SosEvent::new("user-001", None).unwrap()).unwrap();
    client.deliver(EventKind::Sos, &payload).await.unwrap();

    let requests = responder.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);

    let request = &requests[0];
    assert!(request.request_line().starts_with("POST /api/gbv/sos "));
    assert_eq!(request.header("authorization").as_deref(), Some("Bearer sk_test"));
    assert_eq!(
        request.header("idempotency-key"),
        Some(idempotency_key(EventKind::Sos, &payload))
    );

    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body, payload);
}

#[tokio::test]
async fn test_non_success_status_is_delivery_error() {
    let responder = start_responder("503 Service Unavailable", Duration::ZERO).await;
    let client = client_for(&responder, 5);

    let err = client
        .deliver(EventKind::Report, &serde_json::json!({"reportId": "r"}))
        .await
        .unwrap_err();

    match err {
        Error::Delivery { kind, message } => {
            assert_eq!(kind, EventKind::Report);
            assert!(message.contains("503"));
        }
        other => panic!("expected delivery error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let responder = start_responder("200 OK", Duration::from_secs(5)).await;
    let client = client_for(&responder, 1);

    let result = client
        .deliver(EventKind::Sos, &serde_json::json!({"userId": "u"}))
        .await;

    assert!(matches!(result, Err(Error::Http(_))));
}

#[tokio::test]
async fn test_health_check_drives_connectivity() {
    let up = start_responder("200 OK", Duration::ZERO).await;
    let down = start_responder("500 Internal Server Error", Duration::ZERO).await;

    let monitor = ConnectivityMonitor::new(false);
    assert!(monitor.refresh_from(&client_for(&up, 5)).await);
    assert!(monitor.is_online());

    assert!(!monitor.refresh_from(&client_for(&down, 5)).await);
    assert!(!monitor.is_online());

    let requests = up.requests.lock().unwrap().clone();
    assert!(requests[0].request_line().starts_with("GET /health "));
}

#[tokio::test]
async fn test_rejected_submit_is_queued() {
    let responder = start_responder("502 Bad Gateway", Duration::ZERO).await;
    let store = Arc::new(MemoryQueueStore::new());
    let service = EventSyncService::new(
        store.clone(),
        Arc::new(client_for(&responder, 5)),
        ConnectivityMonitor::new(true),
    );

    let outcome = service
        .submit(SosEvent::new("user-001", None).unwrap().into())
        .await
        .unwrap();

    assert_eq!(outcome, SubmitOutcome::Queued);
    assert_eq!(store.len(EventKind::Sos).unwrap(), 1);
}
