use q2d_server::expand::{ExpansionError, GeminiConfig, GeminiExpander, QueryExpander};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Accept one HTTP request, answer it with `status_line` and `body`, return the raw request.
async fn one_shot(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = header_end(&buf) {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
        }
        let reply = format!(
            "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        sock.write_all(reply.as_bytes()).await.unwrap();
        let _ = sock.shutdown().await;
        String::from_utf8_lossy(&buf).to_string()
    });
    (format!("http://{addr}"), handle)
}

fn expander(endpoint: &str) -> GeminiExpander {
    GeminiExpander::new(GeminiConfig {
        api_key: "secret".into(),
        model: "test-model".into(),
        endpoint: endpoint.into(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn posts_prompt_and_reads_candidate() {
    let (url, handle) = one_shot(
        "HTTP/1.1 200 OK",
        r#"{"candidates":[{"content":{"parts":[{"text":"詐欺 詐騙 騙取\n"}]}}]}"#,
    )
    .await;
    let expanded = expander(&url).expand("詐欺").await.unwrap();
    assert_eq!(expanded, "詐欺 詐騙 騙取");

    let raw = handle.await.unwrap();
    assert!(raw.starts_with("POST /v1beta/models/test-model:generateContent"), "{raw}");
    assert!(raw.to_lowercase().contains("x-goog-api-key: secret"));
    assert!(raw.contains("Query: 詐欺"));
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let (url, _handle) = one_shot("HTTP/1.1 503 Service Unavailable", r#"{"error":"overloaded"}"#).await;
    match expander(&url).expand("詐欺").await {
        Err(ExpansionError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert!(body.contains("overloaded"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_service_is_an_http_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = expander(&format!("http://{addr}")).expand("詐欺").await.unwrap_err();
    assert!(matches!(err, ExpansionError::Http(_)));
}
