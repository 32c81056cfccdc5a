//! Flush behavior against a live (stub) ingestion endpoint.
//!
//! The stub accepts one TCP connection per scripted status, records the
//! request body and answers with `connection: close` so every push
//! opens a fresh connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use pulsemesh_probe::buffer::{flush_once, FlushOutcome, SampleBuffer};
use pulsemesh_probe::config::ProbeConfig;
use pulsemesh_probe::models::{Sample, SampleMetrics};
use pulsemesh_probe::pusher::Pusher;

type SeenBodies = Arc<Mutex<Vec<serde_json::Value>>>;

async fn spawn_endpoint(statuses: Vec<u16>) -> (String, SeenBodies) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let bodies: SeenBodies = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&bodies);

    tokio::spawn(async move {
        for status in statuses {
            let (mut stream, _) = listener.accept().await.unwrap();
            let body = read_request(&mut stream).await;
            seen.lock().push(body);
            let reason = if status == 202 {
                "Accepted"
            } else {
                "Internal Server Error"
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        }
    });

    (format!("http://{addr}/api/telemetry"), bodies)
}

async fn read_request(stream: &mut TcpStream) -> serde_json::Value {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut tmp).await.unwrap();
        assert!(n > 0, "connection closed before request head completed");
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length: usize = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .map(|value| value.trim().parse().unwrap())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut tmp).await.unwrap();
        assert!(n > 0, "connection closed before request body completed");
        buf.extend_from_slice(&tmp[..n]);
    }
    serde_json::from_slice(&buf[header_end..header_end + content_length]).unwrap()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn probe_config(endpoint: &str, batch_size: usize, buffer_limit: usize) -> ProbeConfig {
    ProbeConfig {
        endpoint: endpoint.to_string(),
        node_id: "edge-9".to_string(),
        region: "ap-south".to_string(),
        role: "relay".to_string(),
        batch_size,
        buffer_limit,
        ..ProbeConfig::default()
    }
}

fn sample(id: &str) -> Sample {
    Sample {
        id: id.to_string(),
        node_id: "edge-9".to_string(),
        region: "ap-south".to_string(),
        role: "relay".to_string(),
        timestamp: Utc::now(),
        metrics: SampleMetrics {
            load1m: 0.35,
            cpu_count: 4,
            memory_percent: 52.1,
            total_mem: 8_000_000_000,
            free_mem: 3_800_000_000,
            uptime: 7_200,
            platform: "linux-x86_64".to_string(),
        },
    }
}

#[tokio::test]
async fn test_failed_push_requeues_then_delivers() {
    let (endpoint, bodies) = spawn_endpoint(vec![500, 202]).await;
    let config = probe_config(&endpoint, 2, 10);
    let buffer = SampleBuffer::shared(&config);
    let pusher = Pusher::new(&config).unwrap();

    {
        let mut buf = buffer.lock();
        buf.push(sample("1"));
        buf.push(sample("2"));
    }

    let outcome = timeout(Duration::from_secs(5), flush_once(&buffer, &pusher, false))
        .await
        .unwrap();
    assert_eq!(outcome, FlushOutcome::Retrying(2));
    assert_eq!(buffer.lock().len(), 2);
    assert!(!buffer.lock().is_flushing());

    let outcome = timeout(Duration::from_secs(5), flush_once(&buffer, &pusher, false))
        .await
        .unwrap();
    assert_eq!(outcome, FlushOutcome::Delivered(2));
    assert!(buffer.lock().is_empty());

    // Both attempts carried the same batch, identity fields included.
    let seen = bodies.lock();
    assert_eq!(seen.len(), 2);
    for body in seen.iter() {
        assert_eq!(body["nodeId"], "edge-9");
        assert_eq!(body["region"], "ap-south");
        assert_eq!(body["role"], "relay");
        let batch = body["batch"].as_array().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0]["id"], "1");
        assert_eq!(batch[1]["id"], "2");
        assert_eq!(batch[0]["metrics"]["cpuCount"], 4);
    }
}

#[tokio::test]
async fn test_below_threshold_waits_unless_forced() {
    let (endpoint, bodies) = spawn_endpoint(vec![]).await;
    let config = probe_config(&endpoint, 5, 10);
    let buffer = SampleBuffer::shared(&config);
    let pusher = Pusher::new(&config).unwrap();

    {
        let mut buf = buffer.lock();
        buf.push(sample("1"));
        buf.push(sample("2"));
    }

    let outcome = timeout(Duration::from_secs(5), flush_once(&buffer, &pusher, false))
        .await
        .unwrap();
    assert_eq!(outcome, FlushOutcome::Idle);
    assert_eq!(buffer.lock().len(), 2);
    assert!(bodies.lock().is_empty());

    // Forced flush does try, and the dead endpoint sends it back to the
    // buffer rather than losing it.
    let outcome = timeout(Duration::from_secs(15), flush_once(&buffer, &pusher, true))
        .await
        .unwrap();
    assert_eq!(outcome, FlushOutcome::Retrying(2));
    assert_eq!(buffer.lock().len(), 2);
}
