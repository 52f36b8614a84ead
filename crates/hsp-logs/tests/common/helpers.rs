// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

/// A telemetry batch as the Telemetry API would push it: two application log
/// lines and one platform event.
pub fn create_test_telemetry_batch() -> Value {
    json!([
        {
            "time": "2024-03-01T12:30:05.120Z",
            "type": "function",
            "record": "Orders.INFO|CustomLogEvent|txn-1|trace-1|span-1|checkout|order placed\n"
        },
        {
            "time": "2024-03-01T12:30:05.250Z",
            "type": "function",
            "record": "Orders.ERROR|CustomLogEvent|txn-2|trace-2|span-2|checkout|payment declined\n"
        },
        {
            "time": "2024-03-01T12:30:05.300Z",
            "type": "platform.runtimeDone",
            "record": {"requestId": "6d68ca91-49c9-448d-89b8-7ca3e6dc66aa", "status": "success"}
        }
    ])
}

/// Send an HTTP request over TCP and return the response
#[allow(dead_code)]
pub async fn send_tcp_request(
    addr: SocketAddr,
    uri: &str,
    method: &str,
    body: Option<Vec<u8>>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Content-Type", "application/json");

    let request = if let Some(body_data) = body {
        request_builder = request_builder.header("Content-Length", body_data.len().to_string());
        request_builder.body(Full::new(Bytes::from(body_data)))?
    } else {
        request_builder.body(Full::new(Bytes::new()))?
    };

    Ok(timeout(Duration::from_secs(2), sender.send_request(request)).await??)
}

/// Send a POST with a `Transfer-Encoding: chunked` body, split into
/// `chunk_size` pieces, and return the response status code
#[allow(dead_code)]
pub async fn send_chunked_request(
    addr: SocketAddr,
    body: &[u8],
    chunk_size: usize,
) -> Result<u16, Box<dyn std::error::Error>> {
    let mut stream =
        timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let mut request = concat!(
        "POST / HTTP/1.1\r\n",
        "Host: localhost\r\n",
        "Content-Type: application/json\r\n",
        "Transfer-Encoding: chunked\r\n",
        "\r\n"
    )
    .as_bytes()
    .to_vec();
    for chunk in body.chunks(chunk_size) {
        request.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        request.extend_from_slice(chunk);
        request.extend_from_slice(b"\r\n");
    }
    request.extend_from_slice(b"0\r\n\r\n");
    stream.write_all(&request).await?;

    let mut response = Vec::new();
    let mut buf = [0u8; 1024];
    while !response.windows(2).any(|w| w == b"\r\n") {
        let n = timeout(Duration::from_secs(2), stream.read(&mut buf)).await??;
        if n == 0 {
            break;
        }
        response.extend_from_slice(&buf[..n]);
    }

    let status_line = String::from_utf8_lossy(&response);
    let status = status_line
        .split_whitespace()
        .nth(1)
        .ok_or("empty response")?
        .parse::<u16>()?;
    Ok(status)
}

#[allow(dead_code)]
pub async fn response_body(response: Response<hyper::body::Incoming>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Response body is not JSON")
}
