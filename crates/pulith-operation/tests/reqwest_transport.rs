//! `ReqwestTransport` against a local axum server.

#![cfg(feature = "reqwest")]

mod common;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes as AxumBytes;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect};
use axum::routing::{get, post};
use futures_util::StreamExt;
use pulith_operation::{
    AcceptancePolicy, HttpOperation, InlineContext, IoExecutor, OperationState, ReqwestTransport,
    RequestDescriptor, Schedulable, Transport, TransportErrorKind, UploadProgress,
};
use tokio::net::TcpListener;

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route(
            "/json",
            get(|| async { ([(header::CONTENT_TYPE, "application/json")], r#"{"ok":true}"#) }),
        )
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, "no such thing") }),
        )
        .route("/redirect", get(|| async { Redirect::temporary("/json") }))
        .route(
            "/echo",
            post(|headers: axum::http::HeaderMap, body: AxumBytes| async move {
                let tag = headers
                    .get("x-tag")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                ([("x-tag", tag)], body).into_response()
            }),
        )
        .route(
            "/latin1",
            get(|| async {
                let disposition =
                    header::HeaderValue::from_bytes(b"attachment; filename=caf\xe9.txt").unwrap();
                (
                    [
                        (header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain")),
                        (header::CONTENT_DISPOSITION, disposition),
                    ],
                    "hi",
                )
            }),
        )
        .route("/large", get(|| async { vec![7u8; 256 * 1024] }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

#[tokio::test(flavor = "multi_thread")]
async fn fetches_head_and_body() {
    let addr = serve().await;
    let transport = ReqwestTransport::new().unwrap();
    let request = RequestDescriptor::get(&url(addr, "/json")).unwrap();

    let response = transport
        .send(&request, UploadProgress::disabled())
        .await
        .unwrap();
    assert_eq!(response.head.status, 200);
    assert_eq!(response.head.mime_type().as_deref(), Some("application/json"));
    assert_eq!(response.head.content_length, Some(11));

    let mut body = Vec::new();
    let mut stream = response.body;
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, br#"{"ok":true}"#);
}

#[tokio::test(flavor = "multi_thread")]
async fn follows_redirects_and_reports_final_url() {
    let addr = serve().await;
    let transport = ReqwestTransport::new().unwrap();
    let request = RequestDescriptor::get(&url(addr, "/redirect")).unwrap();

    let response = transport
        .send(&request, UploadProgress::disabled())
        .await
        .unwrap();
    assert_eq!(response.head.status, 200);
    assert_eq!(response.head.url.path(), "/json");
}

#[tokio::test(flavor = "multi_thread")]
async fn sends_headers_and_body() {
    let addr = serve().await;
    let transport = ReqwestTransport::new().unwrap();
    let request = RequestDescriptor::post(&url(addr, "/echo"))
        .unwrap()
        .header("x-tag", "abc")
        .body(&b"payload"[..]);

    let response = transport
        .send(&request, UploadProgress::disabled())
        .await
        .unwrap();
    assert_eq!(response.head.header_value("x-tag"), Some("abc"));

    let body: Vec<_> = response.body.collect().await;
    let body: Vec<u8> = body
        .into_iter()
        .flat_map(|chunk| chunk.unwrap().to_vec())
        .collect();
    assert_eq!(body, b"payload");
}

#[tokio::test(flavor = "multi_thread")]
async fn keeps_non_utf8_header_values() {
    let addr = serve().await;
    let transport = ReqwestTransport::new().unwrap();
    let request = RequestDescriptor::get(&url(addr, "/latin1")).unwrap();

    let response = transport
        .send(&request, UploadProgress::disabled())
        .await
        .unwrap();
    assert_eq!(response.head.mime_type().as_deref(), Some("text/plain"));
    assert_eq!(
        response.head.header_value("content-disposition"),
        Some("attachment; filename=caf\u{fffd}.txt")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_refused_is_a_connect_error() {
    // bind and drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = ReqwestTransport::new().unwrap();
    let request = RequestDescriptor::get(&url(addr, "/")).unwrap();
    let err = transport
        .send(&request, UploadProgress::disabled())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), TransportErrorKind::Connect);
}

#[tokio::test(flavor = "multi_thread")]
async fn operation_end_to_end() {
    common::init_tracing();
    let addr = serve().await;
    let io = IoExecutor::new(ReqwestTransport::new().unwrap()).unwrap();
    let (callback, rx) = common::completion_channel();

    let operation =
        HttpOperation::builder(RequestDescriptor::get(&url(addr, "/large")).unwrap(), &io.handle())
            .complete_on(InlineContext, callback);
    operation.start().unwrap();

    let completion = tokio::task::spawn_blocking(move || common::recv(&rx))
        .await
        .unwrap();
    assert_eq!(completion.state, OperationState::Succeeded);
    let body = completion.into_result().unwrap().body.unwrap();
    assert_eq!(body.len(), 256 * 1024);
    assert!(body.iter().all(|b| *b == 7));
}

#[tokio::test(flavor = "multi_thread")]
async fn operation_rejects_missing_resource() {
    let addr = serve().await;
    let io = IoExecutor::new(ReqwestTransport::new().unwrap()).unwrap();

    let operation =
        HttpOperation::builder(RequestDescriptor::get(&url(addr, "/missing")).unwrap(), &io.handle())
            .acceptance(AcceptancePolicy::default().abort_on_status_code_error(true))
            .build();
    operation.start().unwrap();
    tokio::time::timeout(Duration::from_secs(10), operation.wait())
        .await
        .unwrap();

    assert_eq!(operation.state(), OperationState::Failed);
    assert_eq!(operation.is_status_code_acceptable(), Some(false));
    assert_eq!(operation.last_response().map(|h| h.status), Some(404));
}

#[tokio::test(flavor = "multi_thread")]
async fn operation_reports_upload_progress() {
    let addr = serve().await;
    let io = IoExecutor::new(ReqwestTransport::new().unwrap()).unwrap();
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    let (callback, rx) = common::completion_channel::<()>();

    let request = RequestDescriptor::post(&url(addr, "/echo"))
        .unwrap()
        .body(vec![1u8; 200 * 1024]);
    let operation = HttpOperation::builder(request, &io.handle())
        .on_upload_progress(move |p| sink.lock().unwrap().push(p.transferred))
        .complete_on(InlineContext, callback);
    operation.start().unwrap();

    let completion = tokio::task::spawn_blocking(move || common::recv(&rx))
        .await
        .unwrap();
    assert!(completion.is_success(), "{:?}", completion.error());
    assert_eq!(
        completion.into_result().unwrap().body.map(|b| b.len()),
        Some(200 * 1024)
    );

    let reported = reported.lock().unwrap().clone();
    assert!(reported.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(reported.last(), Some(&(200 * 1024)));
}
