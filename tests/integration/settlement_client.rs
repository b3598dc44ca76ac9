//! Typed settlement queries over fake and real transports

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use settlement_sync::cli::reconcile::latest_sale;
use settlement_sync::sync::SyncConfig;
use settlement_sync::transport::{
    CredentialStatus, Credentials, ErrorKind, FetchError, HttpTransport, RawResponse,
    ReqwestTransport, TransportError,
};
use settlement_sync::{DateWindow, TransactionType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::support::{client_over, daily_sales, day, LedgerTransport, ScriptedTransport};

fn window() -> DateWindow {
    DateWindow::spanning_days(day(2024, 1, 1), 14)
}

#[tokio::test(start_paused = true)]
async fn test_fetch_page_decodes_listing() {
    let body = json!({
        "content": [{
            "orderNumber": "10293847",
            "transactionDate": 1704326400000i64,
            "orderDate": 1704067200000i64,
            "grossAmount": 249.9,
            "transactionType": "Sale"
        }],
        "totalPages": 1,
        "totalElements": 1,
        "page": 0,
        "size": 500
    });
    let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::new(
        200,
        body.to_string(),
    ))]));
    let client = client_over(transport.clone());

    let page = client
        .fetch_page(&window(), TransactionType::Sale, 0, 500)
        .await
        .unwrap();

    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].order_number.as_deref(), Some("10293847"));
    assert_eq!(page.content[0].order_date, Some(day(2024, 1, 1)));
    assert!(page.has_evidence());
}

#[tokio::test(start_paused = true)]
async fn test_page_size_is_capped() {
    let ledger = Arc::new(LedgerTransport::new(Vec::new()));
    let client = client_over(ledger.clone());

    client
        .fetch_page(&window(), TransactionType::Return, 3, 5000)
        .await
        .unwrap();

    let q = &ledger.queries()[0];
    assert_eq!(q.size, 1000);
    assert_eq!(q.page, 3);
    assert_eq!(q.category, "Return");
    assert_eq!(q.start, window().start_millis());
    assert_eq!(q.end, window().end_millis());
}

#[tokio::test(start_paused = true)]
async fn test_fetch_window_follows_every_page() {
    let ledger = Arc::new(LedgerTransport::new(daily_sales(
        day(2024, 1, 1),
        day(2024, 1, 15),
        0,
    )));
    let client = client_over(ledger.clone());

    let records = client
        .fetch_window(&window(), TransactionType::Sale, 5)
        .await
        .unwrap();

    assert_eq!(records.len(), 14);
    assert_eq!(ledger.calls(), 3);
    assert!(records
        .windows(2)
        .all(|w| w[0].transaction_date <= w[1].transaction_date));
}

#[tokio::test(start_paused = true)]
async fn test_window_end_is_exclusive() {
    let ledger = Arc::new(LedgerTransport::new(daily_sales(
        day(2024, 1, 1),
        day(2024, 1, 20),
        0,
    )));
    let client = client_over(ledger.clone());

    let records = client
        .fetch_window(&window(), TransactionType::Sale, 1000)
        .await
        .unwrap();

    assert_eq!(records.len(), 14);
    assert!(records
        .iter()
        .all(|r| r.transaction_date < window().start + Duration::days(14)));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_body() {
    let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::new(
        200,
        "<html>maintenance</html>",
    ))]));
    let client = client_over(transport);

    let result = client
        .fetch_page(&window(), TransactionType::Sale, 0, 500)
        .await;
    assert!(matches!(result, Err(FetchError::Malformed(_))));
}

#[tokio::test(start_paused = true)]
async fn test_terminal_and_exhausted_failures() {
    let transport = Arc::new(ScriptedTransport::statuses(&[404]));
    let client = client_over(transport);
    let result = client
        .fetch_page(&window(), TransactionType::Sale, 0, 500)
        .await;
    assert_eq!(result.unwrap_err(), FetchError::Rejected { status: 404 });

    let transport = Arc::new(ScriptedTransport::statuses(&[500, 500, 500, 500]));
    let client = client_over(transport.clone());
    let result = client
        .fetch_page(&window(), TransactionType::Sale, 0, 500)
        .await;
    assert_eq!(
        result.unwrap_err(),
        FetchError::Exhausted {
            kind: ErrorKind::ServerError(500),
            retries: 3
        }
    );
    assert_eq!(transport.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_verify_credentials() {
    let cases: Vec<(Vec<Result<RawResponse, TransportError>>, CredentialStatus)> = vec![
        (vec![Ok(RawResponse::new(200, "[]"))], CredentialStatus::Valid),
        (
            vec![Ok(RawResponse::new(403, ""))],
            CredentialStatus::Rejected(403),
        ),
        (
            (0..4).map(|_| Ok(RawResponse::new(401, ""))).collect(),
            CredentialStatus::Rejected(401),
        ),
        (
            (0..4)
                .map(|_| Err(TransportError::Timeout("deadline".into())))
                .collect(),
            CredentialStatus::Unreachable(ErrorKind::NetworkTimeout),
        ),
    ];

    for (script, expected) in cases {
        let client = client_over(Arc::new(ScriptedTransport::new(script)));
        assert_eq!(client.verify_credentials().await, expected);
    }
}

/// Accept one connection, answer `body`, and hand back the raw request.
async fn one_shot_server(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&request).to_lowercase()
    });
    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn test_reqwest_transport_sends_auth_and_query() {
    let (base_url, server) = one_shot_server(r#"{"content":[],"totalPages":0}"#).await;
    let credentials = Credentials::new("4711", "key", "secret");
    let transport = ReqwestTransport::new(base_url, &credentials).unwrap();

    let response = transport
        .send(
            "/integration/finance/che/sellers/4711/settlements",
            &[
                ("transactionType", "Sale".to_string()),
                ("page", "0".to_string()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(response.status, 200);

    let request = server.await.unwrap();
    assert!(request.starts_with(
        "get /integration/finance/che/sellers/4711/settlements?transactiontype=sale&page=0 http/1.1"
    ));
    assert!(request.contains("authorization: basic a2v5onnly3jlda=="));
    assert!(request.contains("user-agent: 4711 - selfintegration"));
}

#[tokio::test(start_paused = true)]
async fn test_latest_sale_requests_accepted_page_size() {
    let ledger = Arc::new(LedgerTransport::new(daily_sales(
        day(2024, 1, 1),
        day(2024, 2, 10),
        1,
    )));
    ledger.fail_when(|q| (q.size != 500 && q.size != 1000).then_some(400));
    let client = client_over(ledger.clone());

    let sale = latest_sale(&client, &SyncConfig::default(), day(2024, 3, 1))
        .await
        .unwrap()
        .expect("a sale inside the lookback");

    assert_eq!(sale.transaction_date, day(2024, 2, 10));
    let queries = ledger.queries();
    assert!(!queries.is_empty());
    for query in &queries {
        assert_eq!(query.size, 500);
        assert_eq!(query.page, 0);
        assert_eq!(query.category, TransactionType::Sale.as_str());
    }
}
