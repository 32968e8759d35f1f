use super::*;

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use shared::{
    domain::{BulkAction, FilterSignature, RowId},
    error::ErrorCode,
    protocol::{Directive, Row},
};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

use crate::error::{ErrorCategory, ErrorContext, SessionError};

#[derive(Clone)]
struct ServerState {
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    bulk_tx: Arc<Mutex<Option<oneshot::Sender<BulkRequest>>>>,
}

async fn handle_list(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<PageOfRows> {
    state.queries.lock().await.push(query);
    Json(PageOfRows {
        rows: vec![
            Row::new(1).with_field("plate", "AB-101"),
            Row::new(2).with_field("plate", "AB-102"),
        ],
        total: 42,
    })
}

async fn handle_bulk(
    State(state): State<ServerState>,
    Json(payload): Json<BulkRequest>,
) -> Json<BulkOutcome> {
    if let Some(tx) = state.bulk_tx.lock().await.take() {
        let _ = tx.send(payload);
    }
    Json(BulkOutcome { affected: 41 })
}

async fn handle_conflict() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::CONFLICT,
        Json(ApiError::new(
            ErrorCode::Conflict,
            "brand 3 still has vehicles attached",
        )),
    )
}

async fn handle_broken() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "upstream exploded")
}

async fn spawn_admin_server() -> Result<(String, ServerState, oneshot::Receiver<BulkRequest>)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel();
    let state = ServerState {
        queries: Arc::new(Mutex::new(Vec::new())),
        bulk_tx: Arc::new(Mutex::new(Some(tx))),
    };
    let app = Router::new()
        .route("/api/bookings", get(handle_list))
        .route("/api/bookings/bulk", post(handle_bulk))
        .route("/api/brands/bulk", post(handle_conflict))
        .route("/api/locations", get(handle_broken))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api/"), state, rx))
}

#[tokio::test]
async fn fetch_page_sends_query_pairs_and_decodes_rows() {
    let (base_url, state, _bulk_rx) = spawn_admin_server().await.expect("spawn server");
    let api = HttpListApi::new(base_url, "bookings");

    let mut params = QueryParams {
        search: "golf".to_string(),
        page: 2,
        ..QueryParams::default()
    };
    params
        .filters
        .insert("status".to_string(), Some("confirmed".to_string()));

    let page = api.fetch_page(&params).await.expect("fetch");
    assert_eq!(page.total, 42);
    assert_eq!(page.ids(), vec![RowId::Int(1), RowId::Int(2)]);
    assert_eq!(page.rows[0].fields["plate"], "AB-101");

    let queries = state.queries.lock().await;
    let query = &queries[0];
    assert_eq!(query.get("search").map(String::as_str), Some("golf"));
    assert_eq!(query.get("filter[status]").map(String::as_str), Some("confirmed"));
    assert_eq!(query.get("page").map(String::as_str), Some("2"));
    assert_eq!(query.get("per_page").map(String::as_str), Some("10"));
}

#[tokio::test]
async fn bulk_apply_posts_all_except_directive() {
    let (base_url, _state, bulk_rx) = spawn_admin_server().await.expect("spawn server");
    let api = HttpListApi::new(base_url, "bookings");

    let signature = FilterSignature::compute("golf", &Default::default());
    let request = BulkRequest {
        action: BulkAction::Delete,
        directive: Directive::AllExcept {
            filter_signature: signature.clone(),
            excluded_ids: [RowId::Int(7)].into_iter().collect(),
        },
        filter_signature: signature,
    };

    let outcome = api.bulk_apply(&request).await.expect("bulk");
    assert_eq!(outcome.affected, 41);
    assert_eq!(bulk_rx.await.expect("payload"), request);
}

#[tokio::test]
async fn bulk_apply_surfaces_backend_error_code() {
    let (base_url, _state, _bulk_rx) = spawn_admin_server().await.expect("spawn server");
    let api = HttpListApi::new(base_url, "brands");

    let request = BulkRequest {
        action: BulkAction::Delete,
        directive: Directive::Explicit {
            ids: [RowId::Int(3)].into_iter().collect(),
        },
        filter_signature: FilterSignature::default(),
    };

    let err = api.bulk_apply(&request).await.expect_err("must fail");
    let api_err = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(api_err.code, ErrorCode::Conflict);

    let classified = SessionError::from_anyhow(ErrorContext::BulkAction, &err);
    assert_eq!(classified.category(), ErrorCategory::Validation);
    assert!(classified.message().contains("409"));
}

#[tokio::test]
async fn non_json_error_body_is_kept_in_message() {
    let (base_url, _state, _bulk_rx) = spawn_admin_server().await.expect("spawn server");
    let api = HttpListApi::new(base_url, "locations");

    let err = api
        .fetch_page(&QueryParams::default())
        .await
        .expect_err("must fail");
    let err_text = format!("{err:#}");
    assert!(err_text.contains("502"), "unexpected error: {err_text}");
    assert!(err_text.contains("upstream exploded"), "unexpected error: {err_text}");
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let api = HttpListApi::new(format!("http://{addr}"), "users");
    let err = api
        .fetch_page(&QueryParams::default())
        .await
        .expect_err("must fail");

    let classified = SessionError::from_anyhow(ErrorContext::FetchPage, &err);
    assert_eq!(classified.category(), ErrorCategory::Transport);
    assert!(classified.message().contains("failed to fetch users page 1"));
}
