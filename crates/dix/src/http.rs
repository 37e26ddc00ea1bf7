//! 🌐 HTTP front desk: uploads in, reports out.
//!
//! ## Routes
//!
//! - `POST /import/:partition`: multipart body, one part per file. The part's file name
//!   (falling back to the field name) decides which entity it is. Answers with the
//!   [`ImportReport`](crate::report::ImportReport) as JSON and a status derived from it:
//!   200 succeeded, 207 partial, 422 your files, 500 our side, 409 partition busy.
//! - `GET /health`: `{ "ok": true }`.
//!
//! A partition that isn't a supported state code is a 400 before anything is read.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, warn};

use crate::common::StateCode;
use crate::orchestrator::{ImportRequest, Importer};
use crate::sources::UploadedFile;
use crate::stores::RecordStore;

/// 📦 State feeds are big. Not unbounded, but big.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// 🧭 The router, ready to nest or serve.
pub fn router<S>(importer: Arc<Importer<S>>) -> Router
where
    S: RecordStore + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/import/:partition", post(import_handler::<S>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(importer)
}

/// 🚀 Bind and serve until the process is told to stop.
pub async fn serve<S>(importer: Arc<Importer<S>>, addr: &str) -> anyhow::Result<()>
where
    S: RecordStore + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("💀 could not bind {addr}. Is something else already listening?"))?;
    info!(addr = %addr, "🌐 dix is listening");
    axum::serve(listener, router(importer))
        .await
        .context("💀 the HTTP server stopped unexpectedly")
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

fn bad_request(message: String) -> Response {
    warn!("🚫 {message}");
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

async fn import_handler<S>(
    State(importer): State<Arc<Importer<S>>>,
    Path(partition): Path<String>,
    mut multipart: Multipart,
) -> Response
where
    S: RecordStore + 'static,
{
    let partition = match partition.parse::<StateCode>() {
        Ok(partition) => partition,
        Err(message) => return bad_request(message),
    };

    let mut files = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return bad_request(format!("malformed multipart body: {err}")),
        };
        let file_name = field
            .file_name()
            .or_else(|| field.name())
            .unwrap_or_default()
            .to_string();
        match field.bytes().await {
            Ok(bytes) => files.push(UploadedFile::new(file_name, bytes.to_vec())),
            Err(err) => return bad_request(format!("could not read part '{file_name}': {err}")),
        }
    }

    let report = importer.run_import(ImportRequest { partition, files }).await;
    let status =
        StatusCode::from_u16(report.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(report)).into_response()
}
