// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// POST /api/tools/{tool}
//
// Multipart form: every part named `file` is an input, in order of
// appearance; any other part is read as a text parameter.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use blattwerk_pipeline::archive::StreamOutcome;
use blattwerk_pipeline::{DispatchRequest, DispatchResponse, IncomingFile, ResponseBody};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Form field carrying input files.
pub const FILE_FIELD: &str = "file";

/// Response header reporting how the request was handled.
pub const OUTCOME_HEADER: &str = "x-blattwerk-outcome";

/// Name used for file parts that arrive without one.
const UNNAMED_UPLOAD: &str = "upload";

pub async fn run_tool(
    State(state): State<AppState>,
    Path(tool): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let (files, params) = read_form(multipart).await?;
    debug!(%tool, files = files.len(), params = params.len(), "form received");

    let request = DispatchRequest {
        operation: tool,
        files,
        params,
        authenticated: state.sessions.is_authenticated(&headers),
    };
    let response = state.dispatcher.dispatch(request).await?;
    Ok(into_http(response))
}

async fn read_form(
    mut multipart: Multipart,
) -> Result<(Vec<IncomingFile>, HashMap<String, String>), ApiError> {
    let mut files = Vec::new();
    let mut params = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::malformed_form)?
    {
        let field_name = field.name().unwrap_or("").to_string();

        if field_name == FILE_FIELD {
            let name = field.file_name().unwrap_or(UNNAMED_UPLOAD).to_string();
            let declared_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(ApiError::malformed_form)?;
            files.push(IncomingFile {
                name,
                declared_type,
                bytes: bytes.to_vec(),
            });
        } else if !field_name.is_empty() {
            let value = field.text().await.map_err(ApiError::malformed_form)?;
            params.insert(field_name, value);
        }
    }

    Ok((files, params))
}

fn into_http(response: DispatchResponse) -> Response {
    let headers = [
        (header::CONTENT_TYPE, response.media_type),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", response.file_name),
        ),
        (
            header::HeaderName::from_static(OUTCOME_HEADER),
            response.outcome.as_str().to_string(),
        ),
    ];

    match response.body {
        ResponseBody::Bytes(bytes) => (StatusCode::OK, headers, bytes).into_response(),
        ResponseBody::Archive(stream) => {
            watch_archive(response.job_id.to_string(), stream.completion);
            (StatusCode::OK, headers, Body::from_stream(stream.body)).into_response()
        }
    }
}

/// Log how a streamed archive ended once the producer reports back.
fn watch_archive(job: String, completion: oneshot::Receiver<StreamOutcome>) {
    tokio::spawn(async move {
        match completion.await {
            Ok(StreamOutcome::Completed { entries }) => {
                info!(%job, entries, "archive delivered");
            }
            Ok(StreamOutcome::Aborted(reason)) => {
                warn!(%job, %reason, "archive aborted");
            }
            Err(_) => warn!(%job, "archive producer ended without reporting"),
        }
    });
}
