//! Distutils action endpoint.
//!
//! `setup.py register`, `setup.py upload` and compatible tools POST form
//! data to the index root with an `:action` field. The same paths accept
//! XML-RPC query calls when the body is `text/xml`.
//!
//! # Routes
//! - `POST /` and `POST /pypi`
//! - `GET /` and `GET /pypi` (`?:action=list_classifiers`)

use std::collections::HashMap;

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use pkgindex_core::{classifiers, FormFields, UploadRequest, UploadedFile};
use tracing::{debug, info, warn};

use crate::auth::authenticate;
use crate::error::{AppError, AppResult};
use crate::rpc::{self, codec, Fault, RpcResponse, PARSE_ERROR};
use crate::state::AppState;
use crate::validate_filename;

const ACTION_FIELD: &str = ":action";
const CONTENT_FIELD: &str = "content";

/// How the request body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Multipart,
    UrlEncoded,
    Xml,
    Other,
}

impl BodyKind {
    fn of(headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let mime = content_type.split(';').next().unwrap_or("").trim();

        match mime {
            "multipart/form-data" => BodyKind::Multipart,
            "application/x-www-form-urlencoded" => BodyKind::UrlEncoded,
            "text/xml" => BodyKind::Xml,
            _ => BodyKind::Other,
        }
    }
}

/// Decoded distutils form.
struct ActionForm {
    fields: FormFields,
    content: Option<UploadedFile>,
}

/// `GET /`: classifier listing when asked for, otherwise a banner.
pub async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Response> {
    match params.get(ACTION_FIELD).map(String::as_str) {
        Some("list_classifiers") => list_classifiers(&state).await,
        Some("submit") | Some("file_upload") => {
            let form = ActionForm {
                fields: params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
                content: None,
            };
            register_or_upload(&state, &headers, "GET".to_string(), false, form).await
        }
        Some(other) => Err(unsupported(other)),
        None => Ok((
            StatusCode::OK,
            format!(
                "pkgindex {}: distutils-compatible package index\n",
                env!("CARGO_PKG_VERSION")
            ),
        )
            .into_response()),
    }
}

/// `POST /`: distutils actions and XML-RPC queries.
pub async fn action(State(state): State<AppState>, request: Request) -> AppResult<Response> {
    let headers = request.headers().clone();
    let method = request.method().to_string();
    let kind = BodyKind::of(&headers);
    debug!(?kind, "Received POST");

    if kind == BodyKind::Xml {
        return xmlrpc(&state, &headers, request).await;
    }

    let form = match kind {
        BodyKind::Multipart => read_multipart(&state, request).await?,
        BodyKind::UrlEncoded => read_urlencoded(&state, request).await?,
        _ => ActionForm {
            fields: FormFields::new(),
            content: None,
        },
    };

    let action = form.fields.get(ACTION_FIELD).map(str::to_string);
    match action.as_deref() {
        Some("list_classifiers") => list_classifiers(&state).await,
        Some("submit") | Some("file_upload") => {
            register_or_upload(&state, &headers, method, true, form).await
        }
        // Undecodable bodies still go through the pipeline so the caller
        // gets its request-shape error.
        None if kind == BodyKind::Other => {
            register_or_upload(&state, &headers, method, false, form).await
        }
        None => Err(AppError::BadRequest("No action specified".to_string())),
        Some(other) => Err(unsupported(other)),
    }
}

fn unsupported(action: &str) -> AppError {
    warn!(action = %action, "Unsupported distutils action");
    AppError::BadRequest(format!("Unsupported action: {action}"))
}

async fn register_or_upload(
    state: &AppState,
    headers: &HeaderMap,
    method: String,
    form_encoded: bool,
    form: ActionForm,
) -> AppResult<Response> {
    let actor = authenticate(headers, &state.config)?;

    // Name and version become directories of the content store.
    if form.content.is_some() {
        for field in ["name", "version"] {
            if let Some(value) = form.fields.get(field).map(str::trim).filter(|v| !v.is_empty()) {
                validate_filename(value)?;
            }
        }
    }

    let request = UploadRequest {
        method,
        form_encoded,
        actor,
        fields: form.fields,
        content: form.content,
    };

    let outcome = state.pipeline.register_or_upload(&request).await?;
    info!(username = %request.actor.username, outcome = %outcome, "Distutils action completed");

    Ok((StatusCode::OK, outcome.as_str()).into_response())
}

async fn list_classifiers(state: &AppState) -> AppResult<Response> {
    let names = classifiers::list_classifiers(&state.pool).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        names.join("\n"),
    )
        .into_response())
}

async fn read_multipart(state: &AppState, request: Request) -> AppResult<ActionForm> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;

    let mut fields = FormFields::new();
    let mut content = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(str::to_string);

        match file_name {
            None if name == CONTENT_FIELD => {
                warn!("Upload content sent without a filename");
                return Err(AppError::BadRequest(
                    "The content part must carry a filename".to_string(),
                ));
            }
            Some(file_name) if name == CONTENT_FIELD => {
                validate_filename(upload_basename(&file_name))?;
                let data = field.bytes().await?;
                debug!(filename = %file_name, size = data.len(), "Read upload content");
                content = Some(UploadedFile::new(file_name, data.to_vec()));
            }
            // Signatures arrive as file parts but are stored as text.
            Some(_) => {
                let data = field.bytes().await?;
                fields.append(name, String::from_utf8_lossy(&data).into_owned());
            }
            None => {
                let text = field.text().await?;
                fields.append(name, text);
            }
        }
    }

    Ok(ActionForm { fields, content })
}

async fn read_urlencoded(state: &AppState, request: Request) -> AppResult<ActionForm> {
    let body = read_body(state, request.into_body()).await?;
    let fields = url::form_urlencoded::parse(&body)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    Ok(ActionForm {
        fields,
        content: None,
    })
}

async fn read_body(state: &AppState, body: Body) -> AppResult<bytes::Bytes> {
    to_bytes(body, state.config.max_upload_size_bytes())
        .await
        .map_err(|e| AppError::UploadError(format!("Request body too large or unreadable: {e}")))
}

/// Client-side paths are stripped; only the final component is validated.
fn upload_basename(file_name: &str) -> &str {
    file_name.rsplit(['/', '\\']).next().unwrap_or(file_name)
}

async fn xmlrpc(state: &AppState, headers: &HeaderMap, request: Request) -> AppResult<Response> {
    let body = read_body(state, request.into_body()).await?;
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok());
    let download_base = format!("{}/packages", state.base_url(host));

    let response = match std::str::from_utf8(&body) {
        Err(e) => RpcResponse::Fault(Fault::new(PARSE_ERROR, format!("Invalid UTF-8: {e}"))),
        Ok(xml) => match codec::parse_method_call(xml) {
            Err(e) => {
                warn!(error = %e, "Unparseable XML-RPC request");
                RpcResponse::Fault(Fault::new(PARSE_ERROR, e.to_string()))
            }
            Ok(call) => rpc::dispatch(&call, &state.queries, &download_base).await,
        },
    };

    let xml = match &response {
        RpcResponse::Success(value) => codec::render_response(value),
        RpcResponse::Fault(fault) => codec::render_fault(fault),
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        xml,
    )
        .into_response())
}
