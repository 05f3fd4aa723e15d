use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{PathRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use futures::TryStreamExt;
use std::io;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::error::{AppError, Result};
use crate::models::{Document, DocumentListResponse, ListParams, ListQuery, UploadResponse};
use crate::services::{DocumentService, StagedUpload};
use crate::AppState;

const FILES_FIELD: &str = "files";
const TITLE_FIELD: &str = "title";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

fn multipart_error(e: MultipartError) -> AppError {
    AppError::validation(
        "invalid_multipart",
        format!("Failed to process multipart: {}", e.body_text()),
    )
}

/// Upload one or more documents
/// POST /api/documents
pub async fn upload_documents(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let multipart = multipart
        .map_err(|e| AppError::validation("invalid_multipart", e.body_text()))?;

    let mut staged = Vec::new();
    let title = match read_upload_form(&state, multipart, &mut staged).await {
        Ok(title) => title,
        Err(e) => {
            DocumentService::discard_staged(state.storage.as_ref(), staged).await;
            return Err(e);
        }
    };

    if staged.is_empty() {
        return Err(AppError::validation(
            "no_files",
            "Please select at least one file to upload",
        ));
    }

    let documents = DocumentService::commit_uploads(
        &state.db,
        state.storage.as_ref(),
        title.as_deref(),
        staged,
    )
    .await?;
    tracing::info!("Stored {} uploaded document(s)", documents.len());

    Ok((StatusCode::CREATED, Json(UploadResponse::new(documents))))
}

/// Stream every file part into the blob store and return the title override.
/// Blobs written so far are left in `staged` for the caller to commit or discard.
async fn read_upload_form(
    state: &AppState,
    mut multipart: Multipart,
    staged: &mut Vec<StagedUpload>,
) -> Result<Option<String>> {
    let limits = &state.config.upload;
    let mut title: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            FILES_FIELD => {
                let original_name = field
                    .file_name()
                    .map(DocumentService::clean_original_name)
                    .unwrap_or_default();
                // Browsers send a nameless empty part when no file was picked
                if original_name.is_empty() {
                    continue;
                }

                if staged.len() >= limits.max_files {
                    return Err(AppError::validation(
                        "too_many_files",
                        format!("Cannot upload more than {} files at once", limits.max_files),
                    ));
                }

                let content_type = Some(
                    field
                        .content_type()
                        .unwrap_or(DEFAULT_CONTENT_TYPE)
                        .to_string(),
                );
                let mut reader = StreamReader::new(field.map_err(|e| io::Error::other(e.to_string())));

                let upload = DocumentService::stage_upload(
                    state.storage.as_ref(),
                    &original_name,
                    content_type,
                    &mut reader,
                    limits.max_file_size,
                )
                .await?;
                staged.push(upload);
            }
            TITLE_FIELD => {
                title = Some(field.text().await.map_err(multipart_error)?);
            }
            _ if field.file_name().is_some() => {
                return Err(AppError::validation(
                    "unexpected_field",
                    format!("Unexpected file field {:?} in request", name),
                ));
            }
            _ => {}
        }
    }

    Ok(title)
}

/// List documents with pagination, sorting and search
/// GET /api/documents?page=1&pageSize=10&sortOrder=desc&q=report
pub async fn list_documents(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<DocumentListResponse>> {
    let Query(query) =
        query.map_err(|e| AppError::validation("invalid_query", e.body_text()))?;
    let params = ListParams::parse(&query)?;
    let documents = DocumentService::list_documents(&state.db, &params).await?;
    Ok(Json(documents))
}

fn content_disposition(doc: &Document) -> String {
    let name = doc.display_name();
    // Plain filename must stay visible ASCII; filename* carries the exact name
    let fallback_name: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    let encoded_name = urlencoding::encode(name);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_name, encoded_name
    )
}

fn content_type(doc: &Document) -> HeaderValue {
    doc.mimetype
        .as_deref()
        .and_then(|m| HeaderValue::from_str(m).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE))
}

/// Download a document
/// GET /api/documents/:id/download
pub async fn download_document(
    State(state): State<AppState>,
    id: std::result::Result<Path<String>, PathRejection>,
) -> Result<Response> {
    let Path(id) = id.map_err(|e| {
        tracing::debug!("Undecodable document id: {}", e.body_text());
        AppError::NotFound("No document exists with the requested ID".to_string())
    })?;
    let (doc, reader) =
        DocumentService::open_document(&state.db, state.storage.as_ref(), &id).await?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type(&doc))
        .header(header::CONTENT_LENGTH, doc.filesize)
        .header(header::CONTENT_DISPOSITION, content_disposition(&doc))
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}
