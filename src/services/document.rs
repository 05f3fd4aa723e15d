use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    Document, DocumentListResponse, DocumentResponse, ListParams, NewDocument, Pagination,
    UploadedDocument,
};
use crate::storage::{BlobReader, StorageProvider, StoredBlob};

const DOCUMENT_COLUMNS: &str =
    "id, title, filename, original_name, filepath, filesize, mimetype, uploaded_at";

/// A file whose bytes are in the blob store but which has no metadata row yet
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub storage_name: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub blob: StoredBlob,
}

/// Document service
pub struct DocumentService;

impl DocumentService {
    /// Collision-free storage name; keeps a short alphanumeric extension
    pub fn storage_name(original_name: &str) -> String {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.len() <= 16)
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_default();

        format!("{}{}", Uuid::new_v4().simple(), extension)
    }

    /// Strip any client-side directory components from an uploaded file name
    pub fn clean_original_name(name: &str) -> String {
        name.rsplit(['/', '\\']).next().unwrap_or(name).trim().to_string()
    }

    /// Write one uploaded file to the blob store
    pub async fn stage_upload(
        storage: &dyn StorageProvider,
        original_name: &str,
        content_type: Option<String>,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        max_size: u64,
    ) -> Result<StagedUpload> {
        let storage_name = Self::storage_name(original_name);
        let blob = storage.put_reader(&storage_name, reader, max_size).await?;

        Ok(StagedUpload {
            storage_name,
            original_name: original_name.to_string(),
            content_type,
            blob,
        })
    }

    /// Insert one metadata row per staged file, in order.
    ///
    /// Rows are independent: when insert N fails, rows 1..N-1 stay, and the
    /// blobs of N and everything after it are removed before the error returns.
    pub async fn commit_uploads(
        db: &Database,
        storage: &dyn StorageProvider,
        title: Option<&str>,
        staged: Vec<StagedUpload>,
    ) -> Result<Vec<UploadedDocument>> {
        let title = title.map(str::trim).filter(|t| !t.is_empty());
        let mut uploaded = Vec::with_capacity(staged.len());
        let mut pending = staged.into_iter();

        while let Some(upload) = pending.next() {
            let new_doc = NewDocument {
                title: title.unwrap_or(&upload.original_name).to_string(),
                filename: upload.storage_name.clone(),
                original_name: upload.original_name.clone(),
                filepath: upload.blob.path.clone(),
                filesize: i64::try_from(upload.blob.size).unwrap_or(i64::MAX),
                mimetype: upload.content_type.clone(),
            };

            match Self::create(db, new_doc).await {
                Ok(doc) => uploaded.push(UploadedDocument::from(doc)),
                Err(e) => {
                    let rest: Vec<StagedUpload> =
                        std::iter::once(upload).chain(pending).collect();
                    Self::discard_staged(storage, rest).await;
                    return Err(e);
                }
            }
        }

        Ok(uploaded)
    }

    /// Remove blobs that will never get a metadata row
    pub async fn discard_staged(storage: &dyn StorageProvider, staged: Vec<StagedUpload>) {
        for upload in staged {
            if let Err(e) = storage.delete(&upload.blob.path).await {
                tracing::warn!("Failed to remove orphaned blob {}: {}", upload.blob.path, e);
            }
        }
    }

    /// Insert a document stamped with the current time
    pub async fn create(db: &Database, new_doc: NewDocument) -> Result<Document> {
        Self::create_at(db, new_doc, Utc::now()).await
    }

    pub async fn create_at(
        db: &Database,
        new_doc: NewDocument,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Document> {
        let uploaded_at = uploaded_at.to_rfc3339_opts(SecondsFormat::Millis, true);

        let result = sqlx::query(
            r#"
            INSERT INTO documents (title, filename, original_name, filepath, filesize, mimetype, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new_doc.title)
        .bind(&new_doc.filename)
        .bind(&new_doc.original_name)
        .bind(&new_doc.filepath)
        .bind(new_doc.filesize)
        .bind(&new_doc.mimetype)
        .bind(&uploaded_at)
        .execute(db.pool())
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!("Recorded document {} ({})", id, new_doc.filename);

        Self::get_document(db, id).await
    }

    /// Get a document by ID
    pub async fn get_document(db: &Database, id: i64) -> Result<Document> {
        let sql = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
        let doc: Document = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No document exists with ID {}", id)))?;

        Ok(doc)
    }

    /// Look up a document by the raw id from a request path
    pub async fn find_document(db: &Database, raw_id: &str) -> Result<Document> {
        match raw_id.trim().parse::<i64>() {
            Ok(id) => Self::get_document(db, id).await,
            Err(_) => Err(AppError::NotFound(format!(
                "No document exists with ID {}",
                raw_id
            ))),
        }
    }

    /// Resolve a document and open its blob for streaming
    pub async fn open_document(
        db: &Database,
        storage: &dyn StorageProvider,
        raw_id: &str,
    ) -> Result<(Document, BlobReader)> {
        let doc = Self::find_document(db, raw_id).await?;
        let reader = storage.open(&doc.filepath).await.map_err(|e| {
            if let AppError::BlobMissing(_) = e {
                tracing::warn!(
                    "Document {} references missing blob {}",
                    doc.id,
                    doc.filepath
                );
            }
            e
        })?;
        Ok((doc, reader))
    }

    /// Search, sort and paginate documents
    pub async fn list_documents(
        db: &Database,
        params: &ListParams,
    ) -> Result<DocumentListResponse> {
        let search = (!params.query.is_empty()).then_some(params.query.as_str());
        // instr() keeps % and _ literal, unlike LIKE
        let where_clause = if search.is_some() {
            "WHERE instr(LOWER(title), LOWER(?)) > 0"
        } else {
            ""
        };

        let count_sql = format!("SELECT COUNT(*) FROM documents {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(q) = search {
            count_query = count_query.bind(q);
        }
        let total = count_query.fetch_one(db.pool()).await?;

        let direction = params.sort_order.as_sql();
        let list_sql = format!(
            "SELECT {} FROM documents {} ORDER BY uploaded_at {}, id {} LIMIT ? OFFSET ?",
            DOCUMENT_COLUMNS, where_clause, direction, direction
        );
        let mut list_query = sqlx::query_as::<_, Document>(&list_sql);
        if let Some(q) = search {
            list_query = list_query.bind(q);
        }
        let documents = list_query
            .bind(params.page_size)
            .bind(params.offset())
            .fetch_all(db.pool())
            .await?;

        Ok(DocumentListResponse {
            documents: documents.into_iter().map(DocumentResponse::from).collect(),
            pagination: Pagination::new(params.page, params.page_size, total),
        })
    }
}
