use crate::config::UploadConfig;
use crate::dtos::submission::{IMAGES_FIELD, MAX_TEXT_FIELD_BYTES};
use crate::dtos::{SubmissionFields, SubmissionForm};
use crate::pdf::{QuestionPaper, RenderError};
use crate::services::{record_paper_generated, UploadBatch};
use crate::startup::AppState;
use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use validator::Validate;

const MAX_SLUG_CHARS: usize = 60;
const FALLBACK_SLUG: &str = "question-paper";

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::NoImages => AppError::BadRequest(anyhow::Error::new(err)),
            other => AppError::InternalError(
                anyhow::Error::new(other).context("PDF generation failed"),
            ),
        }
    }
}

/// `POST /generate`: multipart form in, PDF out.
///
/// Uploaded files are deleted before the response is returned, on success
/// and on every error path.
pub async fn generate_paper(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let multipart = multipart.map_err(|rejection| {
        AppError::BadRequest(anyhow::anyhow!(
            "Expected a multipart/form-data body: {}",
            rejection.body_text()
        ))
    })?;

    let mut batch = state.uploads.begin();
    let outcome = generate(&state, multipart, &mut batch).await;
    batch.cleanup().await;

    if let Err(e) = &outcome {
        tracing::info!(status = %e.status(), error = %e, "Question paper request rejected");
    }
    outcome
}

async fn generate(
    state: &AppState,
    multipart: Multipart,
    batch: &mut UploadBatch,
) -> Result<Response, AppError> {
    let form = read_submission(multipart, batch, &state.config.uploads).await?;
    form.validate()?;

    if batch.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "At least one question image is required in '{}'",
            IMAGES_FIELD
        )));
    }

    tracing::info!(
        batch_id = %batch.id(),
        title = %form.title,
        images = batch.len(),
        "Generating question paper"
    );

    let paper = QuestionPaper {
        title: form.title.clone(),
        school_name: form.school_name.clone(),
        description: form.description.clone(),
        images: batch.paths(),
    };

    let renderer = state.renderer;
    let started = Instant::now();
    let rendered = tokio::task::spawn_blocking(move || renderer.render(&paper))
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("PDF render task failed: {}", e)))??;
    let elapsed = started.elapsed();

    record_paper_generated(rendered.page_count, batch.len(), elapsed);
    tracing::info!(
        batch_id = %batch.id(),
        pages = rendered.page_count,
        skipped_images = rendered.skipped_images,
        bytes = rendered.bytes.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Question paper generated"
    );

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download_filename(&form.title, Utc::now())
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        rendered.bytes,
    )
        .into_response())
}

/// Drain the multipart body: text fields into a [`SubmissionForm`], image
/// files into `batch`.
async fn read_submission(
    mut multipart: Multipart,
    batch: &mut UploadBatch,
    limits: &UploadConfig,
) -> Result<SubmissionForm, AppError> {
    let mut fields = SubmissionFields::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        let Some(original_name) = field.file_name().map(str::to_string) else {
            let value = read_text(field, &name).await?;
            if !fields.set(&name, value) {
                tracing::debug!(field = %name, "Ignoring unknown form field");
            }
            continue;
        };

        if name != IMAGES_FIELD {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Unexpected file field '{}'; images must be sent as '{}'",
                name,
                IMAGES_FIELD
            )));
        }

        // Browsers send an empty, nameless part when no file was chosen
        if original_name.is_empty() {
            continue;
        }

        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        if !mime_type.starts_with("image/") {
            return Err(AppError::UnsupportedMediaType(anyhow::anyhow!(
                "'{}' is not an image ({}); only image files are accepted",
                original_name,
                mime_type
            )));
        }

        if batch.len() >= limits.max_files {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Too many images: at most {} are allowed",
                limits.max_files
            )));
        }

        let (index, mut file) = batch.create_file(&original_name, &mime_type).await?;
        let mut size = 0usize;

        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            size += chunk.len();
            if size > limits.max_file_bytes {
                return Err(AppError::PayloadTooLarge(anyhow::anyhow!(
                    "'{}' is larger than the {} byte limit per image",
                    original_name,
                    limits.max_file_bytes
                )));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        batch.record_size(index, size as u64);

        tracing::debug!(
            batch_id = %batch.id(),
            index = index,
            file_name = %original_name,
            mime_type = %mime_type,
            size = size,
            "Stored question image"
        );
    }

    Ok(SubmissionForm::from(fields))
}

/// Buffer a text part, refusing anything longer than [`MAX_TEXT_FIELD_BYTES`].
async fn read_text(mut field: Field<'_>, name: &str) -> Result<String, AppError> {
    let mut bytes = Vec::new();

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Form field '{}' is longer than {} bytes",
                name,
                MAX_TEXT_FIELD_BYTES
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| {
        AppError::BadRequest(anyhow::anyhow!("Form field '{}' is not valid UTF-8", name))
    })
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(anyhow::anyhow!("Request body is too large"))
    } else {
        AppError::BadRequest(anyhow::anyhow!(
            "Failed to read multipart form: {}",
            err.body_text()
        ))
    }
}

/// `<title-slug>-<YYYYMMDD-HHMMSS>.pdf`, ASCII only so it survives the
/// quoted `Content-Disposition` parameter.
pub fn download_filename(title: &str, now: DateTime<Utc>) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if slug.len() >= MAX_SLUG_CHARS {
            break;
        }
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { FALLBACK_SLUG } else { slug };

    format!("{}-{}.pdf", slug, now.format("%Y%m%d-%H%M%S"))
}
