pub mod form;
pub mod generate;
pub mod health;

pub use form::upload_form;
pub use generate::generate_paper;
pub use health::{health_check, metrics_endpoint};

use axum::http::Uri;
use service_core::error::AppError;

pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(anyhow::anyhow!("No route for {}", uri.path()))
}
