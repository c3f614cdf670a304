use crate::dtos::submission::{
    DESCRIPTION_FIELD, IMAGES_FIELD, MAX_DESCRIPTION_CHARS, MAX_SCHOOL_NAME_CHARS,
    MAX_TITLE_CHARS, SCHOOL_NAME_FIELD, TITLE_FIELD,
};
use crate::startup::AppState;
use askama::Template;
use axum::{extract::State, response::IntoResponse};

#[derive(Template)]
#[template(path = "index.html")]
pub struct UploadFormTemplate {
    pub title_field: &'static str,
    pub school_name_field: &'static str,
    pub description_field: &'static str,
    pub images_field: &'static str,
    pub max_title: usize,
    pub max_school_name: usize,
    pub max_description: usize,
    pub max_files: usize,
    pub max_file_mb: usize,
}

pub async fn upload_form(State(state): State<AppState>) -> impl IntoResponse {
    let uploads = &state.config.uploads;

    UploadFormTemplate {
        title_field: TITLE_FIELD,
        school_name_field: SCHOOL_NAME_FIELD,
        description_field: DESCRIPTION_FIELD,
        images_field: IMAGES_FIELD,
        max_title: MAX_TITLE_CHARS,
        max_school_name: MAX_SCHOOL_NAME_CHARS,
        max_description: MAX_DESCRIPTION_CHARS,
        max_files: uploads.max_files,
        max_file_mb: uploads.max_file_bytes.div_ceil(1024 * 1024),
    }
}
