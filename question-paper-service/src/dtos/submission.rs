use validator::Validate;

pub const TITLE_FIELD: &str = "testTitle";
pub const SCHOOL_NAME_FIELD: &str = "schoolName";
pub const DESCRIPTION_FIELD: &str = "description";
pub const IMAGES_FIELD: &str = "questionImages";

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_SCHOOL_NAME_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Most bytes buffered for any one text part: the longest field at four
/// UTF-8 bytes per character.
pub const MAX_TEXT_FIELD_BYTES: usize = 4 * MAX_DESCRIPTION_CHARS;

/// Text fields as they arrive in the multipart body.
#[derive(Debug, Default, Clone)]
pub struct SubmissionFields {
    pub title: Option<String>,
    pub school_name: Option<String>,
    pub description: Option<String>,
}

impl SubmissionFields {
    /// Store a text field by its form name. Returns false for names this
    /// form does not know.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            TITLE_FIELD => &mut self.title,
            SCHOOL_NAME_FIELD => &mut self.school_name,
            DESCRIPTION_FIELD => &mut self.description,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// Trimmed, validated test metadata.
#[derive(Debug, Clone, Validate)]
pub struct SubmissionForm {
    #[validate(length(min = 1, max = (MAX_TITLE_CHARS as u64), message = "Test title is required and must be at most 100 characters"))]
    pub title: String,

    #[validate(length(max = (MAX_SCHOOL_NAME_CHARS as u64), message = "School name must be at most 100 characters"))]
    pub school_name: Option<String>,

    #[validate(length(max = (MAX_DESCRIPTION_CHARS as u64), message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
}

impl From<SubmissionFields> for SubmissionForm {
    fn from(fields: SubmissionFields) -> Self {
        Self {
            title: fields
                .title
                .map(|t| t.trim().to_string())
                .unwrap_or_default(),
            school_name: non_blank(fields.school_name),
            description: non_blank(fields.description),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
