pub mod submission;

pub use submission::{SubmissionFields, SubmissionForm};
