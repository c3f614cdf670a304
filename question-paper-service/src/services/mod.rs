pub mod metrics;
pub mod uploads;

pub use self::metrics::{get_metrics, init_metrics, record_paper_generated};
pub use uploads::{StoredImage, UploadBatch, UploadStore};
