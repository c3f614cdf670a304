#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{Document, ObjectId};
use question_paper_service::config::PaperConfig;
use question_paper_service::startup::Application;
use reqwest::multipart::{Form, Part};
use std::io::Cursor;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub client: reqwest::Client,
    _scratch: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn on a random port with a private upload directory; `configure`
    /// may tighten limits before the app is built.
    pub async fn spawn_with(configure: impl FnOnce(&mut PaperConfig)) -> Self {
        let scratch = TempDir::new().expect("Failed to create scratch directory");
        let upload_dir = scratch.path().join("uploads");

        let mut config = PaperConfig::load().expect("Failed to load configuration");
        config.common.port = 0; // Random port for testing
        config.uploads.dir = upload_dir.to_string_lossy().to_string();
        configure(&mut config);

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            upload_dir,
            client,
            _scratch: scratch,
        }
    }

    pub async fn generate(&self, form: Form) -> reqwest::Response {
        self.client
            .post(format!("{}/generate", self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Files currently sitting in the upload directory.
    pub fn uploaded_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.upload_dir)
            .expect("Upload directory missing")
            .map(|entry| entry.expect("Unreadable directory entry").path())
            .collect()
    }
}

pub fn png_bytes(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
        width,
        height,
        Rgb([shade, 128, 255 - shade]),
    ));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("Failed to encode PNG");
    buf
}

pub fn image_part(name: &str, data: Vec<u8>, mime: &str) -> Part {
    Part::bytes(data)
        .file_name(name.to_string())
        .mime_str(mime)
        .expect("Invalid MIME type")
}

/// A submission form with `count` small PNG question images.
pub fn paper_form(title: &str, count: usize) -> Form {
    let mut form = Form::new()
        .text("testTitle", title.to_string())
        .text("schoolName", "Springfield Elementary")
        .text("description", "Answer all questions.");
    for i in 0..count {
        form = form.part(
            "questionImages",
            image_part(
                &format!("q{}.png", i + 1),
                png_bytes(40, 24, (i * 4) as u8),
                "image/png",
            ),
        );
    }
    form
}

pub fn xobject_names(doc: &Document, page_id: ObjectId) -> Vec<String> {
    let page = doc.get_dictionary(page_id).expect("Page dictionary missing");
    let resources = page
        .get(b"Resources")
        .and_then(|r| r.as_dict())
        .expect("Page resources missing");
    let mut names: Vec<String> = resources
        .get(b"XObject")
        .and_then(|x| x.as_dict())
        .map(|x| {
            x.iter()
                .map(|(k, _)| String::from_utf8_lossy(k).to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
