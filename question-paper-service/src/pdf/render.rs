use crate::pdf::layout::{fit_within, CellSlot, GridSpec, PageGeometry, Rect};
use crate::pdf::text::{encode_win_ansi, text_width, wrap, Face};
use flate2::{write::ZlibEncoder, Compression};
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use metrics::counter;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest side, in pixels, an image is embedded at. A grid cell is a few
/// inches wide, so anything larger only inflates the document.
const MAX_EMBED_DIMENSION: u32 = 2400;

const TITLE_SIZE: f32 = 18.0;
const TITLE_LEADING: f32 = 22.0;
const SCHOOL_SIZE: f32 = 12.0;
const SCHOOL_LEADING: f32 = 16.0;
const DESCRIPTION_SIZE: f32 = 10.0;
const DESCRIPTION_LEADING: f32 = 13.0;
const FOOTER_SIZE: f32 = 9.0;
const FOOTER_HEIGHT: f32 = 18.0;
const HEADER_SPACING: f32 = 12.0;
/// The rule under the header never sits lower than this share of the page.
const MAX_HEADER_SHARE: f32 = 0.35;
const ELLIPSIS: char = '\u{2026}';

/// Everything needed to lay out one question paper.
#[derive(Debug, Clone)]
pub struct QuestionPaper {
    pub title: String,
    pub school_name: Option<String>,
    pub description: Option<String>,
    pub images: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct RenderedPaper {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub skipped_images: usize,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("a question paper needs at least one image")]
    NoImages,

    #[error("failed to encode page content: {0}")]
    Content(#[source] lopdf::Error),

    #[error("failed to serialize PDF: {0}")]
    Write(String),
}

#[derive(Debug, Error)]
enum ImageLoadError {
    #[error("failed to read image: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to compress image: {0}")]
    Compress(std::io::Error),
}

struct EmbeddedImage {
    stream: Stream,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Align {
    Left,
    Center,
}

#[derive(Debug, Clone, PartialEq)]
struct TextLine {
    text: String,
    face: Face,
    size: f32,
    align: Align,
    /// Baseline, measured from the top of the page.
    baseline: f32,
}

/// The header repeated at the top of every page.
#[derive(Debug, Clone)]
struct TitleBlock {
    lines: Vec<TextLine>,
    /// Y of the rule under the header, from the top of the page.
    rule_y: f32,
}

impl TitleBlock {
    /// Title and school name are set as single paragraphs; the description
    /// keeps its line breaks. Lines that would push the rule past
    /// [`MAX_HEADER_SHARE`] of the page are dropped and the last kept line
    /// ends in an ellipsis.
    fn compose(paper: &QuestionPaper, page: &PageGeometry) -> Self {
        let max_width = page.content_width();
        let cursor_limit = page.height * MAX_HEADER_SHARE - HEADER_SPACING / 2.0;

        let mut candidates: Vec<(String, Face, f32, f32, Align)> = Vec::new();
        for line in wrap(&single_line(&paper.title), Face::Bold, TITLE_SIZE, max_width) {
            candidates.push((line, Face::Bold, TITLE_SIZE, TITLE_LEADING, Align::Center));
        }
        if let Some(school) = &paper.school_name {
            for line in wrap(&single_line(school), Face::Regular, SCHOOL_SIZE, max_width) {
                candidates.push((line, Face::Regular, SCHOOL_SIZE, SCHOOL_LEADING, Align::Center));
            }
        }
        if let Some(description) = &paper.description {
            for line in wrap(description, Face::Regular, DESCRIPTION_SIZE, max_width) {
                candidates.push((
                    line,
                    Face::Regular,
                    DESCRIPTION_SIZE,
                    DESCRIPTION_LEADING,
                    Align::Left,
                ));
            }
        }

        let mut lines: Vec<TextLine> = Vec::new();
        let mut cursor = page.margin;
        let mut truncated = false;

        for (text, face, size, leading, align) in candidates {
            if !lines.is_empty() && cursor + leading > cursor_limit {
                truncated = true;
                break;
            }
            lines.push(TextLine {
                text,
                face,
                size,
                align,
                baseline: cursor + size * 0.8,
            });
            cursor += leading;
        }

        if truncated {
            if let Some(last) = lines.last_mut() {
                last.text = with_ellipsis(&last.text, last.face, last.size, max_width);
            }
        }

        Self {
            lines,
            rule_y: cursor + HEADER_SPACING / 2.0,
        }
    }

    fn grid_top(&self) -> f32 {
        self.rule_y + HEADER_SPACING
    }
}

/// Operations and resources for the page currently being filled.
struct PageBuilder {
    operations: Vec<Operation>,
    xobjects: Dictionary,
}

/// Lays question images out on a fixed grid and writes the PDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaperRenderer {
    grid: GridSpec,
    page: PageGeometry,
}

impl PaperRenderer {
    pub fn new(grid: GridSpec, page: PageGeometry) -> Self {
        Self { grid, page }
    }

    pub fn render(&self, paper: &QuestionPaper) -> Result<RenderedPaper, RenderError> {
        if paper.images.is_empty() {
            return Err(RenderError::NoImages);
        }

        let total_pages = self.grid.page_count(paper.images.len());
        let title_block = TitleBlock::compose(paper, &self.page);
        let grid_top = title_block.grid_top();
        let grid_bottom = self.page.height - self.page.margin - FOOTER_HEIGHT;

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let fonts = self.register_fonts(&mut doc);

        let mut page_ids: Vec<ObjectId> = Vec::with_capacity(total_pages);
        let mut current: Option<PageBuilder> = None;
        let mut skipped = 0;

        for (index, path) in paper.images.iter().enumerate() {
            let slot = self.grid.slot(index);

            if slot.starts_page() {
                if let Some(finished) = current.take() {
                    page_ids.push(self.finish_page(&mut doc, finished, pages_id, &fonts)?);
                }
                current = Some(self.begin_page(
                    &title_block,
                    slot,
                    total_pages,
                    grid_top,
                    grid_bottom,
                ));
            }

            let Some(builder) = current.as_mut() else {
                continue;
            };

            let image = match load_image(path) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(
                        index = index,
                        path = %path.display(),
                        error = %e,
                        "Skipping question image that could not be loaded"
                    );
                    counter!("question_paper_images_skipped_total").increment(1);
                    skipped += 1;
                    continue;
                }
            };

            let cell = self
                .page
                .cell_rect(&self.grid, grid_top, grid_bottom, slot.column, slot.row);
            let placed = fit_within(image.width, image.height, cell);

            let image_id = doc.add_object(image.stream);
            let name = format!("Im{}", index);
            builder
                .xobjects
                .set(name.as_bytes().to_vec(), Object::Reference(image_id));
            self.draw_image(&mut builder.operations, &name, placed);
        }

        if let Some(finished) = current.take() {
            page_ids.push(self.finish_page(&mut doc, finished, pages_id, &fonts)?);
        }

        let page_count = page_ids.len();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => page_count as i64,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let info_id = doc.add_object(dictionary! {
            "Title" => Object::String(encode_win_ansi(&paper.title), StringFormat::Literal),
            "Producer" => Object::string_literal(crate::config::SERVICE_NAME),
        });
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| RenderError::Write(e.to_string()))?;

        Ok(RenderedPaper {
            bytes,
            page_count,
            skipped_images: skipped,
        })
    }

    fn register_fonts(&self, doc: &mut Document) -> Dictionary {
        let mut fonts = Dictionary::new();
        for face in [Face::Regular, Face::Bold] {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => face.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(face.resource_name(), font_id);
        }
        fonts
    }

    fn begin_page(
        &self,
        title_block: &TitleBlock,
        slot: CellSlot,
        total_pages: usize,
        grid_top: f32,
        grid_bottom: f32,
    ) -> PageBuilder {
        let mut operations = Vec::new();

        for line in &title_block.lines {
            let x = match line.align {
                Align::Left => self.page.margin,
                Align::Center => {
                    (self.page.width - text_width(&line.text, line.face, line.size)) / 2.0
                }
            };
            self.draw_text(&mut operations, &line.text, line.face, line.size, x, line.baseline);
        }

        self.draw_line(
            &mut operations,
            (self.page.margin, title_block.rule_y),
            (self.page.width - self.page.margin, title_block.rule_y),
        );

        let divider_x = self.page.divider_x();
        self.draw_line(
            &mut operations,
            (divider_x, grid_top),
            (divider_x, grid_bottom),
        );

        let footer = format!("Page {} of {}", slot.page + 1, total_pages);
        let footer_x = (self.page.width - text_width(&footer, Face::Regular, FOOTER_SIZE)) / 2.0;
        self.draw_text(
            &mut operations,
            &footer,
            Face::Regular,
            FOOTER_SIZE,
            footer_x,
            self.page.height - self.page.margin / 2.0,
        );

        PageBuilder {
            operations,
            xobjects: Dictionary::new(),
        }
    }

    fn finish_page(
        &self,
        doc: &mut Document,
        page: PageBuilder,
        pages_id: ObjectId,
        fonts: &Dictionary,
    ) -> Result<ObjectId, RenderError> {
        let content = Content {
            operations: page.operations,
        };
        let encoded = content.encode().map_err(RenderError::Content)?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let resources = dictionary! {
            "Font" => fonts.clone(),
            "XObject" => page.xobjects,
        };

        Ok(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), self.page.width.into(), self.page.height.into()],
            "Contents" => content_id,
            "Resources" => resources,
        }))
    }

    fn draw_text(
        &self,
        operations: &mut Vec<Operation>,
        text: &str,
        face: Face,
        size: f32,
        x: f32,
        baseline: f32,
    ) {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![face.resource_name().into(), size.into()],
        ));
        operations.push(Operation::new(
            "Td",
            vec![x.into(), (self.page.height - baseline).into()],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        ));
        operations.push(Operation::new("ET", vec![]));
    }

    fn draw_line(&self, operations: &mut Vec<Operation>, from: (f32, f32), to: (f32, f32)) {
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new("w", vec![0.75_f32.into()]));
        operations.push(Operation::new(
            "RG",
            vec![0.55_f32.into(), 0.55_f32.into(), 0.55_f32.into()],
        ));
        operations.push(Operation::new(
            "m",
            vec![from.0.into(), (self.page.height - from.1).into()],
        ));
        operations.push(Operation::new(
            "l",
            vec![to.0.into(), (self.page.height - to.1).into()],
        ));
        operations.push(Operation::new("S", vec![]));
        operations.push(Operation::new("Q", vec![]));
    }

    fn draw_image(&self, operations: &mut Vec<Operation>, name: &str, placed: Rect) {
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "cm",
            vec![
                placed.width.into(),
                0.into(),
                0.into(),
                placed.height.into(),
                placed.x.into(),
                (self.page.height - placed.bottom()).into(),
            ],
        ));
        operations.push(Operation::new("Do", vec![name.into()]));
        operations.push(Operation::new("Q", vec![]));
    }
}

fn load_image(path: &Path) -> Result<EmbeddedImage, ImageLoadError> {
    let bytes = std::fs::read(path)?;
    let mut decoded = image::load_from_memory(&bytes)?;

    if decoded.width().max(decoded.height()) > MAX_EMBED_DIMENSION {
        decoded = decoded.thumbnail(MAX_EMBED_DIMENSION, MAX_EMBED_DIMENSION);
    }

    let (width, height, pixels) = flatten_onto_white(&decoded);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&pixels).map_err(ImageLoadError::Compress)?;
    let compressed = encoder.finish().map_err(ImageLoadError::Compress)?;

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    Ok(EmbeddedImage {
        stream: Stream::new(dict, compressed),
        width,
        height,
    })
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn with_ellipsis(text: &str, face: Face, size: f32, max_width: f32) -> String {
    let mut kept = text.trim_end().to_string();
    while !kept.is_empty() && text_width(&format!("{}{}", kept, ELLIPSIS), face, size) > max_width
    {
        kept.pop();
    }
    format!("{}{}", kept.trim_end(), ELLIPSIS)
}

/// RGB bytes with any transparency composited over a white page.
fn flatten_onto_white(image: &DynamicImage) -> (u32, u32, Vec<u8>) {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u16;
        for channel in [r, g, b] {
            let blended = (channel as u16 * alpha + 255 * (255 - alpha)) / 255;
            rgb.push(blended as u8);
        }
    }

    (width, height, rgb)
}
