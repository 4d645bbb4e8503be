//! Paginated PDF output.
//!
//! A [`PdfReport`] is a list of pages holding text and horizontal rules at
//! fixed positions. Coordinates are points measured from the top-left
//! corner of an A4 page; they are flipped to PDF space only when rendering.

use crate::error::SyncError;
use printpdf::{BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point, Pt};
use std::path::{Path, PathBuf};

pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
pub const MARGIN: f32 = 50.0;

/// Helvetica averages a little over half an em per glyph.
const GLYPH_WIDTH_EM: f32 = 0.55;

const LAYER: &str = "Layer 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    /// Right edge at `x + width`.
    Right { width: u16 },
    Center,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PdfItem {
    Text {
        text: String,
        x: f32,
        y: f32,
        size: f32,
        align: Align,
    },
    /// Horizontal rule across the printable width.
    Rule { y: f32 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfPage {
    pub items: Vec<PdfItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfReport {
    title: String,
    pages: Vec<PdfPage>,
}

impl PdfReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            pages: vec![PdfPage::default()],
        }
    }

    pub fn pages(&self) -> &[PdfPage] {
        &self.pages
    }

    pub fn add_page(&mut self) {
        self.pages.push(PdfPage::default());
    }

    pub fn text(&mut self, text: impl Into<String>, x: f32, y: f32, size: f32, align: Align) {
        self.current().items.push(PdfItem::Text {
            text: text.into(),
            x,
            y,
            size,
            align,
        });
    }

    pub fn rule(&mut self, y: f32) {
        self.current().items.push(PdfItem::Rule { y });
    }

    /// Every text item in page order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().flat_map(|page| {
            page.items.iter().filter_map(|item| match item {
                PdfItem::Text { text, .. } => Some(text.as_str()),
                PdfItem::Rule { .. } => None,
            })
        })
    }

    fn current(&mut self) -> &mut PdfPage {
        if self.pages.is_empty() {
            self.pages.push(PdfPage::default());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    pub fn render(&self) -> Result<Vec<u8>, SyncError> {
        let (doc, first_page, first_layer) =
            PdfDocument::new(&self.title, Mm::from(Pt(PAGE_WIDTH)), Mm::from(Pt(PAGE_HEIGHT)), LAYER);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(render_error)?;

        for (index, page) in self.pages.iter().enumerate() {
            let layer = if index == 0 {
                doc.get_page(first_page).get_layer(first_layer)
            } else {
                let (page, layer) =
                    doc.add_page(Mm::from(Pt(PAGE_WIDTH)), Mm::from(Pt(PAGE_HEIGHT)), LAYER);
                doc.get_page(page).get_layer(layer)
            };
            for item in &page.items {
                draw(&layer, &font, item);
            }
        }

        doc.save_to_bytes().map_err(render_error)
    }

    /// Writes the rendered document into `dir`, creating the directory when
    /// needed.
    pub async fn write(&self, dir: &Path, file_name: &str) -> Result<PathBuf, SyncError> {
        let bytes = self.render()?;
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(path = %path.display(), pages = self.pages.len(), "PDF file generated");
        Ok(path)
    }
}

pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * GLYPH_WIDTH_EM
}

fn draw(layer: &PdfLayerReference, font: &IndirectFontRef, item: &PdfItem) {
    match item {
        PdfItem::Text {
            text,
            x,
            y,
            size,
            align,
        } => {
            let left = match align {
                Align::Left => *x,
                Align::Right { width } => x + f32::from(*width) - text_width(text, *size),
                Align::Center => (PAGE_WIDTH - text_width(text, *size)) / 2.0,
            };
            // `y` is the top of the line box; PDF places the baseline.
            let baseline = PAGE_HEIGHT - y - size;
            layer.use_text(text.clone(), *size, Mm::from(Pt(left)), Mm::from(Pt(baseline)), font);
        }
        PdfItem::Rule { y } => {
            let y = Mm::from(Pt(PAGE_HEIGHT - y));
            layer.add_line(Line {
                points: vec![
                    (Point::new(Mm::from(Pt(MARGIN)), y), false),
                    (Point::new(Mm::from(Pt(PAGE_WIDTH - MARGIN)), y), false),
                ],
                is_closed: false,
            });
        }
    }
}

fn render_error(err: printpdf::Error) -> SyncError {
    SyncError::Report(std::io::Error::other(format!("PDF rendering failed: {}", err)))
}
