//! Figure rendering for matrix and frame visuals.
//!
//! Rendering is split in two: building a [`Figure`] (headers, formatted
//! cells and layout heights) and serializing it to an artifact. The default
//! [`TableRenderer`] writes self-contained HTML tables; it has no raster
//! backend, so PNG export reports [`RenderError::BackendUnavailable`].

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::data::{display_value, Dataset};
use crate::model::{FrameVisual, Layout, MatrixVisual};
use crate::template::{label_from_template, render_template};

pub const TABLE_HEADER_HEIGHT: u32 = 40;
pub const TABLE_ROW_HEIGHT: u32 = 32;
pub const MATRIX_TITLE_MARGIN: u32 = 48;
pub const DEFAULT_CHILD_HEIGHT: u32 = 350;
pub const FRAME_TITLE_MARGIN: u32 = 48;
pub const SUBPLOT_TITLE_MARGIN: u32 = 16;

/// Errors raised while rendering or writing figures.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("frame requires at least one child visual to render")]
    EmptyFrame,

    #[error("{0} export is not available in this build")]
    BackendUnavailable(&'static str),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize figure: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One rendered table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSection {
    pub title: Option<String>,
    pub headers: Vec<String>,
    /// Row-major formatted cells.
    pub cells: Vec<Vec<String>>,
    pub height: u32,
}

/// A rendered visual: one section for a matrix, one per child for a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub title: Option<String>,
    pub layout: FigureLayout,
    pub show_section_titles: bool,
    pub sections: Vec<TableSection>,
    /// Total pixel height including margins.
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FigureLayout {
    Vertical,
    Horizontal,
}

impl From<Layout> for FigureLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Vertical => FigureLayout::Vertical,
            Layout::Horizontal => FigureLayout::Horizontal,
        }
    }
}

/// Rendering collaborator used by the pipeline.
pub trait Renderer: Send + Sync {
    fn render_matrix(&self, visual: &MatrixVisual, dataset: &Dataset) -> Result<Figure, RenderError>;

    fn render_frame(
        &self,
        frame: &FrameVisual,
        children: &[(Arc<MatrixVisual>, Dataset)],
    ) -> Result<Figure, RenderError>;

    fn write_html(&self, figure: &Figure, path: &Path) -> Result<(), RenderError>;

    fn write_png(&self, figure: &Figure, path: &Path, scale: f64) -> Result<(), RenderError>;
}

/// Pixel height needed to show `row_count` records.
pub fn estimate_table_height(row_count: usize) -> u32 {
    let visible = row_count.max(1) as u32;
    TABLE_HEADER_HEIGHT + visible * TABLE_ROW_HEIGHT
}

/// Format a value cell according to a value's `format`.
///
/// `percent[:precision]` multiplies by 100 (default precision 2);
/// `duration` renders seconds as `HH:MM:SS`.
pub fn format_value(value: &Value, format: Option<&str>) -> String {
    let (Some(format), Some(number)) = (format, value.as_f64()) else {
        return display_value(value);
    };

    if let Some(rest) = format.strip_prefix("percent") {
        let precision = rest
            .strip_prefix(':')
            .and_then(|p| p.parse::<usize>().ok())
            .unwrap_or(2);
        return format!("{:.*}%", precision, number * 100.0);
    }
    if format.starts_with("duration") {
        let total = number.trunc() as i64;
        let (hours, remainder) = (total / 3600, total % 3600);
        return format!("{:02}:{:02}:{:02}", hours, remainder / 60, remainder % 60);
    }
    display_value(value)
}

/// Header and cell builder shared by matrix and frame figures.
pub fn table_section(visual: &MatrixVisual, dataset: &Dataset, title: Option<String>) -> TableSection {
    let visible_rows: Vec<_> = visual.rows().iter().filter(|row| !row.hidden()).collect();

    let mut headers: Vec<String> = visible_rows
        .iter()
        .map(|row| {
            row.label()
                .map(str::to_string)
                .unwrap_or_else(|| label_from_template(row.template(), &dataset.row_fields))
        })
        .collect();
    headers.extend(visual.values().iter().map(|value| value.label().to_string()));

    let cells = dataset
        .rows
        .iter()
        .map(|record| {
            let mut line: Vec<String> = visible_rows
                .iter()
                .map(|row| {
                    render_template(row.template(), |key| record.get(key).map(display_value))
                })
                .collect();
            line.extend(visual.values().iter().map(|value| {
                let cell = record.get(value.label()).unwrap_or(&Value::Null);
                format_value(cell, value.format())
            }));
            line
        })
        .collect();

    TableSection {
        title,
        headers,
        cells,
        height: estimate_table_height(dataset.len()),
    }
}

/// Renders figures as HTML tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableRenderer;

impl TableRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for TableRenderer {
    fn render_matrix(&self, visual: &MatrixVisual, dataset: &Dataset) -> Result<Figure, RenderError> {
        let section = table_section(visual, dataset, None);
        let margin = if visual.title().is_some() {
            MATRIX_TITLE_MARGIN
        } else {
            0
        };
        let content = if visual.auto_height() {
            section.height
        } else {
            DEFAULT_CHILD_HEIGHT
        };

        Ok(Figure {
            title: visual.title().map(str::to_string),
            layout: FigureLayout::Vertical,
            show_section_titles: false,
            sections: vec![section],
            height: content + margin,
        })
    }

    fn render_frame(
        &self,
        frame: &FrameVisual,
        children: &[(Arc<MatrixVisual>, Dataset)],
    ) -> Result<Figure, RenderError> {
        if children.is_empty() {
            return Err(RenderError::EmptyFrame);
        }

        let mut sections = Vec::with_capacity(children.len());
        for (index, (visual, dataset)) in children.iter().enumerate() {
            let title = visual
                .title()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Section {}", index + 1));
            let mut section = table_section(visual, dataset, Some(title));
            if !(frame.auto_height() && visual.auto_height()) {
                section.height = DEFAULT_CHILD_HEIGHT;
            }
            sections.push(section);
        }

        let mut margin = if frame.title().is_some() {
            FRAME_TITLE_MARGIN
        } else {
            0
        };
        if frame.show_titles() {
            margin += SUBPLOT_TITLE_MARGIN;
        }

        let layout = FigureLayout::from(frame.layout());
        let content = match layout {
            FigureLayout::Vertical => sections.iter().map(|s| s.height).sum(),
            FigureLayout::Horizontal => sections.iter().map(|s| s.height).max().unwrap_or(0),
        };

        Ok(Figure {
            title: frame.title().map(str::to_string),
            layout,
            show_section_titles: frame.show_titles(),
            sections,
            height: content + margin,
        })
    }

    fn write_html(&self, figure: &Figure, path: &Path) -> Result<(), RenderError> {
        let html = figure_html(figure, path)?;
        fs::write(path, html).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_png(&self, _figure: &Figure, _path: &Path, _scale: f64) -> Result<(), RenderError> {
        Err(RenderError::BackendUnavailable("PNG"))
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn figure_html(figure: &Figure, path: &Path) -> Result<String, RenderError> {
    let div_id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.replace(' ', "_"))
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "figure".to_string());
    let direction = match figure.layout {
        FigureLayout::Vertical => "column",
        FigureLayout::Horizontal => "row",
    };

    let mut body = String::new();
    // Writing to a String cannot fail.
    let _ = write!(
        body,
        "<div id=\"{}\" class=\"praeparo-figure\" style=\"display:flex;flex-direction:{};height:{}px\">",
        escape_html(&div_id),
        direction,
        figure.height
    );
    if let Some(title) = &figure.title {
        let _ = write!(body, "<h1>{}</h1>", escape_html(title));
    }
    for section in &figure.sections {
        let _ = write!(body, "<section style=\"min-height:{}px\">", section.height);
        if figure.show_section_titles {
            if let Some(title) = &section.title {
                let _ = write!(body, "<h2>{}</h2>", escape_html(title));
            }
        }
        body.push_str("<table><thead><tr>");
        for header in &section.headers {
            let _ = write!(body, "<th>{}</th>", escape_html(header));
        }
        body.push_str("</tr></thead><tbody>");
        for row in &section.cells {
            body.push_str("<tr>");
            for cell in row {
                let _ = write!(body, "<td>{}</td>", escape_html(cell));
            }
            body.push_str("</tr>");
        }
        body.push_str("</tbody></table></section>");
    }
    body.push_str("</div>");

    let data = serde_json::to_string(figure)?.replace("</", "<\\/");
    Ok(format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\" />\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\
         <style>body{{margin:0;padding:0;font-family:sans-serif}}\
         th{{background:#1f77b4;color:white;text-align:left}}td{{text-align:left}}</style>\
         </head><body>{}<script type=\"application/json\" id=\"{}-data\">{}</script></body></html>",
        body,
        escape_html(&div_id),
        data
    ))
}
