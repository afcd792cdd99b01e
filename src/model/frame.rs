//! Frame visuals: ordered compositions of child visuals.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use super::Visual;
use crate::data::display_value;
use crate::loader::{LoadResult, VisualLoader};
use crate::validation::ValidationError;

/// Stacking direction for child visuals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Vertical,
    Horizontal,
}

/// A child reference as written in a frame document.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameChildDefinition {
    reference: String,
    parameters: Map<String, Value>,
    overrides: Map<String, Value>,
}

impl FrameChildDefinition {
    /// Path of the child document, relative to the frame.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Every key besides `ref` and `parameters`, merged into the child document.
    pub fn overrides(&self) -> &Map<String, Value> {
        &self.overrides
    }
}

/// A validated frame whose children have not been loaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDefinition {
    title: Option<String>,
    description: Option<String>,
    layout: Layout,
    auto_height: bool,
    show_titles: bool,
    children: Vec<FrameChildDefinition>,
}

impl FrameDefinition {
    pub fn from_value(document: &Value) -> Result<Self, ValidationError> {
        let raw = RawFrame::deserialize(document)
            .map_err(|err| ValidationError::Schema(err.to_string()))?;

        let children = raw.children.unwrap_or_default();
        if children.is_empty() {
            return Err(ValidationError::EmptyChildren);
        }
        let children = children
            .into_iter()
            .enumerate()
            .map(|(index, child)| parse_child(index, child))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            title: raw.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            description: raw.description,
            layout: raw.layout,
            auto_height: raw.auto_height,
            show_titles: raw.show_titles,
            children,
        })
    }

    pub fn children(&self) -> &[FrameChildDefinition] {
        &self.children
    }

    /// Load every child through `loader`, in declaration order.
    ///
    /// The frame's own path is appended to `stack`, so a child that leads
    /// back to this frame fails with a composition cycle.
    pub fn resolve(
        self,
        loader: &VisualLoader,
        path: &Path,
        stack: &[PathBuf],
    ) -> LoadResult<FrameVisual> {
        let mut child_stack = stack.to_vec();
        child_stack.push(path.to_path_buf());

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut children = Vec::with_capacity(self.children.len());

        for definition in self.children {
            let source = base_dir.join(&definition.reference);
            let overrides = (!definition.overrides.is_empty()).then_some(&definition.overrides);
            let parameters = (!definition.parameters.is_empty()).then_some(&definition.parameters);

            tracing::debug!(
                frame = %path.display(),
                child = %source.display(),
                "resolving frame child"
            );
            let loaded = loader.load_with(&source, overrides, parameters, &child_stack)?;

            children.push(FrameChild {
                source: loaded.source,
                visual: loaded.visual,
                parameters: definition
                    .parameters
                    .iter()
                    .map(|(key, value)| (key.clone(), display_value(value)))
                    .collect(),
                overrides: definition.overrides,
            });
        }

        Ok(FrameVisual {
            title: self.title,
            description: self.description,
            layout: self.layout,
            auto_height: self.auto_height,
            show_titles: self.show_titles,
            children,
        })
    }
}

/// A resolved child participating in a frame.
#[derive(Debug, Clone)]
pub struct FrameChild {
    source: PathBuf,
    visual: Visual,
    parameters: BTreeMap<String, String>,
    overrides: Map<String, Value>,
}

impl FrameChild {
    /// Absolute path of the child document.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn visual(&self) -> &Visual {
        &self.visual
    }

    /// Parameter overrides the child was loaded with, stringified.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn overrides(&self) -> &Map<String, Value> {
        &self.overrides
    }
}

/// A fully resolved, immutable frame visual.
#[derive(Debug, Clone)]
pub struct FrameVisual {
    title: Option<String>,
    description: Option<String>,
    layout: Layout,
    auto_height: bool,
    show_titles: bool,
    children: Vec<FrameChild>,
}

impl FrameVisual {
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn auto_height(&self) -> bool {
        self.auto_height
    }

    pub fn show_titles(&self) -> bool {
        self.show_titles
    }

    pub fn children(&self) -> &[FrameChild] {
        &self.children
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    layout: Layout,
    #[serde(default = "default_true", rename = "autoHeight", alias = "auto_height")]
    auto_height: bool,
    #[serde(default, rename = "showTitles", alias = "show_titles")]
    show_titles: bool,
    #[serde(default)]
    children: Option<Vec<Value>>,
}

fn parse_child(index: usize, child: Value) -> Result<FrameChildDefinition, ValidationError> {
    let Value::Object(mut entry) = child else {
        return Err(ValidationError::Schema(format!(
            "frame child {} must be a mapping",
            index
        )));
    };

    let reference = match entry.remove("ref") {
        Some(Value::String(reference)) if !reference.trim().is_empty() => {
            reference.trim().to_string()
        }
        _ => return Err(ValidationError::MissingChildRef { index }),
    };

    let parameters = match entry.remove("parameters") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(parameters)) => parameters,
        Some(_) => {
            return Err(ValidationError::Schema(format!(
                "frame child {} parameters must be a mapping",
                index
            )))
        }
    };

    Ok(FrameChildDefinition {
        reference,
        parameters,
        overrides: entry,
    })
}
