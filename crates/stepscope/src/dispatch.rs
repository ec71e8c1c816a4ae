//! Classified value -> renderer contract.
//!
//! A [`RendererTable`] holds exactly one render function per [`Tag`]. The
//! standard table is built from an exhaustive `match`, so adding a tag does
//! not compile until it has a renderer. Tables are passed to the
//! [`Dispatcher`] explicitly; there is no global registry.
//!
//! Renderers never enumerate more than [`DisplayConfig::max_elements`] leaf
//! elements. Larger numeric payloads become a [`RendererContract::Summary`],
//! larger non-numeric ones are truncated and report how much was elided.

use serde::Serialize;

use crate::config::DisplayConfig;
use crate::value::{ArrayData, Mapping, Summary, Tag, Value, classify};

/// Data handed to a presentational renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RendererContract {
    /// Ordered 1-D display. `elided` here and in `Grid` counts leaf
    /// elements left out, not items.
    Array { items: Vec<Value>, elided: usize },
    /// Row/column grid. `rows`/`cols` describe the whole payload, `cells`
    /// only what is shown.
    Grid {
        rows: usize,
        cols: usize,
        cells: Vec<Vec<Value>>,
        elided: usize,
    },
    Summary {
        summary: Summary,
        shape: Option<Vec<u64>>,
        dtype: Option<String>,
    },
    Scalar {
        value: Value,
        annotation: Option<String>,
    },
    /// Key/value pairs in insertion order. `elided` counts leaves left out.
    Mapping {
        entries: Vec<(String, Value)>,
        elided: usize,
    },
    /// Tensor of rank >= 3 without a summary. Never enumerated.
    HighDimensional { shape: Vec<u64>, dtype: String },
    Opaque { text: String },
}

pub type RenderFn = fn(&Value, &DisplayConfig) -> RendererContract;

/// Total mapping from tag to render function.
#[derive(Clone)]
pub struct RendererTable {
    renderers: [RenderFn; Tag::COUNT],
}

impl RendererTable {
    pub fn standard() -> Self {
        Self {
            renderers: Tag::ALL.map(standard_renderer),
        }
    }

    /// Replace the renderer for one tag.
    pub fn with(mut self, tag: Tag, render: RenderFn) -> Self {
        self.renderers[tag.index()] = render;
        self
    }

    pub fn get(&self, tag: Tag) -> RenderFn {
        self.renderers[tag.index()]
    }
}

impl Default for RendererTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for RendererTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererTable").finish_non_exhaustive()
    }
}

fn standard_renderer(tag: Tag) -> RenderFn {
    match tag {
        Tag::Number | Tag::String => render_scalar,
        Tag::Array => render_array,
        Tag::Matrix => render_matrix,
        Tag::NdArray => render_ndarray,
        Tag::TensorScalar => render_tensor_scalar,
        Tag::Tensor1d => render_tensor_1d,
        Tag::Tensor2d => render_tensor_2d,
        Tag::TensorNd => render_tensor_nd,
        Tag::Dict => render_dict,
        Tag::Other => render_opaque,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    table: RendererTable,
    config: DisplayConfig,
}

impl Dispatcher {
    pub fn new(table: RendererTable, config: DisplayConfig) -> Self {
        Self { table, config }
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    pub fn select(&self, tag: Tag) -> RenderFn {
        self.table.get(tag)
    }

    pub fn render(&self, value: &Value) -> RendererContract {
        self.select(classify(value))(value, &self.config)
    }
}

// Standard renderers. Each falls back to `Opaque` when handed a value of the
// wrong shape, which only happens through a custom table.

pub fn render_scalar(value: &Value, _: &DisplayConfig) -> RendererContract {
    RendererContract::Scalar {
        value: value.clone(),
        annotation: None,
    }
}

pub fn render_opaque(value: &Value, _: &DisplayConfig) -> RendererContract {
    RendererContract::Opaque {
        text: value.to_string(),
    }
}

pub fn render_array(value: &Value, config: &DisplayConfig) -> RendererContract {
    match value {
        Value::List(items) => sequence(items, None, config),
        other => render_opaque(other, config),
    }
}

pub fn render_matrix(value: &Value, config: &DisplayConfig) -> RendererContract {
    match value {
        Value::List(rows) => grid(rows, None, config),
        other => render_opaque(other, config),
    }
}

pub fn render_ndarray(value: &Value, config: &DisplayConfig) -> RendererContract {
    match value {
        Value::NdArray(data) => array_data(data, &Layout::Any, config),
        other => render_opaque(other, config),
    }
}

pub fn render_tensor_scalar(value: &Value, config: &DisplayConfig) -> RendererContract {
    let Value::Tensor(tensor) = value else {
        return render_opaque(value, config);
    };
    let annotation = (!tensor.dtype.is_empty()).then(|| tensor.dtype.clone());
    match tensor.data.values.as_deref().and_then(first_leaf) {
        Some(first) => RendererContract::Scalar {
            value: first.clone(),
            annotation,
        },
        None => without_values(value, &tensor.data, Some(tensor.shape.as_slice()), annotation),
    }
}

pub fn render_tensor_1d(value: &Value, config: &DisplayConfig) -> RendererContract {
    tensor_with_layout(value, Layout::Flat, config)
}

pub fn render_tensor_2d(value: &Value, config: &DisplayConfig) -> RendererContract {
    tensor_with_layout(value, Layout::Grid, config)
}

pub fn render_tensor_nd(value: &Value, config: &DisplayConfig) -> RendererContract {
    let Value::Tensor(tensor) = value else {
        return render_opaque(value, config);
    };
    match &tensor.data.summary {
        Some(summary) => RendererContract::Summary {
            summary: summary.clone(),
            shape: Some(tensor.shape.clone()),
            dtype: Some(tensor.dtype.clone()),
        },
        None => RendererContract::HighDimensional {
            shape: tensor.shape.clone(),
            dtype: tensor.dtype.clone(),
        },
    }
}

pub fn render_dict(value: &Value, config: &DisplayConfig) -> RendererContract {
    match value {
        Value::Map(map) => {
            let mut budget = config.max_elements;
            let mut entries = Vec::new();
            for (key, item) in map {
                if budget == 0 {
                    break;
                }
                match take_leaves(item, &mut budget) {
                    Some(item) => entries.push((key.clone(), item)),
                    None => break,
                }
            }
            let shown: usize = entries.iter().map(|(_, item)| item.leaf_count()).sum();
            RendererContract::Mapping {
                elided: value.leaf_count().saturating_sub(shown),
                entries,
            }
        }
        other => render_opaque(other, config),
    }
}

enum Layout {
    /// Grid when the first element is a row, flat otherwise.
    Any,
    Flat,
    Grid,
}

fn tensor_with_layout(value: &Value, layout: Layout, config: &DisplayConfig) -> RendererContract {
    let Value::Tensor(tensor) = value else {
        return render_opaque(value, config);
    };
    match array_data(&tensor.data, &layout, config) {
        RendererContract::Summary { summary, .. } => RendererContract::Summary {
            summary,
            shape: Some(tensor.shape.clone()),
            dtype: Some(tensor.dtype.clone()),
        },
        RendererContract::Opaque { .. } if tensor.data.repr.is_none() => {
            RendererContract::Opaque {
                text: value.to_string(),
            }
        }
        contract => contract,
    }
}

fn array_data(data: &ArrayData, layout: &Layout, config: &DisplayConfig) -> RendererContract {
    let Some(values) = data.values.as_deref() else {
        return without_values(&Value::Null, data, None, None);
    };
    let Value::List(items) = values else {
        return RendererContract::Scalar {
            value: values.clone(),
            annotation: None,
        };
    };
    let as_grid = match layout {
        Layout::Any => matches!(items.first(), Some(Value::List(_))),
        Layout::Flat => false,
        Layout::Grid => true,
    };
    if as_grid {
        grid(items, data.summary.as_ref(), config)
    } else {
        sequence(items, data.summary.as_ref(), config)
    }
}

/// Summary when one was supplied, otherwise the `repr` (or the whole
/// payload) as opaque text.
fn without_values(
    value: &Value,
    data: &ArrayData,
    shape: Option<&[u64]>,
    dtype: Option<String>,
) -> RendererContract {
    if let Some(summary) = &data.summary {
        return RendererContract::Summary {
            summary: summary.clone(),
            shape: shape.map(<[u64]>::to_vec),
            dtype,
        };
    }
    RendererContract::Opaque {
        text: data.repr.clone().unwrap_or_else(|| value.to_string()),
    }
}

fn first_leaf(value: &Value) -> Option<&Value> {
    match value {
        Value::List(items) => items.first().and_then(first_leaf),
        leaf => Some(leaf),
    }
}

fn total_leaves(items: &[Value]) -> usize {
    items.iter().map(Value::leaf_count).sum()
}

/// Summary for an oversized payload: the supplied one, else one computed
/// from its numeric leaves.
fn oversized_summary(
    items: &[Value],
    supplied: Option<&Summary>,
    config: &DisplayConfig,
) -> Option<Summary> {
    if let Some(summary) = supplied {
        return Some(summary.clone());
    }
    log::warn!(
        "payload with {} elements arrived without a summary",
        total_leaves(items)
    );
    let numbers = Value::List(items.to_vec()).numeric_leaves()?;
    Summary::from_numbers(&numbers, config.summary_sample)
}

/// Clone of `value` holding at most `budget` leaves, charged against the
/// budget. Lists and maps are cut short; a payload that cannot be split and
/// does not fit yields `None` and exhausts the budget.
fn take_leaves(value: &Value, budget: &mut usize) -> Option<Value> {
    let leaves = value.leaf_count();
    if leaves <= *budget {
        *budget -= leaves;
        return Some(value.clone());
    }
    match value {
        Value::List(items) => Some(Value::List(take_items(items, budget))),
        Value::Map(map) => {
            let mut shown = Mapping::new();
            for (key, value) in map {
                if *budget == 0 {
                    break;
                }
                match take_leaves(value, budget) {
                    Some(value) => {
                        shown.insert(key.clone(), value);
                    }
                    None => break,
                }
            }
            Some(Value::Map(shown))
        }
        _ => {
            *budget = 0;
            None
        }
    }
}

/// Leading items of `items` that fit in `budget`, the last one possibly cut.
fn take_items(items: &[Value], budget: &mut usize) -> Vec<Value> {
    let mut shown = Vec::new();
    for item in items {
        if *budget == 0 {
            break;
        }
        match take_leaves(item, budget) {
            Some(item) => shown.push(item),
            None => break,
        }
    }
    shown
}

fn sequence(items: &[Value], supplied: Option<&Summary>, config: &DisplayConfig) -> RendererContract {
    let total = total_leaves(items);
    if total <= config.max_elements {
        return RendererContract::Array {
            items: items.to_vec(),
            elided: 0,
        };
    }
    if let Some(summary) = oversized_summary(items, supplied, config) {
        return RendererContract::Summary {
            summary,
            shape: None,
            dtype: None,
        };
    }
    let mut budget = config.max_elements;
    let shown = take_items(items, &mut budget);
    RendererContract::Array {
        elided: total - total_leaves(&shown),
        items: shown,
    }
}

fn grid(rows: &[Value], supplied: Option<&Summary>, config: &DisplayConfig) -> RendererContract {
    let cols = match rows.first() {
        Some(Value::List(first)) => first.len(),
        Some(_) => 1,
        None => 0,
    };
    let total = total_leaves(rows);
    if total > config.max_elements {
        if let Some(summary) = oversized_summary(rows, supplied, config) {
            return RendererContract::Summary {
                summary,
                shape: None,
                dtype: None,
            };
        }
    }

    let mut cells = Vec::new();
    let mut budget = config.max_elements;
    for row in rows {
        if budget == 0 {
            break;
        }
        let row = match row {
            Value::List(row) => take_items(row, &mut budget),
            scalar => match take_leaves(scalar, &mut budget) {
                Some(scalar) => vec![scalar],
                None => break,
            },
        };
        cells.push(row);
    }
    let shown: usize = cells.iter().map(|row| total_leaves(row)).sum();
    RendererContract::Grid {
        rows: rows.len(),
        cols,
        elided: total - shown,
        cells,
    }
}
