//! Neural-network descriptors and their neuron/edge layout.

use serde::{Deserialize, Serialize};

pub const X_GAP: f64 = 180.0;
pub const Y_GAP: f64 = 48.0;
pub const NEURON_SIZE: f64 = 24.0;
/// Space added to the canvas on the right and bottom.
const CANVAS_PADDING: f64 = 40.0;

/// A model definition found in the traced source. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralNetworkDescriptor {
    pub model_name: String,
    /// Container kind, e.g. `Sequential`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub layer: String,
    #[serde(default, rename = "in")]
    pub inputs: Option<u64>,
    #[serde(default, rename = "out")]
    pub outputs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neuron {
    pub column: usize,
    pub index: usize,
    pub x: f64,
    pub y: f64,
}

/// Indices into [`NetworkView::neurons`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// Neurons the layer really has.
    pub size: u64,
    /// Neurons not drawn because of the per-layer cap.
    pub elided: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Architecture {
    pub layers: usize,
    pub input: Option<u64>,
    pub output: Option<u64>,
}

/// Composite view of one model: fully connected neuron columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkView {
    pub model_name: String,
    pub columns: Vec<Column>,
    pub neurons: Vec<Neuron>,
    pub edges: Vec<Edge>,
    pub width: f64,
    pub height: f64,
    pub architecture: Architecture,
}

impl NeuralNetworkDescriptor {
    /// Sizes of the neuron columns: the first sized layer's input, then the
    /// output of every layer that declares one.
    pub fn column_sizes(&self) -> Vec<u64> {
        let input = self.layers.iter().find_map(|layer| layer.inputs);
        input
            .into_iter()
            .chain(self.layers.iter().filter_map(|layer| layer.outputs))
            .collect()
    }
}

impl NetworkView {
    /// Lay the model out left to right. `None` for a model without any sized
    /// layer.
    pub fn layout(model: &NeuralNetworkDescriptor, max_neurons_per_layer: usize) -> Option<Self> {
        let sizes = model.column_sizes();
        if sizes.is_empty() {
            return None;
        }

        let mut columns = Vec::with_capacity(sizes.len());
        let mut neurons = Vec::new();
        let mut column_ranges = Vec::with_capacity(sizes.len());
        let cap = max_neurons_per_layer as u64;

        for (column, &size) in sizes.iter().enumerate() {
            let drawn = size.min(cap);
            columns.push(Column {
                size,
                elided: size - drawn,
            });

            // Centre each column vertically around y = 0
            let total_height = drawn.saturating_sub(1) as f64 * Y_GAP;
            let start = neurons.len();
            neurons.extend((0..drawn as usize).map(|index| Neuron {
                column,
                index,
                x: column as f64 * X_GAP,
                y: index as f64 * Y_GAP - total_height / 2.0,
            }));
            column_ranges.push(start..neurons.len());
        }

        let edges = column_ranges
            .windows(2)
            .flat_map(|pair| {
                let (left, right) = (pair[0].clone(), pair[1].clone());
                left.flat_map(move |from| right.clone().map(move |to| Edge { from, to }))
            })
            .collect();

        // Shift to non-negative coordinates
        let min_y = neurons.iter().map(|n| n.y).fold(f64::INFINITY, f64::min);
        let min_y = if min_y.is_finite() { min_y } else { 0.0 };
        for neuron in &mut neurons {
            neuron.y -= min_y;
        }
        let max_x = neurons.iter().map(|n| n.x).fold(0.0, f64::max);
        let max_y = neurons.iter().map(|n| n.y).fold(0.0, f64::max);

        Some(Self {
            model_name: model.model_name.clone(),
            columns,
            neurons,
            edges,
            width: max_x + NEURON_SIZE + CANVAS_PADDING,
            height: max_y + NEURON_SIZE + CANVAS_PADDING,
            architecture: Architecture {
                layers: model.layers.len(),
                input: model.layers.first().and_then(|layer| layer.inputs),
                output: model.layers.last().and_then(|layer| layer.outputs),
            },
        })
    }
}
