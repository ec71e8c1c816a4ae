//! Captured runtime values and their renderer classification.
//!
//! The tracer serializes every captured local as JSON. A [`Value`] is built
//! from that JSON exactly once, when the trace is ingested: objects carrying
//! the `ndarray` / `torchtensor` discriminants become [`Value::NdArray`] /
//! [`Value::Tensor`], every other object becomes a [`Value::Map`]. Renderers
//! then work on the typed union and [`classify`] never re-inspects raw shape.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map as JsonMap, Value as Json};

/// Discriminant used by numeric-array payloads.
pub const NDARRAY_DISCRIMINANT: &str = "ndarray";
/// Discriminant used by tensor payloads.
pub const TENSOR_DISCRIMINANT: &str = "torchtensor";
/// Marker emitted by older backends instead of the `type` discriminant.
pub const LEGACY_TENSOR_MARKER: &str = "__torch_tensor__";

/// Insertion-ordered string-keyed mapping of values.
pub type Mapping = IndexMap<String, Value>;

/// A captured runtime value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Json")]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Ordered sequence, uniform or nested.
    List(Vec<Value>),
    /// Numeric-array library payload (`type: "ndarray"`).
    NdArray(ArrayData),
    /// Tensor payload (`type: "torchtensor"`).
    Tensor(Tensor),
    /// Any other keyed container.
    Map(Mapping),
}

/// Element data shared by ndarray and tensor payloads.
///
/// Large containers arrive without `values` but with a [`Summary`]; payloads
/// that could not be converted at all only carry a `repr`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayData {
    pub values: Option<Box<Value>>,
    pub summary: Option<Summary>,
    pub repr: Option<String>,
}

impl ArrayData {
    fn leaf_count(&self) -> usize {
        self.values.as_deref().map_or(1, Value::leaf_count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<u64>,
    pub dtype: String,
    pub data: ArrayData,
}

/// Aggregate statistics standing in for a container too large to enumerate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub size: u64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub sample: Vec<Value>,
}

impl Summary {
    /// Summarize numeric leaves, keeping the first `sample_len` as a sample.
    /// Returns `None` when there are no numbers to summarize.
    pub fn from_numbers(numbers: &[f64], sample_len: usize) -> Option<Self> {
        let (first, rest) = numbers.split_first()?;
        let (min, max, sum) = rest
            .iter()
            .fold((*first, *first, *first), |(min, max, sum), &n| {
                (min.min(n), max.max(n), sum + n)
            });
        Some(Self {
            size: numbers.len() as u64,
            min: Some(min),
            max: Some(max),
            mean: Some(sum / numbers.len() as f64),
            sample: numbers
                .iter()
                .take(sample_len)
                .map(|&n| Value::Number(n))
                .collect(),
        })
    }
}

/// Semantic category of a value. Selects the renderer contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    Number,
    String,
    Array,
    Matrix,
    NdArray,
    TensorScalar,
    Tensor1d,
    Tensor2d,
    TensorNd,
    Dict,
    Other,
}

impl Tag {
    pub const ALL: [Tag; 11] = [
        Tag::Number,
        Tag::String,
        Tag::Array,
        Tag::Matrix,
        Tag::NdArray,
        Tag::TensorScalar,
        Tag::Tensor1d,
        Tag::Tensor2d,
        Tag::TensorNd,
        Tag::Dict,
        Tag::Other,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Number => "number",
            Tag::String => "string",
            Tag::Array => "array",
            Tag::Matrix => "matrix",
            Tag::NdArray => "ndarray",
            Tag::TensorScalar => "tensor_scalar",
            Tag::Tensor1d => "tensor_1d",
            Tag::Tensor2d => "tensor_2d",
            Tag::TensorNd => "tensor_nd",
            Tag::Dict => "dict",
            Tag::Other => "other",
        }
    }

    /// Position of this tag in [`Tag::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Classify a value. Pure, total and deterministic.
pub fn classify(value: &Value) -> Tag {
    match value {
        Value::Number(_) => Tag::Number,
        Value::Text(_) => Tag::String,
        Value::Null | Value::Bool(_) => Tag::Other,
        Value::NdArray(_) => Tag::NdArray,
        Value::Tensor(tensor) => match tensor.shape.as_slice() {
            [] | [1] => Tag::TensorScalar,
            [_] => Tag::Tensor1d,
            [_, _] => Tag::Tensor2d,
            _ => Tag::TensorNd,
        },
        Value::List(items) => match items.first() {
            Some(Value::List(_)) => Tag::Matrix,
            _ => Tag::Array,
        },
        Value::Map(_) => Tag::Dict,
    }
}

impl Value {
    pub fn tag(&self) -> Tag {
        classify(self)
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Number of scalar leaves, descending through lists, map values and the
    /// enumerated values of ndarray/tensor payloads. A payload that carries
    /// only a summary or a `repr` counts as one leaf.
    pub fn leaf_count(&self) -> usize {
        match self {
            Value::List(items) => items.iter().map(Value::leaf_count).sum(),
            Value::Map(map) => map.values().map(Value::leaf_count).sum(),
            Value::NdArray(data) => data.leaf_count(),
            Value::Tensor(tensor) => tensor.data.leaf_count(),
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::Text(_) => 1,
        }
    }

    /// Numeric leaves in row-major order. `None` if any leaf is not a number.
    pub fn numeric_leaves(&self) -> Option<Vec<f64>> {
        let mut out = Vec::new();
        self.collect_numbers(&mut out).then_some(out)
    }

    fn collect_numbers(&self, out: &mut Vec<f64>) -> bool {
        match self {
            Value::Number(n) => {
                out.push(*n);
                true
            }
            Value::List(items) => items.iter().all(|item| item.collect_numbers(out)),
            _ => false,
        }
    }

    /// Convert back to JSON, for opaque stringification.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::Text(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::NdArray(data) => {
                let mut object = JsonMap::new();
                object.insert("type".into(), NDARRAY_DISCRIMINANT.into());
                data.write_json(&mut object);
                Json::Object(object)
            }
            Value::Tensor(tensor) => {
                let mut object = JsonMap::new();
                object.insert("type".into(), TENSOR_DISCRIMINANT.into());
                object.insert("shape".into(), tensor.shape.clone().into());
                object.insert("dtype".into(), tensor.dtype.clone().into());
                tensor.data.write_json(&mut object);
                Json::Object(object)
            }
            Value::Map(map) => Json::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// Whole numbers go back out as integers so `6.0` prints as `6`.
fn number_to_json(n: f64) -> Json {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() < MAX_EXACT {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Json::Null, Json::Number)
    }
}

impl ArrayData {
    fn from_object(object: &mut JsonMap<String, Json>) -> Self {
        let summary = object.remove("summary").and_then(|raw| {
            serde_json::from_value::<Summary>(raw)
                .inspect_err(|error| log::debug!("dropping malformed summary: {error}"))
                .ok()
        });
        Self {
            values: object
                .remove("values")
                .filter(|v| !v.is_null())
                .map(|v| Box::new(Value::from(v))),
            summary,
            repr: object
                .remove("repr")
                .and_then(|r| r.as_str().map(str::to_owned)),
        }
    }

    fn write_json(&self, object: &mut JsonMap<String, Json>) {
        if let Some(values) = &self.values {
            object.insert("values".into(), values.to_json());
        }
        if let Some(summary) = &self.summary {
            if let Ok(summary) = serde_json::to_value(summary) {
                object.insert("summary".into(), summary);
            }
        }
        if let Some(repr) = &self.repr {
            object.insert("repr".into(), repr.clone().into());
        }
    }
}

/// A missing shape means a 0-d tensor. Anything other than a list of
/// non-negative integers is not a tensor shape.
fn tensor_shape(object: &JsonMap<String, Json>) -> Option<Vec<u64>> {
    match object.get("shape") {
        None | Some(Json::Null) => Some(Vec::new()),
        Some(Json::Array(dims)) => dims.iter().map(Json::as_u64).collect(),
        Some(_) => None,
    }
}

fn is_tensor_object(object: &JsonMap<String, Json>) -> bool {
    object.get("type").and_then(Json::as_str) == Some(TENSOR_DISCRIMINANT)
        || object.get(LEGACY_TENSOR_MARKER).and_then(Json::as_bool) == Some(true)
}

impl Value {
    fn from_object(mut object: JsonMap<String, Json>) -> Self {
        if object.get("type").and_then(Json::as_str) == Some(NDARRAY_DISCRIMINANT) {
            return Value::NdArray(ArrayData::from_object(&mut object));
        }

        if is_tensor_object(&object) {
            match tensor_shape(&object) {
                Some(shape) => {
                    let dtype = object
                        .remove("dtype")
                        .and_then(|d| d.as_str().map(str::to_owned))
                        .unwrap_or_default();
                    let data = ArrayData::from_object(&mut object);
                    return Value::Tensor(Tensor { shape, dtype, data });
                }
                None => log::debug!("tensor payload with malformed shape, keeping it as a mapping"),
            }
        }

        Value::Map(
            object
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect(),
        )
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(object) => Value::from_object(object),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Text is shown bare, everything else as compact JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}
