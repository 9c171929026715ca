use serde::{Deserialize, Serialize};

/// Fewest attributes a hierarchy may track.
pub const MIN_ATTRIBUTES: usize = 3;
/// Most attributes a hierarchy may track.
pub const MAX_ATTRIBUTES: usize = 8;
/// Lower bound of an attribute value.
pub const MIN_VALUE: f64 = 0.0;
/// Upper bound of an attribute value.
pub const MAX_VALUE: f64 = 10.0;
/// Value given to freshly created attribute slots.
pub const DEFAULT_VALUE: f64 = 5.0;

/// A single named score on a ranked entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: f64,
}

impl Attribute {
    /// Create an attribute, clamping `value` into `[0, 10]`.
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: clamp_value(value),
        }
    }

    /// The attribute a new slot at `index` gets when no name is known for it.
    pub fn placeholder(index: usize) -> Self {
        Self::new(default_attribute_name(index), DEFAULT_VALUE)
    }
}

/// `"Stat 1"`, `"Stat 2"`, ... for zero-based `index`.
pub fn default_attribute_name(index: usize) -> String {
    format!("Stat {}", index + 1)
}

/// Clamp a requested attribute count into `[MIN_ATTRIBUTES, MAX_ATTRIBUTES]`.
pub fn clamp_count(n: usize) -> usize {
    n.clamp(MIN_ATTRIBUTES, MAX_ATTRIBUTES)
}

/// Clamp an attribute value into `[0, 10]`. NaN becomes the default value.
pub fn clamp_value(value: f64) -> f64 {
    if value.is_nan() {
        return DEFAULT_VALUE;
    }
    value.clamp(MIN_VALUE, MAX_VALUE)
}
