use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::detection::domain::observation::Descriptor;
use crate::shared::constants::QUANTIZATION_SCALE;

/// Integer form of a descriptor, the unit the verifier circuit works on.
///
/// Close descriptors may quantize differently when a component straddles a
/// rounding boundary; equality here is equality of the integers, not of the
/// underlying floats.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct QuantizedDescriptor(Vec<i64>);

impl QuantizedDescriptor {
    pub fn from_values(values: Vec<i64>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[i64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short stable digest for log lines; the full vector is 128 integers.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        hasher.finish()
    }
}

/// `round(value * SCALE)` per component, rounding halves toward positive
/// infinity.
pub fn quantize(descriptor: &Descriptor) -> QuantizedDescriptor {
    QuantizedDescriptor(
        descriptor
            .values()
            .iter()
            .map(|&v| quantize_component(v))
            .collect(),
    )
}

fn quantize_component(value: f32) -> i64 {
    (f64::from(value) * QUANTIZATION_SCALE + 0.5).floor() as i64
}
