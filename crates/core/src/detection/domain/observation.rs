use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::DESCRIPTOR_DIM;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor has {actual} components, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
    #[error("descriptor component {index} is not finite")]
    NonFinite { index: usize },
}

/// Fixed-length face descriptor produced by the detector.
///
/// Construction validates the dimensionality, so every descriptor in the
/// system (observed or registered) has exactly [`DESCRIPTOR_DIM`] finite
/// components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_DIM {
            return Err(DescriptorError::WrongLength {
                expected: DESCRIPTOR_DIM,
                actual: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }
}

impl TryFrom<Vec<f32>> for Descriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Descriptor> for Vec<f32> {
    fn from(descriptor: Descriptor) -> Self {
        descriptor.0
    }
}

/// One detected face, valid for a single detection cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
    pub descriptor: Descriptor,
}

impl Observation {
    pub fn new(bounding_box: BoundingBox, descriptor: Descriptor) -> Self {
        Self {
            bounding_box,
            descriptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_accepts_fixed_length() {
        let d = Descriptor::new(vec![0.25; DESCRIPTOR_DIM]).unwrap();
        assert_eq!(d.values().len(), DESCRIPTOR_DIM);
    }

    #[test]
    fn test_descriptor_rejects_wrong_length() {
        let err = Descriptor::new(vec![0.0; 3]).unwrap_err();
        assert_eq!(
            err,
            DescriptorError::WrongLength {
                expected: DESCRIPTOR_DIM,
                actual: 3
            }
        );
    }

    #[test]
    fn test_descriptor_rejects_non_finite() {
        let mut values = vec![0.0; DESCRIPTOR_DIM];
        values[9] = f32::INFINITY;
        assert_eq!(
            Descriptor::new(values).unwrap_err(),
            DescriptorError::NonFinite { index: 9 }
        );
    }

    #[test]
    fn test_observation_json_shape() {
        let values: Vec<String> = (0..DESCRIPTOR_DIM).map(|_| "0.5".to_string()).collect();
        let json = format!(
            r#"{{"box":{{"x":1,"y":2,"width":3,"height":4}},"descriptor":[{}]}}"#,
            values.join(",")
        );
        let obs: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(obs.bounding_box, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(obs.descriptor.values()[0], 0.5);
    }

    #[test]
    fn test_observation_json_rejects_short_descriptor() {
        let json = r#"{"box":{"x":1,"y":2,"width":3,"height":4},"descriptor":[0.1,0.2]}"#;
        assert!(serde_json::from_str::<Observation>(json).is_err());
    }
}
