use crate::matching::domain::face_verifier::{FaceVerifier, VerificationOutcome, VerifierError};
use crate::matching::domain::quantize::QuantizedDescriptor;

/// Default match radius in quantized units (0.6 in descriptor space).
pub const DEFAULT_MATCH_THRESHOLD: f64 = 600.0;

/// Plain Euclidean comparison for development without a proving service.
///
/// Produces no proof; only the public signal is meaningful.
pub struct DistanceFaceVerifier {
    threshold: f64,
}

impl DistanceFaceVerifier {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for DistanceFaceVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

fn squared_distance(a: &[i64], b: &[i64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = (x - y) as f64;
            d * d
        })
        .sum()
}

impl FaceVerifier for DistanceFaceVerifier {
    fn verify(
        &self,
        query: &QuantizedDescriptor,
        candidate: &QuantizedDescriptor,
    ) -> Result<VerificationOutcome, VerifierError> {
        if query.len() != candidate.len() {
            return Err(VerifierError::DimensionMismatch {
                query: query.len(),
                candidate: candidate.len(),
            });
        }
        let distance_sq = squared_distance(query.values(), candidate.values());
        let signal = if distance_sq <= self.threshold * self.threshold {
            "1"
        } else {
            "0"
        };
        Ok(VerificationOutcome {
            proof: serde_json::Value::Null,
            public_signals: vec![signal.to_string()],
        })
    }
}
