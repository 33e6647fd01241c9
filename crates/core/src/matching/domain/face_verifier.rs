use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::quantize::QuantizedDescriptor;

#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("verifier request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("verifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed verifier response: {0}")]
    Malformed(String),
    #[error("descriptor length mismatch: query {query}, candidate {candidate}")]
    DimensionMismatch { query: usize, candidate: usize },
    #[error("proof generation failed: {0}")]
    Proof(String),
}

/// Proof and public signals returned for one comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub proof: serde_json::Value,
    #[serde(rename = "publicSignals")]
    pub public_signals: Vec<String>,
}

impl VerificationOutcome {
    /// The circuit's first public signal is `"1"` for a match.
    pub fn is_match(&self) -> bool {
        self.public_signals.first().is_some_and(|s| s == "1")
    }
}

/// Zero-knowledge comparison of two quantized descriptors.
///
/// Calls are expected to take much longer than a frame interval. Each call
/// is independent: a failure says nothing about other pairs.
pub trait FaceVerifier: Send + Sync {
    fn verify(
        &self,
        query: &QuantizedDescriptor,
        candidate: &QuantizedDescriptor,
    ) -> Result<VerificationOutcome, VerifierError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::match_signal(vec!["1"], true)]
    #[case::no_match_signal(vec!["0"], false)]
    #[case::extra_signals(vec!["1", "42"], true)]
    #[case::no_signals(vec![], false)]
    fn test_is_match(#[case] signals: Vec<&str>, #[case] expected: bool) {
        let outcome = VerificationOutcome {
            proof: serde_json::Value::Null,
            public_signals: signals.into_iter().map(String::from).collect(),
        };
        assert_eq!(outcome.is_match(), expected);
    }

    #[test]
    fn test_parses_service_response() {
        let json = r#"{"proof":{"pi_a":["1","2"]},"publicSignals":["1"]}"#;
        let outcome: VerificationOutcome = serde_json::from_str(json).unwrap();
        assert!(outcome.is_match());
        assert_eq!(outcome.proof["pi_a"][0], "1");
    }
}
