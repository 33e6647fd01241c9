use std::time::Duration;

use serde::Serialize;

use crate::matching::domain::face_verifier::{FaceVerifier, VerificationOutcome, VerifierError};
use crate::matching::domain::quantize::QuantizedDescriptor;

#[derive(Serialize)]
struct ProveRequest<'a> {
    embedding1: &'a QuantizedDescriptor,
    embedding2: &'a QuantizedDescriptor,
}

/// Delegates proof generation to a remote proving service.
///
/// The service receives both quantized embeddings and answers with a Groth16
/// proof and its public signals. Without a timeout a stalled service holds
/// the pair's in-flight claim until the connection drops.
pub struct HttpFaceVerifier {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpFaceVerifier {
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> Result<Self, VerifierError> {
        let mut builder = reqwest::blocking::Client::builder();
        // reqwest's blocking client defaults to 30 s; `None` means no limit here.
        builder = builder.timeout(timeout);
        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl FaceVerifier for HttpFaceVerifier {
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
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ProveRequest {
                embedding1: query,
                embedding2: candidate,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(VerifierError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| VerifierError::Malformed(e.to_string()))
    }
}
