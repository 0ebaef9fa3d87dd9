//! Classification gateway — forwards an image to the external classifier and
//! normalizes the heterogeneous reply into a uniform [`AnalysisResult`].
//!
//! Two backends satisfy the same `ClassifierBackend` contract:
//! - **Remote** — the production classifier service, reached over HTTP
//! - **Simulated** — seeded pseudo-random predictions after a fixed
//!   artificial delay, for development and tests without a model server

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::ClassifierConfig;
use crate::error::{LumenError, ValidationError};
use crate::models::{AnalysisResult, BoundingBox};

// ============================================================================
// ClassifierBackend trait
// ============================================================================

/// A classifier's verdict on one image, before the gateway merges in its own
/// timing measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub probability: f64,
    pub bounding_box: Option<BoundingBox>,
}

/// Abstraction over classifier implementations. A classifier is treated as a
/// pure function over the image bytes: (image) → (probability, region).
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn predict(&self, image: &[u8], mime: &str) -> Result<Prediction, ClassificationError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ClassificationError {
    /// Transport failure or timeout reaching the classifier.
    #[error("classifier unreachable: {0}")]
    Unreachable(String),

    /// Classifier answered with a non-success status.
    #[error("classifier rejected the request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// Classifier reply could not be parsed into a prediction shape.
    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),
}

impl From<ValidationError> for ClassificationError {
    fn from(e: ValidationError) -> Self {
        ClassificationError::MalformedResponse(e.to_string())
    }
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawBoundingBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrediction {
    probability: Option<f64>,
    bounding_box: Option<RawBoundingBox>,
}

#[derive(Debug, Deserialize)]
struct RejectionBody {
    detail: Option<String>,
}

/// Validate the classifier's loosely-typed reply against the prediction shape.
fn parse_prediction(raw: RawPrediction) -> Result<Prediction, ClassificationError> {
    let probability = raw
        .probability
        .ok_or_else(|| ClassificationError::MalformedResponse("missing probability".to_string()))?;
    if !(0.0..=1.0).contains(&probability) {
        return Err(ClassificationError::MalformedResponse(format!(
            "probability out of range: {probability}"
        )));
    }
    let bounding_box = match raw.bounding_box {
        Some(b) => Some(BoundingBox::new(b.x, b.y, b.width, b.height)?),
        None => None,
    };
    Ok(Prediction {
        probability,
        bounding_box,
    })
}

// ============================================================================
// RemoteClassifier
// ============================================================================

/// HTTP client for the external classifier service.
///
/// Single-attempt semantics: no retry, no cache. The configured request
/// timeout is the caller's latency budget; expiry surfaces as
/// [`ClassificationError::Unreachable`].
#[derive(Debug, Clone)]
pub struct RemoteClassifier {
    client: Client,
    base_url: String,
}

impl RemoteClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassificationError> {
        Self::with_base_url(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    /// Create a client with an explicit base URL and timeout (also used by
    /// tests to point at a mock server).
    pub fn with_base_url(base_url: String, timeout: Duration) -> Result<Self, ClassificationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassificationError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ClassifierBackend for RemoteClassifier {
    async fn predict(&self, image: &[u8], mime: &str) -> Result<Prediction, ClassificationError> {
        let url = format!("{}/predict/image/", self.base_url);

        let part = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name("image")
            .mime_str(mime)
            .map_err(|_| ClassificationError::Rejected {
                status: 415,
                detail: format!("unsupported content type: {mime}"),
            })?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClassificationError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClassificationError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<RejectionBody>(&body)
                .ok()
                .and_then(|b| b.detail)
                .unwrap_or_else(|| "classifier returned an error status".to_string());
            tracing::error!(status = status.as_u16(), detail = %detail, "classifier rejected request");
            return Err(ClassificationError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let raw: RawPrediction = serde_json::from_str(&body)
            .map_err(|e| ClassificationError::MalformedResponse(e.to_string()))?;
        parse_prediction(raw)
    }

    fn name(&self) -> &str {
        "remote"
    }
}

// ============================================================================
// SimulatedClassifier
// ============================================================================

/// Deterministic stand-in for the remote classifier: seeded pseudo-random
/// predictions after a fixed artificial delay. Satisfies the same contract
/// as [`RemoteClassifier`], so callers cannot tell the two apart.
pub struct SimulatedClassifier {
    delay: Duration,
    rng: Mutex<StdRng>,
}

impl SimulatedClassifier {
    pub fn new(seed: u64, delay: Duration) -> Self {
        Self {
            delay,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl ClassifierBackend for SimulatedClassifier {
    async fn predict(&self, _image: &[u8], _mime: &str) -> Result<Prediction, ClassificationError> {
        tokio::time::sleep(self.delay).await;

        let mut rng = self.rng.lock().await;
        let probability: f64 = rng.gen();
        // Mirror the real pipeline: a region is only localized for
        // positive-leaning classifications.
        let bounding_box = if probability > 0.5 {
            let x = rng.gen_range(0.0..0.6);
            let y = rng.gen_range(0.0..0.6);
            let width = rng.gen_range(0.1..0.4);
            let height = rng.gen_range(0.1..0.4);
            Some(BoundingBox::new(x, y, width, height)?)
        } else {
            None
        };
        Ok(Prediction {
            probability,
            bounding_box,
        })
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

// ============================================================================
// ClassificationGateway
// ============================================================================

/// Wraps a [`ClassifierBackend`] and owns the latency measurement: the
/// reported `processing_time_ms` is always the gateway's own wall-clock
/// measurement of the call, never a figure reported by the classifier, so
/// latency stays comparable across classifier implementations.
pub struct ClassificationGateway {
    backend: Box<dyn ClassifierBackend>,
}

impl ClassificationGateway {
    pub fn new(backend: Box<dyn ClassifierBackend>) -> Self {
        Self { backend }
    }

    /// Single-attempt analysis of one image. `image` must be non-empty.
    /// No persistence happens here; the only side effect is the outbound call.
    pub async fn analyze(
        &self,
        image: &[u8],
        mime: &str,
    ) -> Result<AnalysisResult, ClassificationError> {
        let start = Instant::now();
        let prediction = self.backend.predict(image, mime).await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            backend = self.backend.name(),
            probability = prediction.probability,
            took_ms = elapsed_ms,
            "classification complete"
        );

        Ok(AnalysisResult::new(
            prediction.probability,
            prediction.bounding_box,
            elapsed_ms,
        )?)
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

/// Create the configured backend wrapped in a gateway.
///
/// Reads `[classifier] backend` to select "remote" or "simulated".
pub fn create_gateway(config: &ClassifierConfig) -> Result<ClassificationGateway, LumenError> {
    let backend: Box<dyn ClassifierBackend> = match config.backend.as_str() {
        "remote" => Box::new(RemoteClassifier::new(config)?),
        "simulated" => Box::new(SimulatedClassifier::new(
            config.simulated_seed,
            Duration::from_millis(config.simulated_delay_ms),
        )),
        other => {
            return Err(LumenError::Other(format!(
                "unknown classifier backend: {other:?}"
            )))
        }
    };
    Ok(ClassificationGateway::new(backend))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_gateway(server: &MockServer, timeout: Duration) -> ClassificationGateway {
        let backend =
            RemoteClassifier::with_base_url(server.uri(), timeout).expect("Failed to create client");
        ClassificationGateway::new(Box::new(backend))
    }

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nnot-a-real-image";

    #[tokio::test]
    async fn test_analyze_normalizes_successful_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict/image/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "probability": 0.82,
                "boundingBox": { "x": 0.12, "y": 0.3, "width": 0.2, "height": 0.25 }
            })))
            .mount(&mock_server)
            .await;

        let gateway = test_gateway(&mock_server, Duration::from_secs(5));
        let result = gateway.analyze(PNG_BYTES, "image/png").await;

        let result = result.expect("Expected Ok");
        assert_eq!(result.probability, 0.82);
        let bbox = result.bounding_box.expect("Expected bounding box");
        assert_eq!(bbox.x, 0.12);
        assert_eq!(bbox.height, 0.25);
    }

    #[tokio::test]
    async fn test_analyze_without_bounding_box() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict/image/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "probability": 0.07 })),
            )
            .mount(&mock_server)
            .await;

        let gateway = test_gateway(&mock_server, Duration::from_secs(5));
        let result = gateway.analyze(PNG_BYTES, "image/png").await.unwrap();
        assert_eq!(result.probability, 0.07);
        assert!(result.bounding_box.is_none());
    }

    #[tokio::test]
    async fn test_rejected_carries_classifier_detail() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "detail": "Models are not loaded or unavailable."
            })))
            .mount(&mock_server)
            .await;

        let gateway = test_gateway(&mock_server, Duration::from_secs(5));
        match gateway.analyze(PNG_BYTES, "image/png").await {
            Err(ClassificationError::Rejected { status, detail }) => {
                assert_eq!(status, 503);
                assert_eq!(detail, "Models are not loaded or unavailable.");
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_without_detail_gets_generic_message() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let gateway = test_gateway(&mock_server, Duration::from_secs(5));
        match gateway.analyze(PNG_BYTES, "image/png").await {
            Err(ClassificationError::Rejected { status, detail }) => {
                assert_eq!(status, 500);
                assert!(!detail.is_empty());
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_probability_is_malformed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "label": "Opacity" })),
            )
            .mount(&mock_server)
            .await;

        let gateway = test_gateway(&mock_server, Duration::from_secs(5));
        match gateway.analyze(PNG_BYTES, "image/png").await {
            Err(ClassificationError::MalformedResponse(msg)) => {
                assert!(msg.contains("probability"), "got: {}", msg);
            }
            other => panic!("Expected MalformedResponse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_probability_is_malformed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "probability": 1.7 })),
            )
            .mount(&mock_server)
            .await;

        let gateway = test_gateway(&mock_server, Duration::from_secs(5));
        assert!(matches!(
            gateway.analyze(PNG_BYTES, "image/png").await,
            Err(ClassificationError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_bounding_box_is_malformed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "probability": 0.9,
                "boundingBox": { "x": 0.5, "y": 0.5, "width": 2.0, "height": 0.1 }
            })))
            .mount(&mock_server)
            .await;

        let gateway = test_gateway(&mock_server, Duration::from_secs(5));
        assert!(matches!(
            gateway.analyze(PNG_BYTES, "image/png").await,
            Err(ClassificationError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_unreachable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "probability": 0.5 }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let gateway = test_gateway(&mock_server, Duration::from_millis(100));
        let started = Instant::now();
        let result = gateway.analyze(PNG_BYTES, "image/png").await;

        assert!(
            started.elapsed() < Duration::from_secs(4),
            "analyze must not hang past the configured timeout"
        );
        assert!(matches!(result, Err(ClassificationError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // Nothing listens on this port.
        let backend = RemoteClassifier::with_base_url(
            "http://127.0.0.1:1".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        let gateway = ClassificationGateway::new(Box::new(backend));
        assert!(matches!(
            gateway.analyze(PNG_BYTES, "image/png").await,
            Err(ClassificationError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_processing_time_is_gateway_measured() {
        let mock_server = MockServer::start().await;
        // The classifier claims 1ms; the gateway must report its own
        // measurement, which includes the injected 80ms server delay.
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "probability": 0.4,
                        "processingTimeMs": 1
                    }))
                    .set_delay(Duration::from_millis(80)),
            )
            .mount(&mock_server)
            .await;

        let gateway = test_gateway(&mock_server, Duration::from_secs(5));
        let result = gateway.analyze(PNG_BYTES, "image/png").await.unwrap();
        assert!(
            result.processing_time_ms >= 80,
            "expected >= 80ms, got {}",
            result.processing_time_ms
        );
    }

    #[tokio::test]
    async fn test_simulated_backend_is_deterministic_per_seed() {
        let a = SimulatedClassifier::new(42, Duration::ZERO);
        let b = SimulatedClassifier::new(42, Duration::ZERO);
        let c = SimulatedClassifier::new(7, Duration::ZERO);

        let pa = a.predict(PNG_BYTES, "image/png").await.unwrap();
        let pb = b.predict(PNG_BYTES, "image/png").await.unwrap();
        let pc = c.predict(PNG_BYTES, "image/png").await.unwrap();

        assert_eq!(pa, pb, "same seed must yield the same prediction");
        assert_ne!(pa, pc, "different seeds should diverge");
    }

    #[tokio::test]
    async fn test_simulated_backend_yields_valid_predictions() {
        let backend = SimulatedClassifier::new(1, Duration::ZERO);
        for _ in 0..50 {
            let p = backend.predict(PNG_BYTES, "image/png").await.unwrap();
            assert!((0.0..=1.0).contains(&p.probability));
            if let Some(b) = p.bounding_box {
                assert!(b.x + b.width <= 1.0);
                assert!(b.y + b.height <= 1.0);
            }
        }
    }

    #[tokio::test]
    async fn test_create_gateway_selects_backend() {
        let config = ClassifierConfig {
            backend: "simulated".to_string(),
            base_url: String::new(),
            timeout_seconds: 1,
            simulated_seed: 0,
            simulated_delay_ms: 0,
        };
        let gateway = create_gateway(&config).unwrap();
        assert_eq!(gateway.backend_name(), "simulated");

        let config = ClassifierConfig {
            backend: "quantum".to_string(),
            ..config
        };
        assert!(create_gateway(&config).is_err());
    }
}
