//! Typed response records for the documented endpoints, plus the probe
//! helpers that separate transport failures from schema mismatches.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("schema mismatch: {0}")]
    Schema(#[from] serde_json::Error),
}

/// GET a URL and decode the success body into a typed record. A non-success
/// status or an undecodable body are distinct failures.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, ProbeError> {
    let resp = client.get(url).send().await?;
    decode(resp).await
}

/// POST a JSON body and decode the success response.
pub async fn post_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    body: &Value,
) -> Result<T, ProbeError> {
    let resp = client.post(url).json(body).send().await?;
    decode(resp).await
}

/// POST a JSON body and return the raw status plus body text, for checks
/// that expect specific non-success statuses (duplicate registration).
pub async fn post_raw(
    client: &reqwest::Client,
    url: &str,
    body: &Value,
) -> Result<(u16, String), ProbeError> {
    let resp = client.post(url).json(body).send().await?;
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    Ok((status, text))
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ProbeError> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(ProbeError::UnexpectedStatus {
            status: status.as_u16(),
            body: truncate(&text, 200),
        });
    }
    Ok(serde_json::from_str(&text)?)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

// --- Endpoint response records ---

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct MedicineRecord {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchAnalysis {
    pub confidence: f64,
    pub severity: String,
}

#[derive(Debug, Deserialize)]
pub struct MedicineSearchResponse {
    pub total_results: i64,
    pub medicines: Vec<MedicineRecord>,
    pub ai_analysis: SearchAnalysis,
}

#[derive(Debug, Deserialize)]
pub struct IndicationResponse {
    pub total_results: i64,
    pub medicines: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationAnalysis {
    pub natural_options: Value,
    pub high_confidence_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct EnhancedMedicineRecommendations {
    pub recommendations: Vec<Value>,
    pub ai_analysis: RecommendationAnalysis,
}

#[derive(Debug, Deserialize)]
pub struct SymptomAnalysis {
    pub detected_symptoms: Vec<String>,
    pub overall_confidence: f64,
}

#[derive(Debug, Deserialize)]
pub struct TreatmentOptions {
    pub allopathy: Value,
    pub naturopathy: Value,
    pub lifestyle: Value,
}

#[derive(Debug, Deserialize)]
pub struct SymptomAnalysisResponse {
    pub success: bool,
    pub analysis: SymptomAnalysis,
    pub treatment_options: TreatmentOptions,
}

#[derive(Debug, Deserialize)]
pub struct EnhancedRecommendationsResponse {
    pub success: bool,
    pub confidence_score: f64,
    pub treatment_approach: String,
    pub recommendations: Value,
}

#[derive(Debug, Deserialize)]
pub struct SafetyInformation {
    pub safety_score: Value,
    pub drug_interactions: Vec<Value>,
    pub warnings: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct MedicineDetailsResponse {
    pub safety_information: SafetyInformation,
    pub patient_counseling: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct PredictResponse {
    pub prediction: Value,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
pub struct CombinedResponse {
    pub medicines: Vec<Value>,
    pub recommendations: Vec<Value>,
}
