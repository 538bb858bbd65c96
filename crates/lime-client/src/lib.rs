use async_trait::async_trait;
use lime_config::AssistantSettings;
use lime_core::{AssistantClient, HistoryEntry, LimeError, Part, Result, Role};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// [`AssistantClient`] backed by the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    image_model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(settings: &AssistantSettings) -> Result<Self> {
        let api_key = settings.api_key()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| LimeError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        info!("Gemini client ready for model {}", settings.model);
        Ok(Self {
            client,
            api_key,
            model: settings.model.clone(),
            image_model: settings.image_model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generates one JPEG with the image model and returns it as a data URI.
    ///
    /// `Ok(None)` means the call succeeded but no image came back.
    pub async fn generate_image(&self, prompt: &str) -> Result<Option<String>> {
        let request = PredictRequest {
            instances: vec![PredictInstance {
                prompt: prompt.to_string(),
            }],
            parameters: PredictParameters {
                sample_count: 1,
                output_mime_type: "image/jpeg".to_string(),
            },
        };

        let response: PredictResponse = self.post(&self.image_model, "predict", &request).await?;
        Ok(extract_image(response))
    }

    async fn post<B, R>(&self, model: &str, method: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}:{}", self.base_url, model, method);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| LimeError::ServiceError(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| LimeError::ServiceError(format!("Failed to parse Gemini response: {e}")))
    }
}

#[async_trait]
impl AssistantClient for GeminiClient {
    async fn generate_answer(&self, prompt: &str, history: &[HistoryEntry]) -> Result<String> {
        let request = build_generate_request(prompt, history);
        debug!("Sending {} content entries to {}", request.contents.len(), self.model);

        let response: GenerateContentResponse =
            self.post(&self.model, "generateContent", &request).await?;
        extract_text_response(response)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<HistoryEntry>,
}

fn build_generate_request(prompt: &str, history: &[HistoryEntry]) -> GenerateContentRequest {
    let mut contents = history.to_vec();
    contents.push(HistoryEntry {
        role: Role::User,
        parts: vec![Part {
            text: prompt.to_string(),
        }],
    });
    GenerateContentRequest { contents }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Concatenates every text part of the first candidate.
fn extract_text_response(response: GenerateContentResponse) -> Result<String> {
    response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .filter(|text| !text.is_empty())
        .ok_or_else(|| LimeError::ServiceError("Gemini returned no text in the response".into()))
}

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    output_mime_type: String,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

fn extract_image(response: PredictResponse) -> Option<String> {
    let prediction = response.predictions.into_iter().next()?;
    let bytes = prediction.bytes_base64_encoded.filter(|b| !b.is_empty())?;
    let mime_type = prediction
        .mime_type
        .unwrap_or_else(|| "image/jpeg".to_string());
    Some(format!("data:{mime_type};base64,{bytes}"))
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn map_http_error(status: StatusCode, body: &str) -> LimeError {
    let detail = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let message = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() {
                message
            } else {
                format!("{status_text}: {message}")
            }
        })
        .unwrap_or_else(|_| body.to_string());

    LimeError::ServiceError(format!("Gemini returned {}: {}", status.as_u16(), detail))
}
