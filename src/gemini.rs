use crate::config::GeminiConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// One item of an ordered multimodal payload. Part order is meaningful to
/// the model: instruction text must precede the images it governs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Image { media_type: String, bytes: Vec<u8> },
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text(s.into())
    }
}

/// Which model a call runs on. Pro trades latency for quality and is used
/// once per run; Flash runs several times per frame and is cost sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Pro,
    Flash,
}

#[async_trait]
pub trait GenerativeClient: Send + Sync + Debug {
    /// Free-text generation.
    async fn generate(&self, tier: ModelTier, parts: &[Part]) -> Result<String>;

    /// Schema-constrained generation; the response body is the raw JSON text.
    async fn generate_json(
        &self,
        tier: ModelTier,
        parts: &[Part],
        schema: serde_json::Value,
    ) -> Result<String>;

    /// Image generation. Returns the first inline image payload of the
    /// response, or None when the response carries no image.
    async fn generate_image(&self, parts: &[Part], aspect_ratio: &str)
        -> Result<Option<Vec<u8>>>;
}

pub fn create_client(config: &GeminiConfig) -> Box<dyn GenerativeClient> {
    Box::new(GeminiClient::new(config))
}

#[derive(Debug)]
pub struct GeminiClient {
    api_key: String,
    pro_model: String,
    flash_model: String,
    image_model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            pro_model: config.pro_model.clone(),
            flash_model: config.flash_model.clone(),
            image_model: config.image_model.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Pro => &self.pro_model,
            ModelTier::Flash => &self.flash_model,
        }
    }

    async fn call(&self, model: &str, request: &GeminiRequest) -> Result<GeminiResponse> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model, self.api_key
        );

        let resp = self.client.post(&url).json(request).send().await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Gemini API error: {}", error_text));
        }

        let response_text = resp.text().await?;
        let result: GeminiResponse = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => {
                return Err(anyhow!(
                    "Failed to parse Gemini response: {}. Body: {}",
                    e,
                    response_text
                ))
            }
        };

        if let Some(err) = result.error {
            return Err(anyhow!("Gemini API returned error: {}", err.message));
        }

        Ok(result)
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, tier: ModelTier, parts: &[Part]) -> Result<String> {
        let request = GeminiRequest::from_parts(parts, None);
        let response = self.call(self.model_for(tier), &request).await?;
        response.first_text()
    }

    async fn generate_json(
        &self,
        tier: ModelTier,
        parts: &[Part],
        schema: serde_json::Value,
    ) -> Result<String> {
        let request = GeminiRequest::from_parts(
            parts,
            Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(schema),
                response_modalities: None,
                image_config: None,
            }),
        );
        let response = self.call(self.model_for(tier), &request).await?;
        response.first_text()
    }

    async fn generate_image(
        &self,
        parts: &[Part],
        aspect_ratio: &str,
    ) -> Result<Option<Vec<u8>>> {
        let request = GeminiRequest::from_parts(
            parts,
            Some(GenerationConfig {
                response_mime_type: None,
                response_schema: None,
                response_modalities: Some(vec!["IMAGE".to_string(), "TEXT".to_string()]),
                image_config: Some(ImageConfig {
                    aspect_ratio: aspect_ratio.to_string(),
                }),
            }),
        );
        let response = self.call(&self.image_model, &request).await?;
        response.first_image()
    }
}

// --- Wire format ---

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl GeminiRequest {
    fn from_parts(parts: &[Part], generation_config: Option<GenerationConfig>) -> Self {
        let wire_parts = parts
            .iter()
            .map(|p| match p {
                Part::Text(text) => GeminiPart {
                    text: Some(text.clone()),
                    inline_data: None,
                },
                Part::Image { media_type, bytes } => GeminiPart {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: media_type.clone(),
                        data: base64::engine::general_purpose::STANDARD.encode(bytes),
                    }),
                },
            })
            .collect();

        Self {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: wire_parts,
            }],
            generation_config,
        }
    }
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(rename = "responseSchema", skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
    #[serde(rename = "responseModalities", skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(rename = "imageConfig", skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Serialize)]
struct ImageConfig {
    #[serde(rename = "aspectRatio")]
    aspect_ratio: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

impl GeminiResponse {
    fn first_text(&self) -> Result<String> {
        if let Some(candidates) = &self.candidates {
            if let Some(first) = candidates.first() {
                if let Some(content) = &first.content {
                    if let Some(text) = content.parts.iter().find_map(|p| p.text.as_ref()) {
                        return Ok(text.clone());
                    }
                }

                let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
                return Err(anyhow!("Gemini response empty. Finish reason: {}", reason));
            }
        }

        Err(anyhow!("Gemini response format unexpected or empty"))
    }

    fn first_image(&self) -> Result<Option<Vec<u8>>> {
        let Some(candidates) = &self.candidates else {
            return Ok(None);
        };
        let Some(first) = candidates.first() else {
            return Ok(None);
        };
        let Some(content) = &first.content else {
            return Ok(None);
        };

        for part in &content.parts {
            if let Some(inline) = &part.inline_data {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(&inline.data)
                    .map_err(|e| anyhow!("Invalid inline image data: {}", e))?;
                return Ok(Some(bytes));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_parts_in_order() {
        let parts = vec![
            Part::text("instruction first"),
            Part::Image {
                media_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            },
        ];
        let request = GeminiRequest::from_parts(&parts, None);
        let json = serde_json::to_value(&request).unwrap();

        let wire_parts = &json["contents"][0]["parts"];
        assert_eq!(wire_parts[0]["text"], "instruction first");
        assert_eq!(wire_parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(wire_parts[1]["inlineData"]["data"], "AQID");
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn test_request_serializes_image_generation_config() {
        let request = GeminiRequest::from_parts(
            &[Part::text("p")],
            Some(GenerationConfig {
                response_mime_type: None,
                response_schema: None,
                response_modalities: Some(vec!["IMAGE".to_string(), "TEXT".to_string()]),
                image_config: Some(ImageConfig {
                    aspect_ratio: "16:9".to_string(),
                }),
            }),
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["responseModalities"][0], "IMAGE");
        assert_eq!(json["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
    }

    #[test]
    fn test_response_parsing_success() {
        let json = r#"{
            "candidates": [
                {
                    "content": {
                        "parts": [
                            { "text": "Hello world" }
                        ],
                        "role": "model"
                    },
                    "finishReason": "STOP",
                    "index": 0
                }
            ]
        }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(result.first_text().unwrap(), "Hello world");
    }

    #[test]
    fn test_response_parsing_safety_block() {
        // Content blocked: candidate present but no content/parts.
        let json = r#"{
            "candidates": [
                {
                    "finishReason": "SAFETY",
                    "index": 0
                }
            ]
        }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        let err = result.first_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_response_first_image_extraction() {
        let json = r#"{
            "candidates": [
                {
                    "content": {
                        "parts": [
                            { "text": "caption" },
                            { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
                        ]
                    },
                    "finishReason": "STOP"
                }
            ]
        }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(result.first_image().unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_response_first_image_absent_is_none() {
        let json = r#"{
            "candidates": [
                {
                    "content": { "parts": [ { "text": "no image here" } ] },
                    "finishReason": "STOP"
                }
            ]
        }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(result.first_image().unwrap(), None);
    }
}
