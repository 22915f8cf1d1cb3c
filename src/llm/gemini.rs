use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::GeminiSettings;
use crate::error::BackendError;
use crate::fetch::FetchedImage;
use crate::llm::backend::{EditPass, EditRequest, ImageEditBackend, VisionBackend};
use crate::llm::media::{summarize_error_body, truncate_for_log};
use crate::prompts::{construct_instruction, erase_instruction, single_pass_instruction};
use crate::utils::http::build_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

/// Vision audits and region edits through the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    settings: GeminiSettings,
}

fn inline_image_part(image: &FetchedImage) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": general_purpose::STANDARD.encode(&image.bytes)
        }
    })
}

fn summarize_gemini_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let mut summarized_contents = Vec::new();
        for content in contents {
            let role = content
                .get("role")
                .and_then(|value| value.as_str())
                .unwrap_or("user");
            let parts = content
                .get("parts")
                .and_then(|value| value.as_array())
                .map(|parts| summarize_gemini_parts(parts))
                .unwrap_or_default();
            summarized_contents.push(json!({ "role": role, "parts": parts }));
        }
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    Value::Object(summary)
}

fn candidate_parts(response: &GeminiResponse) -> impl Iterator<Item = &GeminiPart> {
    response
        .candidates
        .iter()
        .flatten()
        .filter_map(|candidate| candidate.content.as_ref())
        .filter_map(|content| content.parts.as_ref())
        .flatten()
}

fn finish_reason(response: &GeminiResponse) -> String {
    response
        .candidates
        .as_deref()
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.finish_reason.clone())
        .unwrap_or_else(|| "N/A".to_string())
}

fn extract_text_from_response(response: &GeminiResponse) -> String {
    candidate_parts(response)
        .filter_map(|part| match part {
            GeminiPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .concat()
}

/// First decodable image part; text parts are logged as the model's commentary.
fn extract_image_from_response(response: &GeminiResponse) -> Option<Vec<u8>> {
    for part in candidate_parts(response) {
        match part {
            GeminiPart::Text { text } => {
                debug!(target: "llm.gemini", "Image model text: {}", truncate_for_log(text, 200));
            }
            GeminiPart::InlineData { inline_data } if inline_data.mime_type.starts_with("image/") => {
                match general_purpose::STANDARD.decode(&inline_data.data) {
                    Ok(bytes) if !bytes.is_empty() => return Some(bytes),
                    Ok(_) => {}
                    Err(err) => warn!("Gemini returned undecodable image data: {err}"),
                }
            }
            _ => {}
        }
    }
    None
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Result<Self, BackendError> {
        let client = build_http_client(settings.timeout)
            .map_err(|err| BackendError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, settings })
    }

    fn redact(&self, text: &str) -> String {
        let key = self.settings.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.settings.base_url, model)
    }

    async fn generate_content(
        &self,
        model: &str,
        payload: Value,
    ) -> Result<GeminiResponse, BackendError> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(&payload);
            debug!(target: "llm.gemini", model = model, payload = %payload_summary);
        }

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={})",
                    self.redact(&err.to_string()),
                    err.is_timeout(),
                    err.is_connect()
                );
                BackendError::from_reqwest(&err, |text| self.redact(text))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            return Err(BackendError::Status {
                status,
                message: self.redact(&message.unwrap_or(body_summary)),
            });
        }

        let value = response
            .json::<GeminiResponse>()
            .await
            .map_err(|err| BackendError::from_reqwest(&err, |text| self.redact(text)))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let image_parts = candidate_parts(&value)
                .filter(|part| matches!(part, GeminiPart::InlineData { .. }))
                .count();
            debug!(
                target: "llm.gemini",
                model = model,
                image_parts = image_parts,
                finish_reason = %finish_reason(&value)
            );
        }
        Ok(value)
    }
}

#[async_trait]
impl VisionBackend for GeminiClient {
    async fn analyze(&self, image: &FetchedImage, prompt: &str) -> Result<String, BackendError> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }, inline_image_part(image)]
            }],
            "generationConfig": {
                "responseModalities": ["TEXT"],
                "responseMimeType": "application/json"
            }
        });

        let model = self.settings.text_model.as_str();
        let metadata = json!({ "image_bytes": image.bytes.len(), "mime_type": image.mime_type });
        log_llm_timing("gemini", model, "audit", Some(metadata), || async {
            let response = self.generate_content(model, payload).await?;
            let text = extract_text_from_response(&response);
            if text.trim().is_empty() {
                return Err(BackendError::EmptyReply(format!(
                    "no text in Gemini response (finish reason: {})",
                    finish_reason(&response)
                )));
            }
            Ok(text)
        })
        .await
    }
}

#[async_trait]
impl ImageEditBackend for GeminiClient {
    async fn edit(&self, request: EditRequest<'_>) -> Result<Vec<u8>, BackendError> {
        let build: fn(&str, &str, f32, Option<u32>) -> String = match request.pass {
            EditPass::Erase => erase_instruction,
            EditPass::Construct => construct_instruction,
            EditPass::Single => single_pass_instruction,
        };
        let instruction = build(
            request.search_region,
            request.prompt,
            request.strength,
            request.grow_mask,
        );
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": instruction }, inline_image_part(request.image)]
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"]
            }
        });

        let model = self.settings.image_model.as_str();
        let metadata = json!({
            "pass": request.pass.to_string(),
            "region": truncate_for_log(request.search_region, 120),
            "strength": request.strength,
        });
        log_llm_timing("gemini", model, "edit", Some(metadata), || async {
            let response = self.generate_content(model, payload).await?;
            extract_image_from_response(&response).ok_or_else(|| {
                BackendError::EmptyReply(format!(
                    "no image returned by Gemini (model: {model}, finish reason: {})",
                    finish_reason(&response)
                ))
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(value: Value) -> GeminiResponse {
        serde_json::from_value(value).expect("response shape")
    }

    #[test]
    fn text_parts_are_joined() {
        let parsed = response(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] },
                "finishReason": "STOP"
            }]
        }));
        assert_eq!(extract_text_from_response(&parsed), "{\"a\":1}");
        assert_eq!(finish_reason(&parsed), "STOP");
    }

    #[test]
    fn string_literal_split_across_parts_stays_valid_json() {
        let parsed = response(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "{\"compliance_note\": \"AODA 4.1" },
                    { "text": ".3 grab bars\"}" }
                ] }
            }]
        }));
        let text = extract_text_from_response(&parsed);
        let value: Value = serde_json::from_str(&text).expect("joined reply is JSON");
        assert_eq!(value["compliance_note"], "AODA 4.1.3 grab bars");
    }

    #[test]
    fn first_image_part_is_decoded() {
        let encoded = general_purpose::STANDARD.encode(b"after-photo");
        let parsed = response(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here is the renovated bathroom." },
                    { "thought": true },
                    { "inlineData": { "mimeType": "image/png", "data": encoded } }
                ] }
            }]
        }));
        assert_eq!(extract_image_from_response(&parsed), Some(b"after-photo".to_vec()));
    }

    #[test]
    fn text_only_reply_has_no_image() {
        let parsed = response(json!({
            "candidates": [{ "content": { "parts": [{ "text": "I cannot edit this photo." }] } }]
        }));
        assert_eq!(extract_image_from_response(&parsed), None);

        let blocked = response(json!({ "candidates": [{ "finishReason": "SAFETY" }] }));
        assert_eq!(extract_image_from_response(&blocked), None);
        assert_eq!(extract_text_from_response(&blocked), "");
    }

    #[test]
    fn payload_summary_hides_image_data() {
        let image = FetchedImage {
            bytes: vec![1, 2, 3, 4],
            mime_type: "image/jpeg".to_string(),
        };
        let payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": "audit" }, inline_image_part(&image)] }]
        });
        let summary = summarize_gemini_payload(&payload).to_string();
        assert!(summary.contains("dataLen"));
        assert!(!summary.contains("AQIDBA=="));
    }

    #[test]
    fn api_key_is_redacted() {
        let client = GeminiClient::new(GeminiSettings {
            api_key: "secret-key".to_string(),
            base_url: "https://example.invalid/v1beta".to_string(),
            text_model: "text".to_string(),
            image_model: "image".to_string(),
            timeout: std::time::Duration::from_secs(1),
        })
        .expect("client");
        assert_eq!(
            client.redact("bad key secret-key in url"),
            "bad key [redacted] in url"
        );
        assert_eq!(
            client.endpoint("gemini-2.5-flash-image"),
            "https://example.invalid/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
    }
}
