use std::{fmt, str::FromStr, thread, time::Duration};

use anyhow::Context as _;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{Value, json};

use crate::{
    config::Config,
    error::{WallprinterError, WallprinterResult},
    imageio,
};

/// An image passed to the model inline (base64 in the request body).
#[derive(Clone, Debug, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl InlineImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            mime_type: imageio::sniff_mime(&bytes).to_string(),
            bytes,
        }
    }

    pub fn png(img: &image::RgbaImage) -> WallprinterResult<Self> {
        Ok(Self {
            mime_type: "image/png".to_string(),
            bytes: imageio::encode_png(img)?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct EditRequest {
    pub prompt: String,
    /// Ordered inputs. For placement: scene first, then guide.
    pub images: Vec<InlineImage>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    Landscape16x9,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait3x4 => "3:4",
            Self::Landscape4x3 => "4:3",
            Self::Portrait9x16 => "9:16",
            Self::Landscape16x9 => "16:9",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = WallprinterError;

    fn from_str(s: &str) -> WallprinterResult<Self> {
        match s.trim() {
            "1:1" => Ok(Self::Square),
            "3:4" => Ok(Self::Portrait3x4),
            "4:3" => Ok(Self::Landscape4x3),
            "9:16" => Ok(Self::Portrait9x16),
            "16:9" => Ok(Self::Landscape16x9),
            other => Err(WallprinterError::validation(format!(
                "unsupported aspect ratio '{other}' (expected 1:1, 3:4, 4:3, 9:16, 16:9)"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Any text the model returned alongside the image.
    pub text: Option<String>,
}

impl GeneratedImage {
    pub fn decode(&self) -> WallprinterResult<image::RgbaImage> {
        imageio::decode_rgba(&self.bytes)
    }
}

pub trait ImageModel {
    fn edit(&self, req: &EditRequest) -> WallprinterResult<GeneratedImage>;
    fn generate(&self, req: &GenerateRequest) -> WallprinterResult<GeneratedImage>;
}

impl<M: ImageModel + ?Sized> ImageModel for &M {
    fn edit(&self, req: &EditRequest) -> WallprinterResult<GeneratedImage> {
        (**self).edit(req)
    }

    fn generate(&self, req: &GenerateRequest) -> WallprinterResult<GeneratedImage> {
        (**self).generate(req)
    }
}

pub fn placement_prompt(extra: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are given two images. The first is a photo of a real scene. The second is the same \
         photo with an artwork roughly placed inside a marked area. Produce a photorealistic \
         version of the first photo with the artwork hung or printed in exactly that area: follow \
         the area's perspective and shape, match the scene's lighting, shadows, grain and surface \
         texture, and leave everything outside the area unchanged. Do not add frames, text or \
         borders that are not in the artwork. Return only the image.",
    );
    if let Some(extra) = extra.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("\nAdditional instructions: ");
        prompt.push_str(extra);
    }
    prompt
}

pub fn scene_edit_prompt(instruction: &str) -> String {
    format!(
        "Edit this photo as follows, keeping it photorealistic and leaving unrelated parts \
         untouched: {}. Return only the edited image.",
        instruction.trim()
    )
}

pub fn artwork_prompt(description: &str) -> String {
    format!(
        "A flat, front-facing, full-bleed artwork suitable for printing, with no frame, wall or \
         surroundings visible: {}",
        description.trim()
    )
}

pub struct GeminiClient {
    api_base: String,
    api_key: String,
    edit_model: String,
    generate_model: String,
    timeout: Duration,
    transport_retries: usize,
    retry_backoff: Duration,
    http: HttpClient,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_base", &self.api_base)
            .field("edit_model", &self.edit_model)
            .field("generate_model", &self.generate_model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn from_config(cfg: &Config) -> WallprinterResult<Self> {
        let api_key = cfg.gemini_api_key.clone().ok_or_else(|| {
            WallprinterError::validation("GEMINI_API_KEY or GOOGLE_API_KEY not set")
        })?;
        let http = HttpClient::builder()
            .build()
            .context("build http client")?;
        Ok(Self {
            api_base: cfg.gemini_api_base.trim().trim_end_matches('/').to_string(),
            api_key,
            edit_model: cfg.edit_model.clone(),
            generate_model: cfg.generate_model.clone(),
            timeout: Duration::from_secs(cfg.request_timeout_secs.max(1)),
            transport_retries: cfg.transport_retries,
            retry_backoff: Duration::try_from_secs_f64(cfg.retry_backoff_secs).unwrap_or_default(),
            http,
        })
    }

    pub fn endpoint(&self, model: &str, method: &str) -> String {
        model_endpoint(&self.api_base, model, method)
    }

    fn post(&self, endpoint: &str, payload: &Value) -> WallprinterResult<Value> {
        let mut attempt = 0usize;
        let response = loop {
            let sent = self
                .http
                .post(endpoint)
                .query(&[("key", self.api_key.as_str())])
                .timeout(self.timeout)
                .json(payload)
                .send();
            match sent {
                Ok(resp) => break resp,
                Err(err) if is_retryable(&err) && attempt < self.transport_retries => {
                    // The key travels in the query string; keep it out of logs.
                    let err = err.without_url();
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max = self.transport_retries,
                        error = %err,
                        "model request failed; retrying"
                    );
                    thread::sleep(self.retry_backoff * attempt as u32);
                }
                Err(err) => {
                    return Err(anyhow::Error::new(err.without_url())
                        .context(format!("model request failed ({endpoint})"))
                        .into());
                }
            }
        };
        response_json_or_error("model", response)
    }
}

impl ImageModel for GeminiClient {
    #[tracing::instrument(skip_all, fields(model = %self.edit_model, images = req.images.len()))]
    fn edit(&self, req: &EditRequest) -> WallprinterResult<GeneratedImage> {
        let endpoint = self.endpoint(&self.edit_model, "generateContent");
        let payload = edit_payload(req);
        let started = std::time::Instant::now();
        let body = self.post(&endpoint, &payload)?;
        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "edit response");
        extract_inline_image(&body)
    }

    #[tracing::instrument(
        skip_all,
        fields(model = %self.generate_model, aspect = %req.aspect_ratio)
    )]
    fn generate(&self, req: &GenerateRequest) -> WallprinterResult<GeneratedImage> {
        let endpoint = self.endpoint(&self.generate_model, "predict");
        let payload = generate_payload(req);
        let body = self.post(&endpoint, &payload)?;
        extract_prediction(&body)
    }
}

pub fn model_endpoint(api_base: &str, model: &str, method: &str) -> String {
    let trimmed = model.trim();
    let model_path = if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    format!("{}/{}:{}", api_base.trim_end_matches('/'), model_path, method)
}

pub fn edit_payload(req: &EditRequest) -> Value {
    let mut parts: Vec<Value> = req
        .images
        .iter()
        .map(|img| {
            json!({
                "inlineData": {
                    "mimeType": img.mime_type,
                    "data": BASE64.encode(&img.bytes),
                }
            })
        })
        .collect();
    parts.push(json!({ "text": req.prompt }));

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
    })
}

pub fn generate_payload(req: &GenerateRequest) -> Value {
    json!({
        "instances": [{ "prompt": req.prompt }],
        "parameters": {
            "sampleCount": 1,
            "aspectRatio": req.aspect_ratio.as_str(),
        },
    })
}

/// First inline image among the response candidates, with any text parts joined.
pub fn extract_inline_image(body: &Value) -> WallprinterResult<GeneratedImage> {
    let mut texts = Vec::new();
    let candidates = body
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut found = None;
    for part in candidates
        .iter()
        .filter_map(|c| c.get("content")?.get("parts")?.as_array())
        .flatten()
    {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            let text = text.trim();
            if !text.is_empty() {
                texts.push(text.to_string());
            }
            continue;
        }
        if found.is_some() {
            continue;
        }
        let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
            continue;
        };
        let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .context("model image base64 decode failed")?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| imageio::sniff_mime(&bytes).to_string());
        found = Some((bytes, mime_type));
    }

    let text = (!texts.is_empty()).then(|| texts.join("\n"));
    match found {
        Some((bytes, mime_type)) => Ok(GeneratedImage {
            bytes,
            mime_type,
            text,
        }),
        None => Err(no_image_error(body, text)),
    }
}

pub fn extract_prediction(body: &Value) -> WallprinterResult<GeneratedImage> {
    let predictions = body
        .get("predictions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for p in predictions {
        let Some(data) = p.get("bytesBase64Encoded").and_then(Value::as_str) else {
            continue;
        };
        let bytes = BASE64
            .decode(data.as_bytes())
            .context("model image base64 decode failed")?;
        let mime_type = p
            .get("mimeType")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| imageio::sniff_mime(&bytes).to_string());
        return Ok(GeneratedImage {
            bytes,
            mime_type,
            text: None,
        });
    }
    Err(no_image_error(body, None))
}

fn no_image_error(body: &Value, text: Option<String>) -> WallprinterError {
    if let Some(reason) = body
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(Value::as_str)
    {
        return WallprinterError::api(format!("request blocked by the model: {reason}"));
    }
    if let Some(reason) = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("finishReason"))
        .and_then(Value::as_str)
        .filter(|r| *r != "STOP")
    {
        return WallprinterError::api(format!("model returned no image (finish reason {reason})"));
    }
    match text {
        Some(text) => WallprinterError::api(format!(
            "model returned no image: {}",
            truncate(&text, 512)
        )),
        None => WallprinterError::api("model returned no image"),
    }
}

pub(crate) fn response_json_or_error(
    service: &str,
    response: HttpResponse,
) -> WallprinterResult<Value> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("{service} response body read failed"))?;
    if !status.is_success() {
        return Err(WallprinterError::api(format!(
            "{service} request failed ({}): {}",
            status.as_u16(),
            truncate(&body, 512)
        )));
    }
    serde_json::from_str(&body)
        .map_err(|e| WallprinterError::serde(format!("{service} returned invalid JSON: {e}")))
}

pub(crate) fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_adds_models_prefix_once() {
        assert_eq!(
            model_endpoint("https://x/v1beta/", "gemini-x", "generateContent"),
            "https://x/v1beta/models/gemini-x:generateContent"
        );
        assert_eq!(
            model_endpoint("https://x", "models/imagen", "predict"),
            "https://x/models/imagen:predict"
        );
    }

    #[test]
    fn edit_payload_orders_images_then_text() {
        let req = EditRequest {
            prompt: "place it".to_string(),
            images: vec![
                InlineImage {
                    mime_type: "image/png".to_string(),
                    bytes: vec![1, 2, 3],
                },
                InlineImage {
                    mime_type: "image/jpeg".to_string(),
                    bytes: vec![4],
                },
            ],
        };
        let v = edit_payload(&req);
        let parts = v["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[2]["text"], "place it");
        assert_eq!(
            v["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
    }

    #[test]
    fn generate_payload_carries_aspect() {
        let v = generate_payload(&GenerateRequest {
            prompt: "a cat".to_string(),
            aspect_ratio: "16:9".parse().unwrap(),
        });
        assert_eq!(v["instances"][0]["prompt"], "a cat");
        assert_eq!(v["parameters"]["aspectRatio"], "16:9");
        assert_eq!(v["parameters"]["sampleCount"], 1);
    }

    #[test]
    fn aspect_ratio_parse() {
        assert_eq!("3:4".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait3x4);
        assert!("2:1".parse::<AspectRatio>().is_err());
        assert_eq!(AspectRatio::default().to_string(), "1:1");
    }

    #[test]
    fn extracts_inline_image_with_either_casing() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here you go." },
                    { "inline_data": { "mime_type": "image/png", "data": "AQID" } },
                    { "inlineData": { "mimeType": "image/jpeg", "data": "BAUG" } }
                ]}
            }]
        });
        let img = extract_inline_image(&body).unwrap();
        assert_eq!(img.bytes, vec![1, 2, 3]);
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.text.as_deref(), Some("Here you go."));
    }

    #[test]
    fn missing_image_reports_block_reason_or_text() {
        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = extract_inline_image(&blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));

        let refused = json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't do that." }] } }]
        });
        let err = extract_inline_image(&refused).unwrap_err();
        assert!(err.to_string().contains("I can't do that."));

        let stopped = json!({ "candidates": [{ "finishReason": "IMAGE_SAFETY" }] });
        let err = extract_inline_image(&stopped).unwrap_err();
        assert!(err.to_string().contains("IMAGE_SAFETY"));

        assert!(extract_inline_image(&json!({})).is_err());
    }

    #[test]
    fn extracts_prediction() {
        let body = json!({
            "predictions": [{ "bytesBase64Encoded": "AQID", "mimeType": "image/png" }]
        });
        let img = extract_prediction(&body).unwrap();
        assert_eq!(img.bytes, vec![1, 2, 3]);
        assert!(extract_prediction(&json!({ "predictions": [] })).is_err());
    }

    #[test]
    fn bad_base64_is_an_error() {
        let body = json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "***" } }
            ]}}]
        });
        assert!(extract_inline_image(&body).is_err());
    }

    #[test]
    fn prompts_include_user_text() {
        assert!(placement_prompt(Some("matte finish")).contains("matte finish"));
        assert!(!placement_prompt(Some("  ")).contains("Additional"));
        assert!(scene_edit_prompt(" remove the lamp ").contains("remove the lamp."));
        assert!(artwork_prompt("blue waves").ends_with("blue waves"));
    }

    #[test]
    fn client_requires_key() {
        let err = GeminiClient::from_config(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
