//! 언어 모델 모듈 - 답변 생성
//!
//! 질문당 한 번의 `generate` 호출만 사용합니다 (에이전트 루프/툴 호출 없음).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::embedding::{get_api_key, RateLimiter};

/// Gemini generateContent 엔드포인트 (모델 이름은 경로에 삽입)
const GEMINI_GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 2;

// ============================================================================
// ChatModel Trait
// ============================================================================

/// 텍스트 생성 모델 트레이트
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 프롬프트로 한 번 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// GeminiChat
// ============================================================================

/// Gemini 텍스트 생성 클라이언트
#[derive(Debug)]
pub struct GeminiChat {
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiChat {
    pub fn new(api_key: String, model: impl Into<String>, temperature: f32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model: model.into(),
            temperature,
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::gemini_default())),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_GENERATE_URL, self.model)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// 응답에서 첫 후보의 텍스트 파트를 이어 붙임
fn extract_text(response: GenerateResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        anyhow::bail!("Gemini returned no text candidates");
    }
    Ok(text)
}

#[async_trait]
impl ChatModel for GeminiChat {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let response = self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
                .context("Failed to send generation request")?;

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let parsed: GenerateResponse =
                    serde_json::from_str(&body).context("Failed to parse generation response")?;
                return extract_text(parsed);
            }

            if status.as_u16() == 429 && attempt < MAX_RETRIES {
                let backoff = crate::embedding::gemini_backoff(attempt);
                tracing::warn!(
                    "Rate limit hit (429) on {}, backing off {:?}",
                    self.model,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            if let Ok(error) = serde_json::from_str::<crate::embedding::GeminiError>(&body) {
                anyhow::bail!(
                    "Gemini API error ({}): {}",
                    error.error.status,
                    error.error.message
                );
            }
            anyhow::bail!("Gemini API error ({}): {}", status, body);
        }

        anyhow::bail!("Generation failed after {} retries", MAX_RETRIES)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 답변 생성 모델 생성
pub fn create_chat_model(config: &Config) -> Result<Arc<dyn ChatModel>> {
    let api_key = get_api_key()?;
    let model = GeminiChat::new(api_key, config.chat_model.clone(), config.temperature)?;
    tracing::info!("Using chat model: {}", config.chat_model);
    Ok(Arc::new(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_contains_model() {
        let chat = GeminiChat::new("k".into(), "gemini-1.5-flash", 0.7).unwrap();
        assert_eq!(
            chat.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Revenue "},{"text":"grew 12%"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(extract_text(parsed).unwrap(), "Revenue grew 12%");
    }

    #[test]
    fn test_extract_text_empty_is_error() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(extract_text(parsed).is_err());
    }

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: "hello" }],
            }],
            generation_config: GenerationConfig { temperature: 0.7 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert!(json["generationConfig"]["temperature"].is_number());
    }
}
