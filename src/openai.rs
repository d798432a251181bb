//! OpenAI-compatible client for chat completions and image generation.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{BackendError, CompletionBackend, GeneratedImage, ImageBackend};
use crate::config::OpenAiConfig;

pub struct Client {
    config: OpenAiConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    n: u8,
    size: &'a str,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
    url: Option<String>,
}

impl Client {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<T: Serialize>(&self, path: &str, request: &T) -> Result<String, BackendError> {
        let url = self.endpoint(path);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl CompletionBackend for Client {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref pre_prompt) = self.config.pre_prompt {
            messages.push(ApiMessage {
                role: "system",
                content: pre_prompt,
            });
        }
        messages.push(ApiMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.config.model,
            messages,
        };

        let body = self.post("chat/completions", &request).await?;
        parse_completion(&body)
    }
}

#[async_trait]
impl ImageBackend for Client {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, BackendError> {
        info!("🎨 Generating image: {}", prompt);

        let request = ImageRequest {
            prompt,
            n: 1,
            size: &self.config.image_size,
            response_format: "b64_json",
        };

        let body = self.post("images/generations", &request).await?;
        parse_image(&body)
    }
}

fn parse_completion(body: &str) -> Result<String, BackendError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Parse(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(BackendError::Empty)
}

fn parse_image(body: &str) -> Result<GeneratedImage, BackendError> {
    let parsed: ImageResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Parse(e.to_string()))?;

    let datum = parsed.data.into_iter().next().ok_or(BackendError::Empty)?;

    if let Some(encoded) = datum.b64_json {
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| BackendError::Parse(format!("Failed to decode base64: {e}")))?;
        info!("🎨 Image generated: {} bytes", data.len());
        return Ok(GeneratedImage::Bytes(data));
    }

    datum.url.map(GeneratedImage::Url).ok_or(BackendError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> OpenAiConfig {
        OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url,
            model: "gpt-3.5-turbo".to_string(),
            image_size: "512x512".to_string(),
            pre_prompt: None,
        }
    }

    #[test]
    fn test_parse_completion_trims() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  hi there \n"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "hi there");
    }

    #[test]
    fn test_parse_completion_no_choices() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, BackendError::Empty));
    }

    #[test]
    fn test_parse_completion_garbage() {
        let err = parse_completion("not json").unwrap_err();
        assert!(matches!(err, BackendError::Parse(_)));
    }

    #[test]
    fn test_parse_image_prefers_bytes() {
        // "aGVsbG8=" is "hello"
        let body = r#"{"data":[{"b64_json":"aGVsbG8=","url":"https://example.com/a.png"}]}"#;
        assert_eq!(
            parse_image(body).unwrap(),
            GeneratedImage::Bytes(b"hello".to_vec())
        );
    }

    #[test]
    fn test_parse_image_falls_back_to_url() {
        let body = r#"{"data":[{"url":"https://example.com/a.png"}]}"#;
        assert_eq!(
            parse_image(body).unwrap(),
            GeneratedImage::Url("https://example.com/a.png".to_string())
        );
    }

    #[test]
    fn test_parse_image_empty() {
        assert!(matches!(
            parse_image(r#"{"data":[]}"#).unwrap_err(),
            BackendError::Empty
        ));
        assert!(matches!(
            parse_image(r#"{"data":[{}]}"#).unwrap_err(),
            BackendError::Empty
        ));
    }

    #[tokio::test]
    async fn test_complete_sends_prompt_with_auth() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"choices":[{"message":{"role":"assistant","content":"Hi!"}}]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(config(server.uri()));
        assert_eq!(client.complete("hello").await.unwrap(), "Hi!");
    }

    #[tokio::test]
    async fn test_complete_includes_pre_prompt() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"choices":[{"message":{"content":"ok"}}]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config(server.uri());
        cfg.pre_prompt = Some("be brief".to_string());
        let client = Client::new(cfg);
        assert_eq!(client.complete("hello").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_complete_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = Client::new(config(server.uri()));
        match client.complete("hello").await.unwrap_err() {
            BackendError::Api { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_image_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(body_partial_json(serde_json::json!({
                "prompt": "a cat",
                "n": 1,
                "size": "512x512",
                "response_format": "b64_json"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"data":[{"b64_json":"aGVsbG8="}]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        // Trailing slash on the base URL must not produce a double slash.
        let client = Client::new(config(format!("{}/", server.uri())));
        assert_eq!(
            client.generate_image("a cat").await.unwrap(),
            GeneratedImage::Bytes(b"hello".to_vec())
        );
    }
}
