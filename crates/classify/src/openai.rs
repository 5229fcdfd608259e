//! OpenAI-compatible chat completions client.

use crate::error::{ErrorKind, Result};
use crate::prepare::{DEFAULT_MAX_DIMENSION, prepare_image};
use crate::{Classifier, Description};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use exn::{OptionExt, ResultExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_TOKENS: u32 = 100;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Instruction sent alongside every image.
pub const PROMPT: &str = "\
Look at this screenshot and generate a descriptive filename.

Be specific about what you see:
- If it's an app, name the app and what's shown (e.g., \"slack-dm-with-john-about-project\")
- If it's a webpage, include the site and content (e.g., \"github-pull-request-review-comments\")
- If it's code, mention the language and what it does (e.g., \"python-async-api-handler\")
- If it's a document, describe the content (e.g., \"quarterly-sales-report-chart\")

Rules:
- Use lowercase letters and hyphens only
- Be specific and descriptive (5-8 words is ideal)
- No special characters or punctuation

Respond with ONLY the filename, nothing else.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: [Content<'a>; 2],
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Content<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Describes images with a vision-capable chat model.
///
/// Makes exactly one HTTP request per [`classify`](Classifier::classify) call;
/// wrap in [`Retrying`](crate::Retrying) for a retry policy.
///
/// # Examples
///
/// ```no_run
/// use shotname_classify::{Classifier, OpenAiClassifier};
///
/// # async fn example(png: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
/// let classifier = OpenAiClassifier::new("sk-...")?.with_model("gpt-4o");
/// let description = classifier.classify(png).await?;
/// println!("{description}");
/// # Ok(())
/// # }
/// ```
pub struct OpenAiClassifier {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_dimension: u32,
}

impl OpenAiClassifier {
    /// Creates a client for the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_key, DEFAULT_TIMEOUT)
    }

    /// Creates a client whose requests give up after `timeout`.
    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().or_raise(|| ErrorKind::Transport)?;
        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_dimension: DEFAULT_MAX_DIMENSION,
        })
    }

    /// Base URL; `/chat/completions` is appended.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request<'a>(&'a self, jpeg: &[u8]) -> ChatRequest<'a> {
        let url = format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg));
        ChatRequest {
            model: &self.model,
            messages: [Message {
                role: "user",
                content: [
                    Content::Text { text: PROMPT },
                    Content::ImageUrl { image_url: ImageUrl { url, detail: "low" } },
                ],
            }],
            max_tokens: self.max_tokens,
        }
    }

    fn parse(body: &str) -> Result<Description> {
        let response: ChatResponse = serde_json::from_str(body).or_raise(|| ErrorKind::Response)?;
        let text = response.choices.into_iter().next().and_then(|c| c.message.content).unwrap_or_default();
        Description::new(text).ok_or_raise(|| ErrorKind::EmptyDescription)
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, image: &[u8]) -> Result<Description> {
        let raw = image.to_vec();
        let max_dimension = self.max_dimension;
        let jpeg = tokio::task::spawn_blocking(move || prepare_image(&raw, max_dimension))
            .await
            .or_raise(|| ErrorKind::Image)??;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&self.request(&jpeg))
            .send()
            .await
            .or_raise(|| ErrorKind::Transport)?;

        let status = response.status();
        let body = response.text().await.or_raise(|| ErrorKind::Transport)?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            exn::bail!(ErrorKind::RateLimited);
        }
        if !status.is_success() {
            exn::bail!(ErrorKind::Api { status: status.as_u16(), message: api_error_message(&body) });
        }
        let description = Self::parse(&body)?;
        tracing::debug!(model = %self.model, description = %description, "Image classified");
        Ok(description)
    }
}

/// Pulls `error.message` out of an error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().chars().take(200).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_request_shape() {
        let classifier = OpenAiClassifier::new("key").unwrap().with_model("gpt-4o");
        assert_eq!(classifier.model(), "gpt-4o");
        let request = serde_json::to_value(classifier.request(b"\xff\xd8")).unwrap();
        assert_eq!(request["model"], "gpt-4o");
        assert_eq!(request["max_tokens"], 100);
        let content = &request["messages"][0]["content"];
        assert_eq!(request["messages"][0]["role"], "user");
        assert_eq!(content[0], json!({ "type": "text", "text": PROMPT }));
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["detail"], "low");
        assert_eq!(content[1]["image_url"]["url"], Value::from("data:image/jpeg;base64,/9g="));
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let classifier = OpenAiClassifier::new("key").unwrap().with_endpoint("http://localhost:8080/v1/");
        assert_eq!(classifier.endpoint, "http://localhost:8080/v1");
    }

    #[test]
    fn test_parse_description() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"github-pull-request-review-page\n"}}]}"#;
        assert_eq!(OpenAiClassifier::parse(body).unwrap().as_str(), "github-pull-request-review-page");
    }

    #[test]
    fn test_parse_empty_description() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":"   "}}]}"#,
        ] {
            let err = OpenAiClassifier::parse(body).unwrap_err();
            assert_eq!(*err, ErrorKind::EmptyDescription);
        }
    }

    #[test]
    fn test_parse_malformed() {
        let err = OpenAiClassifier::parse("<html>bad gateway</html>").unwrap_err();
        assert_eq!(*err, ErrorKind::Response);
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(api_error_message(body), "Incorrect API key provided");
        assert_eq!(api_error_message("  upstream timeout "), "upstream timeout");
    }
}
