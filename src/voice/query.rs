//! Query service client (Perplexity, OpenAI-compatible chat completions)

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use super::QueryClient;
use crate::config::QueryConfig;
use crate::{Error, Result};

/// Citation markers such as `[1]` or `[12]`
static CITATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\]").expect("valid regex"));

/// A run of periods at the end of the text
static TRAILING_PERIODS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.+$").expect("valid regex"));

/// Strip citation markers and tidy whitespace so the answer reads well aloud
///
/// Idempotent: `clean_response(&clean_response(s)) == clean_response(s)`.
#[must_use]
pub fn clean_response(text: &str) -> String {
    let mut cleaned = text.to_string();

    // Removing one marker can expose another ("[[1]2]" -> "[2]")
    while CITATION_REGEX.is_match(&cleaned) {
        cleaned = CITATION_REGEX.replace_all(&cleaned, "").into_owned();
    }

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    TRAILING_PERIODS_REGEX.replace(&collapsed, ".").into_owned()
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Asks questions of the Perplexity API
pub struct PerplexityClient {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
    system_prompt: String,
}

impl PerplexityClient {
    /// Create a query client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing or the HTTP client cannot be built
    pub fn new(config: &QueryConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("Perplexity API key required".to_string()))?;

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
        })
    }
}

#[async_trait]
impl QueryClient for PerplexityClient {
    async fn query(&self, prompt: &str) -> Result<String> {
        tracing::debug!(model = %self.model, prompt, "querying Perplexity");

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Perplexity request failed");
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Perplexity API error");
            return Err(Error::Query(format!("Perplexity API error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await?;
        let answer = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| clean_response(&content))
            .filter(|content| !content.is_empty())
            .ok_or_else(|| Error::Query("empty answer".to_string()))?;

        tracing::info!(answer = %answer, "Perplexity response");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn test_clean_response_strips_citations() {
        assert_eq!(clean_response("Paris[1] is great[12]."), "Paris is great.");
    }

    #[test]
    fn test_clean_response_collapses_whitespace_and_periods() {
        assert_eq!(
            clean_response("  The answer\n\n is   forty-two...  "),
            "The answer is forty-two."
        );
        assert_eq!(clean_response("No change."), "No change.");
        assert_eq!(clean_response(""), "");
    }

    #[test]
    fn test_clean_response_nested_markers() {
        assert_eq!(clean_response("x[[1]2] y"), "x y");
    }

    #[test]
    fn test_clean_response_idempotent() {
        let samples = [
            "Paris[1] is great[12].",
            "a[[1]1]b",
            "trailing . . .",
            "  spaced\tout [3] text..\n",
            "[1][2][3]",
            "dots... in the middle... and end....",
            "bracket [a] kept [ 1 ] kept",
        ];

        for sample in samples {
            let once = clean_response(sample);
            assert_eq!(clean_response(&once), once, "not idempotent for {sample:?}");
        }
    }

    fn client(server: &MockServer) -> PerplexityClient {
        PerplexityClient::new(&QueryConfig {
            api_key: Some(SecretString::from("test-key")),
            base_url: server.uri(),
            model: "test-model".to_string(),
            system_prompt: "be brief".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_query_sends_prompt_and_cleans_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "capital of France?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "Paris[1]  is the capital.."}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client(&server).query("capital of France?").await.unwrap();
        assert_eq!(answer, "Paris is the capital.");
    }

    #[tokio::test]
    async fn test_api_error_is_query_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = client(&server).query("hi").await.unwrap_err();
        assert!(matches!(err, Error::Query(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_no_choices_is_query_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server).query("hi").await.unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let result = PerplexityClient::new(&QueryConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
