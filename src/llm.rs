//! Client for the remote answer service (text and vision endpoints)

use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::answer::Answer;

const FIELDSET_INSTRUCTION: &str = "You receive a quiz <fieldset> HTML block with the question and its inputs. \
	If multiple-choice options are present, answer with the exact text of the correct option. \
	Otherwise return the concise free-text answer. \
	Return ONLY the final answer string; no quotes or extra words. \
	If uncertain, return UNKNOWN.";

const RETRY_INSTRUCTION: &str = "Previous answer was incorrect. \
	Here are the available options. \
	Respond with the exact text of the correct option. \
	Return ONLY the final answer string; no quotes or extra words. \
	If uncertain, return UNKNOWN.";

#[derive(Debug, Error)]
pub enum AskError {
	/// Network failure or timeout
	#[error("request to {endpoint} failed: {source}")]
	Transport {
		endpoint: String,
		#[source]
		source: reqwest::Error,
	},
	/// Service answered with a non-success status
	#[error("{endpoint} answered with HTTP {status}")]
	Status { endpoint: String, status: u16 },
	#[error("failed to build HTTP client: {0}")]
	Client(#[source] reqwest::Error),
}

/// What the text endpoint is asked about one container
#[derive(Clone, Debug)]
pub struct FieldsetQuery<'a> {
	pub url: &'a str,
	pub locale: &'a str,
	/// Sanitised container markup
	pub html: &'a str,
	/// Present only on the disambiguation retry
	pub retry: Option<Disambiguation<'a>>,
}

#[derive(Clone, Debug)]
pub struct Disambiguation<'a> {
	pub previous_answer: &'a str,
	pub options: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldsetRequest<'a> {
	mode: &'static str,
	url: &'a str,
	locale: &'a str,
	html: &'a str,
	instruction: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	previous_answer: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	options: Option<&'a [String]>,
}

impl<'a> From<&FieldsetQuery<'a>> for FieldsetRequest<'a> {
	fn from(q: &FieldsetQuery<'a>) -> Self {
		Self {
			mode: "fieldset",
			url: q.url,
			locale: q.locale,
			html: q.html,
			instruction: if q.retry.is_some() { RETRY_INSTRUCTION } else { FIELDSET_INSTRUCTION },
			previous_answer: q.retry.as_ref().map(|r| r.previous_answer),
			options: q.retry.as_ref().map(|r| r.options),
		}
	}
}

#[derive(Debug, Serialize)]
struct VisionRequest {
	image: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnswerResponse {
	#[serde(default)]
	answer: Option<String>,
}

/// Thin JSON-over-POST client. The endpoint is passed per call since it is
/// re-read from settings at the start of every attempt.
#[derive(Clone, Debug)]
pub struct AnswerClient {
	http: reqwest::Client,
}

impl AnswerClient {
	pub fn new(timeout: Duration) -> Result<Self, AskError> {
		let http = reqwest::Client::builder().timeout(timeout).build().map_err(AskError::Client)?;
		Ok(Self { http })
	}

	/// Ask for the answer to one quiz container
	pub async fn ask_fieldset(&self, endpoint: &str, query: &FieldsetQuery<'_>) -> Result<Answer, AskError> {
		let body = FieldsetRequest::from(query);
		tracing::debug!(endpoint, retry = query.retry.is_some(), "sending fieldset payload: {:?}", body);
		self.post(endpoint, &body).await
	}

	/// Ask for the answer shown in a viewport screenshot
	pub async fn ask_vision(&self, endpoint: &str, image: &[u8]) -> Result<Answer, AskError> {
		let body = VisionRequest {
			image: base64::engine::general_purpose::STANDARD.encode(image),
		};
		tracing::debug!(endpoint, bytes = image.len(), "sending screenshot");
		self.post(endpoint, &body).await
	}

	async fn post<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<Answer, AskError> {
		let transport = |source: reqwest::Error| AskError::Transport {
			endpoint: endpoint.to_string(),
			source,
		};

		let response = self.http.post(endpoint).json(body).send().await.map_err(transport)?;
		let status = response.status();
		if !status.is_success() {
			return Err(AskError::Status {
				endpoint: endpoint.to_string(),
				status: status.as_u16(),
			});
		}

		let text = response.text().await.map_err(transport)?;
		tracing::debug!("service response: {}", text);

		// Malformed or answer-less bodies mean "no usable answer", not failure
		let parsed: AnswerResponse = serde_json::from_str(&text).unwrap_or_default();
		Ok(parsed.answer.map(|a| Answer::normalize(&a)).unwrap_or_else(Answer::unknown))
	}
}
