use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::DATE;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use exam_core::AnswerSnapshot;
use exam_core::model::{Attempt, AttemptId, AttemptStatus, ExamResult, Question, QuestionId};

use crate::api::{ExamApi, ServerReply};
use crate::config::ExamClientConfig;
use crate::error::ExamError;

/// `ExamApi` over HTTP/JSON.
#[derive(Clone)]
pub struct HttpExamApi {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpExamApi {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the TLS backend cannot be initialised.
    pub fn new(config: &ExamClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_token: config.api_token.clone(),
        })
    }

    fn endpoint(&self, id: &AttemptId, action: Option<&str>) -> Result<Url, ExamError> {
        exam_endpoint(&self.base_url, id, action)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ExamError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = classify_status(status, &body);
        debug!(%status, error = %err, "exam service returned an error status");
        Err(err)
    }
}

#[async_trait]
impl ExamApi for HttpExamApi {
    async fn fetch_attempt(&self, id: &AttemptId) -> Result<ServerReply<Attempt>, ExamError> {
        let url = self.endpoint(id, None)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let server_time = server_date(&response);
        let document: ExamDocument = decode(response).await?;
        Ok(ServerReply {
            value: document.into_attempt()?,
            server_time,
        })
    }

    async fn start_attempt(
        &self,
        id: &AttemptId,
    ) -> Result<ServerReply<Option<DateTime<Utc>>>, ExamError> {
        let url = self.endpoint(id, Some("start"))?;
        let response = self.send(self.request(Method::POST, url)).await?;
        let server_time = server_date(&response);
        let body: StartDocument = decode(response).await?;
        Ok(ServerReply {
            value: body.start_time,
            server_time,
        })
    }

    async fn submit_answers(
        &self,
        id: &AttemptId,
        answers: &AnswerSnapshot,
    ) -> Result<ExamResult, ExamError> {
        let url = self.endpoint(id, Some("submit"))?;
        let payload = SubmitRequest {
            exam_id: id.as_str(),
            answers,
        };
        let response = self
            .send(self.request(Method::POST, url).json(&payload))
            .await?;
        let body: SubmitResponse = decode(response).await?;
        if let Some(message) = &body.message {
            debug!(attempt_id = %id, %message, "submission accepted");
        }
        Ok(body.result)
    }

    async fn fetch_result(&self, id: &AttemptId) -> Result<ExamResult, ExamError> {
        let url = self.endpoint(id, Some("result"))?;
        let response = self.send(self.request(Method::GET, url)).await?;
        decode(response).await
    }
}

//
// ─── CLASSIFICATION ────────────────────────────────────────────────────────────
//

/// Map a non-success status onto the error taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> ExamError {
    match status {
        StatusCode::NOT_FOUND => ExamError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExamError::Forbidden,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            ExamError::Transient(status.to_string())
        }
        s if s.is_server_error() => ExamError::Transient(status.to_string()),
        _ => ExamError::Rejected(error_detail(status, body)),
    }
}

/// Prefer the service's `detail` text, falling back to the raw body or status line.
fn error_detail(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: serde_json::Value,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(text),
        }) => text,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status.to_string(),
    }
}

fn transport_error(err: reqwest::Error) -> ExamError {
    if err.is_decode() {
        ExamError::Rejected(err.to_string())
    } else {
        ExamError::Transient(err.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ExamError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ExamError::Rejected(format!("malformed response body: {e}")))
}

fn server_date(response: &Response) -> Option<DateTime<Utc>> {
    response
        .headers()
        .get(DATE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date)
}

pub(crate) fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

pub(crate) fn exam_endpoint(
    base_url: &Url,
    id: &AttemptId,
    action: Option<&str>,
) -> Result<Url, ExamError> {
    let mut url = base_url.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| ExamError::Rejected(format!("{base_url} cannot be a base url")))?;
        segments.pop_if_empty().extend(["api", "exams", id.as_str()]);
        if let Some(action) = action {
            segments.push(action);
        }
    }
    Ok(url)
}

//
// ─── WIRE TYPES ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
struct ExamDocument {
    #[serde(alias = "_id")]
    id: String,
    status: AttemptStatus,
    questions: Vec<QuestionDocument>,
    #[serde(default, alias = "started_at", deserialize_with = "wire_time::optional")]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    duration_seconds: Option<u32>,
    /// Minutes.
    #[serde(default)]
    duration: Option<u32>,
}

impl ExamDocument {
    fn into_attempt(self) -> Result<Attempt, ExamError> {
        let duration_seconds = match (self.duration_seconds, self.duration) {
            (Some(seconds), _) => seconds,
            (None, Some(minutes)) => minutes
                .checked_mul(60)
                .ok_or_else(|| ExamError::Rejected(format!("duration {minutes}m overflows")))?,
            (None, None) => {
                return Err(ExamError::Rejected("exam document has no duration".into()));
            }
        };

        let questions = self
            .questions
            .into_iter()
            .enumerate()
            .map(|(index, question)| question.into_question(index))
            .collect::<Result<Vec<_>, _>>()?;

        Attempt::from_persisted(
            AttemptId::new(self.id),
            self.status,
            self.start_time,
            duration_seconds,
            questions,
        )
        .map_err(|e| ExamError::Rejected(format!("invalid exam document: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct QuestionDocument {
    #[serde(default)]
    id: Option<String>,
    question: String,
    options: Vec<String>,
    subject: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
}

impl QuestionDocument {
    fn into_question(self, index: usize) -> Result<Question, ExamError> {
        let id = self.id.unwrap_or_else(|| index.to_string());
        let mut question = Question::new(QuestionId::new(id), self.question, self.subject, self.options)
            .map_err(|e| ExamError::Rejected(format!("invalid question {index}: {e}")))?;
        if let Some(topic) = self.topic {
            question = question.with_topic(topic);
        }
        if let Some(difficulty) = self.difficulty {
            question = question.with_difficulty(difficulty);
        }
        Ok(question)
    }
}

#[derive(Debug, Deserialize)]
struct StartDocument {
    #[serde(default, alias = "started_at", deserialize_with = "wire_time::optional")]
    start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    exam_id: &'a str,
    answers: &'a AnswerSnapshot,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    message: Option<String>,
    result: ExamResult,
}

/// Timestamps arrive either as RFC 3339 or as naive ISO-8601, which is UTC.
mod wire_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, de::Error as _};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }

    pub(super) fn optional<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp `{raw}`"))))
            .transpose()
    }
}
