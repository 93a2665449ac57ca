//! # Session HTTP Contract
//!
//! Thin client for the external session/score API. These endpoints are
//! consumed strictly through their documented request/response
//! contracts; nothing here owns session state.
//!
//! ## Endpoints:
//! - `POST /api/sessions` — create a session (201) or report an
//!   existing active/queued one (409)
//! - `GET /api/sessions/{id}` — participants, song, created_at
//! - `POST /api/scores` — end-of-session score submission; validated
//!   client-side first so invalid submissions are never sent

use crate::error::AppError;
use crate::session::identity::UserIdentity;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Request body for session creation.
#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    song_id: u64,
    username: &'a str,
    display_name: &'a str,
    replace_existing: bool,
}

/// A freshly created session.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
    pub song: Value,
}

/// The caller already has a waiting or active session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConflict {
    pub session_id: String,
    pub status: String,
    pub song: Value,
}

/// Outcome of a session-creation request.
#[derive(Debug)]
pub enum CreateSessionOutcome {
    Created(CreatedSession),
    /// 409: an existing session must be confirmed or replaced first
    Conflict(SessionConflict),
}

/// Session info as served by `GET /api/sessions/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default)]
    pub participants: Vec<Value>,
    pub song: Value,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// End-of-session score submission.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreSubmission {
    pub session_id: String,
    pub username: String,
    pub display_name: String,
    pub score: i64,
    pub mic_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ScoreSubmission {
    /// Client-side validation, run before anything goes on the wire.
    /// Invalid submissions are surfaced inline and never sent.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.session_id.is_empty() {
            return Err(AppError::Validation("session id is required".to_string()));
        }
        if self.username.is_empty() {
            return Err(AppError::Validation("username is required".to_string()));
        }
        if !(0..=100).contains(&self.score) {
            return Err(AppError::Validation(
                "score must be between 0 and 100".to_string(),
            ));
        }
        if self.mic_time == 0 {
            return Err(AppError::Validation(
                "no mic time recorded for this session".to_string(),
            ));
        }
        Ok(())
    }
}

/// Client for the session/score API of one karaoke server.
pub struct SessionApi {
    base_url: String,
    client: reqwest::Client,
}

impl SessionApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a session for a song, or learn about the conflicting one.
    pub async fn create_session(
        &self,
        song_id: u64,
        identity: &UserIdentity,
        replace_existing: bool,
    ) -> Result<CreateSessionOutcome, AppError> {
        let response = self
            .client
            .post(format!("{}/api/sessions", self.base_url))
            .json(&CreateSessionRequest {
                song_id,
                username: &identity.user_id,
                display_name: &identity.display_name,
                replace_existing,
            })
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                let created: CreatedSession = response.json().await?;
                info!(session_id = %created.session_id, "session created");
                Ok(CreateSessionOutcome::Created(created))
            }
            StatusCode::CONFLICT => {
                let conflict: SessionConflict = response.json().await?;
                Ok(CreateSessionOutcome::Conflict(conflict))
            }
            status => Err(AppError::Internal(format!(
                "session creation failed: {} {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }

    /// Fetch participants and song metadata for a session.
    pub async fn fetch_session(&self, session_id: &str) -> Result<SessionInfo, AppError> {
        let response = self
            .client
            .get(format!("{}/api/sessions/{}", self.base_url, session_id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("session {}", session_id)));
        }

        Ok(response.error_for_status()?.json().await?)
    }

    /// Validate and submit an end-of-session score.
    pub async fn submit_score(&self, submission: &ScoreSubmission) -> Result<(), AppError> {
        submission.validate()?;

        let response = self
            .client
            .post(format!("{}/api/scores", self.base_url))
            .json(submission)
            .send()
            .await?;

        if response.status().is_client_error() {
            let body: Value = response.json().await.unwrap_or_default();
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("score rejected")
                .to_string();
            return Err(AppError::Validation(message));
        }

        response.error_for_status()?;
        info!(session_id = %submission.session_id, "score submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> ScoreSubmission {
        ScoreSubmission {
            session_id: "abc123".to_string(),
            username: "guest_ab12cd34".to_string(),
            display_name: "Guest 1f2e".to_string(),
            score: 87,
            mic_time: 145,
            accuracy: Some(90),
            timing: None,
            notes: None,
        }
    }

    #[test]
    fn test_valid_submission_passes() {
        assert!(submission().validate().is_ok());
    }

    #[test]
    fn test_invalid_submissions_are_not_sendable() {
        let mut no_score = submission();
        no_score.score = 150;
        assert!(matches!(no_score.validate(), Err(AppError::Validation(_))));

        let mut no_mic_time = submission();
        no_mic_time.mic_time = 0;
        assert!(matches!(no_mic_time.validate(), Err(AppError::Validation(_))));

        let mut no_session = submission();
        no_session.session_id.clear();
        assert!(no_session.validate().is_err());
    }

    #[test]
    fn test_score_wire_format_omits_unset_optionals() {
        let json = serde_json::to_string(&submission()).unwrap();
        assert!(json.contains(r#""mic_time":145"#));
        assert!(json.contains(r#""accuracy":90"#));
        assert!(!json.contains("timing"));
        assert!(!json.contains("notes"));
    }
}
