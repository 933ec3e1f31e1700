//! # Payloads
//!
//! Requests/responses between the frontend and backend, and the proposal rows
//! they expose.
//!
//! ### Submit
//! ```json
//! { "email": "a@b.com", "payload": { "type": "proposal", "modelId": "org/model", "reason": "..." } }
//! { "email": "a@b.com", "payload": { "type": "batch_vote", "proposalIds": ["..."] } }
//! ```
//!
//! ### Verify
//! `GET /verify?token=...` answers `{ success, message, results }`.
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a pending submission does once its link is followed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmissionPayload {
    Proposal {
        #[serde(rename = "modelId")]
        model_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default)]
        mode: ProposalMode,
    },
    BatchVote {
        #[serde(rename = "proposalIds")]
        proposal_ids: Vec<String>,
    },
}

impl SubmissionPayload {
    pub fn describe(&self) -> String {
        match self {
            SubmissionPayload::Proposal { model_id, .. } => format!("proposal for {model_id}"),
            SubmissionPayload::BatchVote { proposal_ids } => {
                format!("votes for {} proposal(s)", proposal_ids.len())
            }
        }
    }
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub email: String,
    pub payload: SubmissionPayload,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<String>,
}

#[derive(Deserialize)]
pub struct ProposalsQuery {
    pub mode: Option<String>,
}

#[derive(Deserialize)]
pub struct SimilarQuery {
    pub id: String,
    /// Comma separated model ids.
    pub candidates: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct NeighborsQuery {
    pub id: String,
    pub k: Option<usize>,
}

#[derive(Serialize)]
pub struct SimilarModel<'a> {
    #[serde(flatten)]
    pub ranked: bank::similarity::RankedModel<'a>,
    pub similarity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    pub model_id: String,
    #[serde(skip_serializing)]
    pub submitter_email: String,
    pub reason: Option<String>,
    pub votes: i64,
    pub status: ProposalStatus,
    pub mode: ProposalMode,
    pub created_at: DateTime<Utc>,
}

/// Driven by the offline analysis pipeline; new proposals start as `pending`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    #[default]
    Pending,
    Scanning,
    Completed,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalMode {
    #[default]
    Raw,
    Chat,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Scanning => "scanning",
            ProposalStatus::Completed => "completed",
            ProposalStatus::Failed => "failed",
        }
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProposalStatus::Pending),
            "scanning" => Ok(ProposalStatus::Scanning),
            "completed" => Ok(ProposalStatus::Completed),
            "failed" => Ok(ProposalStatus::Failed),
            other => Err(format!("unknown proposal status: {other}")),
        }
    }
}

impl ProposalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalMode::Raw => "raw",
            ProposalMode::Chat => "chat",
        }
    }
}

impl FromStr for ProposalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(ProposalMode::Raw),
            "chat" => Ok(ProposalMode::Chat),
            other => Err(format!("unknown proposal mode: {other}")),
        }
    }
}

impl fmt::Display for ProposalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
