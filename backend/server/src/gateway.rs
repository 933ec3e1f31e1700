//! Intake of submissions awaiting email verification.
//!
//! Nothing is published here: a submission is validated, stored as a pending
//! row with a fresh token and the link is mailed to the submitter. Every
//! validation runs before the first write.
use chrono::Utc;
use tracing::{error, info};

use crate::{
    database::{PendingSubmission, delete_pending, insert_pending, missing_proposals, proposal_exists},
    error::AppError,
    payloads::{SubmissionPayload, SubmitResponse},
    state::State,
    utils::{
        MAX_BATCH_VOTES, MAX_MODEL_ID_LEN, MAX_REASON_LEN, dedup_ids, new_token, normalize_email,
        normalize_model_id,
    },
};

pub async fn submit(
    state: &State,
    email: &str,
    payload: SubmissionPayload,
) -> Result<SubmitResponse, AppError> {
    let email = normalize_email(email)?;

    let (payload, warnings) = match payload {
        SubmissionPayload::Proposal {
            model_id,
            reason,
            mode,
        } => {
            let model_id = model_id.trim().to_string();
            let reason = reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty());

            if model_id.is_empty() {
                return Err(AppError::Validation("A model id is required".to_string()));
            }
            if model_id.chars().count() > MAX_MODEL_ID_LEN {
                return Err(AppError::Validation(format!(
                    "Model id must be at most {MAX_MODEL_ID_LEN} characters"
                )));
            }
            if reason.as_ref().is_some_and(|r| r.chars().count() > MAX_REASON_LEN) {
                return Err(AppError::Validation(format!(
                    "Reason must be at most {MAX_REASON_LEN} characters"
                )));
            }

            let key = normalize_model_id(&model_id);
            if state.db.call(move |conn| proposal_exists(conn, &key)).await? {
                return Err(AppError::Conflict(format!("{model_id} has already been proposed")));
            }

            let warnings: Vec<String> = state.catalog.check(&model_id).await.into_iter().collect();

            let payload = SubmissionPayload::Proposal {
                model_id,
                reason,
                mode,
            };
            (payload, warnings)
        }
        SubmissionPayload::BatchVote { proposal_ids } => {
            let ids = dedup_ids(&proposal_ids);

            if ids.is_empty() {
                return Err(AppError::Validation("Select at least one proposal".to_string()));
            }
            if ids.len() > MAX_BATCH_VOTES {
                return Err(AppError::Validation(format!(
                    "At most {MAX_BATCH_VOTES} proposals can be voted on at once"
                )));
            }

            let lookup = ids.clone();
            let missing = state.db.call(move |conn| missing_proposals(conn, &lookup)).await?;
            if !missing.is_empty() {
                return Err(AppError::NotFound(format!(
                    "Unknown proposal(s): {}",
                    missing.join(", ")
                )));
            }

            (SubmissionPayload::BatchVote { proposal_ids: ids }, Vec::new())
        }
    };

    let token = new_token();
    let summary = payload.describe();
    let pending = PendingSubmission {
        id: new_token(),
        email: email.clone(),
        payload,
        verification_token: Some(token.clone()),
        is_verified: false,
        created_at: Utc::now(),
    };
    let id = pending.id.clone();

    state.db.call(move |conn| insert_pending(conn, &pending)).await?;

    let link = state.config.verification_link(&token);
    if let Err(e) = state.mailer.send_verification(&email, &link, &summary).await {
        error!("Sending verification for submission {id} failed: {e:#}");
        state.db.call(move |conn| delete_pending(conn, &id)).await?;
        return Err(AppError::InternalError("Could not send verification email".to_string()));
    }

    info!("Submission {id} awaiting verification: {summary}");

    Ok(SubmitResponse {
        success: true,
        message: "Check your email to confirm your submission".to_string(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        database::{find_pending_by_token, insert_proposal},
        mailer::testing::RecordingMailer,
        payloads::{Proposal, ProposalMode, ProposalStatus},
        state::tests::test_state,
    };

    fn proposal(model_id: &str) -> SubmissionPayload {
        SubmissionPayload::Proposal {
            model_id: model_id.to_string(),
            reason: None,
            mode: ProposalMode::Raw,
        }
    }

    fn seed(state: &State, id: &str, model_id: &str) {
        state
            .db
            .with_conn(|conn| {
                insert_proposal(
                    conn,
                    &Proposal {
                        id: id.to_string(),
                        model_id: model_id.to_string(),
                        submitter_email: "x@y.com".to_string(),
                        reason: None,
                        votes: 1,
                        status: ProposalStatus::Pending,
                        mode: ProposalMode::Raw,
                        created_at: Utc::now(),
                    },
                )
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_submit_mails_link() {
        let mailer = Arc::new(RecordingMailer::default());
        let state = test_state(mailer.clone());

        let receipt = submit(&state, " A@B.com ", proposal(" org/new-model ")).await.unwrap();
        assert!(receipt.success);
        assert!(receipt.warnings.is_empty());

        let token = mailer.last_token().unwrap();
        assert_eq!(mailer.sent.lock().unwrap()[0].0, "a@b.com");

        let pending = state
            .db
            .with_conn(|conn| find_pending_by_token(conn, &token))
            .unwrap()
            .unwrap();
        assert_eq!(pending.payload, proposal("org/new-model"));
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let state = test_state(Arc::new(RecordingMailer::default()));

        let cases = [
            ("not-an-email", proposal("org/model")),
            ("a@b.com", proposal("   ")),
            ("a@b.com", proposal(&"x".repeat(MAX_MODEL_ID_LEN + 1))),
            ("a@b.com", SubmissionPayload::BatchVote { proposal_ids: vec![" ".to_string()] }),
        ];

        for (email, payload) in cases {
            assert!(matches!(
                submit(&state, email, payload).await,
                Err(AppError::Validation(_))
            ));
        }

        let too_long = SubmissionPayload::Proposal {
            model_id: "org/model".to_string(),
            reason: Some("r".repeat(MAX_REASON_LEN + 1)),
            mode: ProposalMode::Raw,
        };
        assert!(matches!(
            submit(&state, "a@b.com", too_long).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_conflict_and_unknown_votes() {
        let mailer = Arc::new(RecordingMailer::default());
        let state = test_state(mailer.clone());
        seed(&state, "p1", "org/existing");

        assert!(matches!(
            submit(&state, "a@b.com", proposal("ORG/Existing")).await,
            Err(AppError::Conflict(_))
        ));

        let votes = SubmissionPayload::BatchVote {
            proposal_ids: vec!["p1".to_string(), "p404".to_string()],
        };
        assert!(matches!(
            submit(&state, "a@b.com", votes).await,
            Err(AppError::NotFound(_))
        ));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mailer_failure_removes_pending() {
        let state = test_state(Arc::new(RecordingMailer::failing()));

        let result = submit(&state, "a@b.com", proposal("org/model")).await;
        assert!(matches!(result, Err(AppError::InternalError(_))));

        let remaining: i64 = state
            .db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM pending_submissions", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
