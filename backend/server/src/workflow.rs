//! Exactly-once verification of pending submissions.
//!
//! The lookup, the conditional consume and the intent's effects share one
//! immediate transaction, so a link followed twice (or by two tabs at once)
//! applies its effect a single time and the loser sees [`AppError::AlreadyUsed`].
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    database::{
        PendingSubmission, consume_pending, delete_pending, find_pending_by_token,
        increment_votes, insert_proposal, insert_vote, missing_proposals, proposal_exists,
    },
    error::AppError,
    payloads::{Proposal, ProposalMode, ProposalStatus, SubmissionPayload},
    utils::{dedup_ids, new_token, normalize_model_id},
};

#[derive(Debug, PartialEq, Serialize)]
pub struct VerifyOutcome {
    pub message: String,
    pub results: Vec<String>,
}

pub fn verify(
    conn: &mut Connection,
    token: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<VerifyOutcome, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(pending) = find_pending_by_token(&tx, token)? else {
        return Err(AppError::NotFound("Invalid or expired link".to_string()));
    };

    if pending.is_verified {
        return Err(AppError::AlreadyUsed);
    }

    if now - pending.created_at > ttl {
        info!("Submission {} expired, removing", pending.id);
        delete_pending(&tx, &pending.id)?;
        tx.commit()?;
        return Err(AppError::Expired);
    }

    if !consume_pending(&tx, &pending.id, token)? {
        warn!("Submission {} consumed concurrently", pending.id);
        return Err(AppError::AlreadyUsed);
    }

    let outcome = apply(&tx, &pending, now)?;
    tx.commit()?;

    info!("Verified submission {}: {}", pending.id, pending.payload.describe());
    Ok(outcome)
}

fn apply(conn: &Connection, pending: &PendingSubmission, now: DateTime<Utc>) -> Result<VerifyOutcome, AppError> {
    match &pending.payload {
        SubmissionPayload::Proposal {
            model_id,
            reason,
            mode,
        } => publish_proposal(conn, &pending.email, model_id, reason.as_deref(), *mode, now),
        SubmissionPayload::BatchVote { proposal_ids } => {
            record_votes(conn, &pending.email, proposal_ids, now)
        }
    }
}

fn publish_proposal(
    conn: &Connection,
    email: &str,
    model_id: &str,
    reason: Option<&str>,
    mode: ProposalMode,
    now: DateTime<Utc>,
) -> Result<VerifyOutcome, AppError> {
    let model_id = model_id.trim();

    if proposal_exists(conn, &normalize_model_id(model_id))? {
        return Ok(VerifyOutcome {
            message: format!("{model_id} was already proposed"),
            results: vec![format!("{model_id}: already proposed")],
        });
    }

    let proposal = Proposal {
        id: new_token(),
        model_id: model_id.to_string(),
        submitter_email: email.to_string(),
        reason: reason.map(str::to_string),
        votes: 1,
        status: ProposalStatus::Pending,
        mode,
        created_at: now,
    };

    insert_proposal(conn, &proposal)?;
    insert_vote(conn, &proposal.id, email, now)?;

    Ok(VerifyOutcome {
        message: format!("Proposal for {model_id} published"),
        results: vec![format!("{model_id}: proposal created")],
    })
}

fn record_votes(
    conn: &Connection,
    email: &str,
    proposal_ids: &[String],
    now: DateTime<Utc>,
) -> Result<VerifyOutcome, AppError> {
    let ids = dedup_ids(proposal_ids);
    let missing = missing_proposals(conn, &ids)?;

    let mut recorded = 0;
    let mut results = Vec::with_capacity(ids.len());

    for id in &ids {
        if missing.contains(id) {
            results.push(format!("{id}: not found"));
        } else if !insert_vote(conn, id, email, now)? {
            results.push(format!("{id}: already voted"));
        } else {
            increment_votes(conn, id)?;
            recorded += 1;
            results.push(format!("{id}: vote recorded"));
        }
    }

    Ok(VerifyOutcome {
        message: format!("Recorded {recorded} vote(s)"),
        results,
    })
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Barrier},
        thread,
    };

    use super::*;
    use crate::database::{ProposalDb, get_proposal, has_vote, insert_pending, list_proposals};

    fn pending(id: &str, token: &str, payload: SubmissionPayload, created_at: DateTime<Utc>) -> PendingSubmission {
        PendingSubmission {
            id: id.to_string(),
            email: "voter@example.com".to_string(),
            payload,
            verification_token: Some(token.to_string()),
            is_verified: false,
            created_at,
        }
    }

    fn proposal_payload(model_id: &str) -> SubmissionPayload {
        SubmissionPayload::Proposal {
            model_id: model_id.to_string(),
            reason: Some("widely used".to_string()),
            mode: ProposalMode::Chat,
        }
    }

    fn seed_proposal(conn: &Connection, id: &str, model_id: &str) -> Result<(), AppError> {
        insert_proposal(
            conn,
            &Proposal {
                id: id.to_string(),
                model_id: model_id.to_string(),
                submitter_email: "someone@example.com".to_string(),
                reason: None,
                votes: 1,
                status: ProposalStatus::Pending,
                mode: ProposalMode::Raw,
                created_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_proposal_published_once() {
        let db = ProposalDb::open_in_memory().unwrap();
        let now = Utc::now();

        db.with_conn(|conn| {
            insert_pending(conn, &pending("s1", "tok", proposal_payload("Org/Model-7B"), now))?;

            let outcome = verify(conn, "tok", Duration::hours(24), now)?;
            assert_eq!(outcome.results, vec!["Org/Model-7B: proposal created"]);

            let proposals = list_proposals(conn, None)?;
            assert_eq!(proposals.len(), 1);
            assert_eq!(proposals[0].votes, 1);
            assert_eq!(proposals[0].mode, ProposalMode::Chat);
            assert!(has_vote(conn, &proposals[0].id, "voter@example.com")?);

            assert!(matches!(
                verify(conn, "tok", Duration::hours(24), now),
                Err(AppError::AlreadyUsed)
            ));
            assert_eq!(list_proposals(conn, None)?.len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_already_proposed_consumes_without_effect() {
        let db = ProposalDb::open_in_memory().unwrap();
        let now = Utc::now();

        db.with_conn(|conn| {
            seed_proposal(conn, "p1", "org/model")?;
            insert_pending(conn, &pending("s1", "tok", proposal_payload(" ORG/model "), now))?;

            let outcome = verify(conn, "tok", Duration::hours(24), now)?;
            assert_eq!(outcome.results, vec!["ORG/model: already proposed"]);
            assert_eq!(get_proposal(conn, "p1")?.unwrap().votes, 1);
            assert!(matches!(
                verify(conn, "tok", Duration::hours(24), now),
                Err(AppError::AlreadyUsed)
            ));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_batch_vote_partial_results() {
        let db = ProposalDb::open_in_memory().unwrap();
        let now = Utc::now();

        db.with_conn(|conn| {
            seed_proposal(conn, "p1", "org/one")?;
            seed_proposal(conn, "p2", "org/two")?;
            insert_vote(conn, "p2", "voter@example.com", now)?;

            let ids = ["p1", "p2", "p1", "gone"].map(str::to_string).to_vec();
            insert_pending(
                conn,
                &pending("s1", "tok", SubmissionPayload::BatchVote { proposal_ids: ids }, now),
            )?;

            let outcome = verify(conn, "tok", Duration::hours(24), now)?;
            assert_eq!(outcome.message, "Recorded 1 vote(s)");
            assert_eq!(
                outcome.results,
                vec!["p1: vote recorded", "p2: already voted", "gone: not found"]
            );
            assert_eq!(get_proposal(conn, "p1")?.unwrap().votes, 2);
            assert_eq!(get_proposal(conn, "p2")?.unwrap().votes, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_duplicate_vote_is_idempotent() {
        let db = ProposalDb::open_in_memory().unwrap();
        let now = Utc::now();

        db.with_conn(|conn| {
            seed_proposal(conn, "p1", "org/one")?;

            for (id, token) in [("s1", "tok-a"), ("s2", "tok-b")] {
                let payload = SubmissionPayload::BatchVote {
                    proposal_ids: vec!["p1".to_string()],
                };
                insert_pending(conn, &pending(id, token, payload, now))?;
            }

            verify(conn, "tok-a", Duration::hours(24), now)?;
            let second = verify(conn, "tok-b", Duration::hours(24), now)?;

            assert_eq!(second.results, vec!["p1: already voted"]);
            assert_eq!(get_proposal(conn, "p1")?.unwrap().votes, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_expired_then_not_found() {
        let db = ProposalDb::open_in_memory().unwrap();
        let created = Utc::now();
        let later = created + Duration::hours(25);

        db.with_conn(|conn| {
            insert_pending(conn, &pending("s1", "tok", proposal_payload("org/model"), created))?;

            assert!(matches!(
                verify(conn, "tok", Duration::hours(24), later),
                Err(AppError::Expired)
            ));
            assert!(matches!(
                verify(conn, "tok", Duration::hours(24), later),
                Err(AppError::NotFound(_))
            ));
            assert!(list_proposals(conn, None)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_unknown_token() {
        let db = ProposalDb::open_in_memory().unwrap();
        let result = db.with_conn(|conn| verify(conn, "nope", Duration::hours(24), Utc::now()));

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_failed_effect_leaves_token_unconsumed() {
        let db = ProposalDb::open_in_memory().unwrap();
        let now = Utc::now();

        db.with_conn(|conn| {
            insert_pending(conn, &pending("s1", "tok", proposal_payload("org/model"), now))?;
            conn.execute_batch("DROP TABLE votes;")?;

            assert!(matches!(
                verify(conn, "tok", Duration::hours(24), now),
                Err(AppError::Database(_))
            ));

            let row = find_pending_by_token(conn, "tok")?.unwrap();
            assert!(!row.is_verified);
            assert!(list_proposals(conn, None)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_concurrent_verify_applies_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proposals.db");
        let now = Utc::now();

        let db = ProposalDb::open(&path).unwrap();
        db.with_conn(|conn| {
            seed_proposal(conn, "p1", "org/one")?;
            let payload = SubmissionPayload::BatchVote {
                proposal_ids: vec!["p1".to_string()],
            };
            insert_pending(conn, &pending("s1", "tok", payload, now))
        })
        .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);

                thread::spawn(move || {
                    let db = ProposalDb::open(&path).unwrap();
                    barrier.wait();
                    db.with_conn(|conn| verify(conn, "tok", Duration::hours(24), now))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(AppError::AlreadyUsed)))
                .count(),
            1
        );

        let votes = db.with_conn(|conn| Ok(get_proposal(conn, "p1")?.unwrap().votes)).unwrap();
        assert_eq!(votes, 2);
    }
}
