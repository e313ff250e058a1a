//! Verification gate: decides whether a seller may submit or publish
//! listings, and which step the seller should be guided to next.

use serde::Serialize;

use super::DomainError;
use crate::models::{VerificationDecision, VerificationStatus};

/// Guidance surfaced alongside the gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    /// No documents submitted yet; route to the KYC upload.
    SubmitDocuments,
    /// Documents are with an admin; nothing to do but wait.
    UnderReview,
    /// Fully verified; listing creation and publishing are open.
    Ready,
    /// Rejected with admin feedback; documents may be resubmitted.
    Resubmit,
    /// Unrecognized status; fail closed and point at support.
    ContactSupport,
}

impl VerificationStatus {
    /// The gate itself. Only `approved` opens it; anything else, including a
    /// status this build does not recognize, keeps it shut.
    pub fn allows_publishing(self) -> bool {
        matches!(self, VerificationStatus::Approved)
    }

    pub fn next_step(self) -> NextStep {
        match self {
            VerificationStatus::Pending => NextStep::SubmitDocuments,
            VerificationStatus::SubmittedForReview => NextStep::UnderReview,
            VerificationStatus::Approved => NextStep::Ready,
            VerificationStatus::Rejected => NextStep::Resubmit,
            VerificationStatus::Unknown => NextStep::ContactSupport,
        }
    }
}

/// Seller submits (or resubmits) verification documents.
///
/// Allowed from `pending` and `rejected` only; a submission already under
/// review cannot be replaced, and an approved seller has nothing to submit.
pub fn submit_for_review(current: VerificationStatus) -> Result<VerificationStatus, DomainError> {
    match current {
        VerificationStatus::Pending | VerificationStatus::Rejected => {
            Ok(VerificationStatus::SubmittedForReview)
        }
        VerificationStatus::SubmittedForReview => Err(DomainError::AlreadyUnderReview),
        VerificationStatus::Approved => Err(DomainError::AlreadyVerified),
        VerificationStatus::Unknown => Err(DomainError::VerificationStatusUnknown),
    }
}

/// Admin resolves a submitted verification. Rejection requires notes so the
/// seller always has actionable feedback.
pub fn review(
    current: VerificationStatus,
    decision: VerificationDecision,
    notes: Option<&str>,
) -> Result<VerificationStatus, DomainError> {
    if current != VerificationStatus::SubmittedForReview {
        return Err(DomainError::NotAwaitingReview);
    }

    match decision {
        VerificationDecision::Approve => Ok(VerificationStatus::Approved),
        VerificationDecision::Reject => {
            if notes.map(str::trim).filter(|n| !n.is_empty()).is_none() {
                return Err(DomainError::MissingReason);
            }
            Ok(VerificationStatus::Rejected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_opens_only_for_approved() {
        assert!(VerificationStatus::Approved.allows_publishing());
        for status in [
            VerificationStatus::Pending,
            VerificationStatus::SubmittedForReview,
            VerificationStatus::Rejected,
            VerificationStatus::Unknown,
        ] {
            assert!(!status.allows_publishing(), "{status:?} must not publish");
        }
    }

    #[test]
    fn unknown_status_routes_to_support() {
        assert_eq!(
            VerificationStatus::Unknown.next_step(),
            NextStep::ContactSupport
        );
    }

    #[test]
    fn fresh_profile_can_submit() {
        assert_eq!(
            submit_for_review(VerificationStatus::Pending),
            Ok(VerificationStatus::SubmittedForReview)
        );
    }

    #[test]
    fn rejected_profile_can_resubmit_but_gate_stays_closed() {
        let after = submit_for_review(VerificationStatus::Rejected).unwrap();
        assert_eq!(after, VerificationStatus::SubmittedForReview);
        assert!(!VerificationStatus::Rejected.allows_publishing());
        assert!(!after.allows_publishing());
    }

    #[test]
    fn submission_under_review_cannot_be_replaced() {
        assert_eq!(
            submit_for_review(VerificationStatus::SubmittedForReview),
            Err(DomainError::AlreadyUnderReview)
        );
    }

    #[test]
    fn approved_seller_cannot_resubmit() {
        assert_eq!(
            submit_for_review(VerificationStatus::Approved),
            Err(DomainError::AlreadyVerified)
        );
    }

    #[test]
    fn review_requires_awaiting_status() {
        assert_eq!(
            review(
                VerificationStatus::Pending,
                VerificationDecision::Approve,
                None
            ),
            Err(DomainError::NotAwaitingReview)
        );
    }

    #[test]
    fn rejection_requires_notes() {
        assert_eq!(
            review(
                VerificationStatus::SubmittedForReview,
                VerificationDecision::Reject,
                Some("  ")
            ),
            Err(DomainError::MissingReason)
        );
        assert_eq!(
            review(
                VerificationStatus::SubmittedForReview,
                VerificationDecision::Reject,
                Some("Document unclear")
            ),
            Ok(VerificationStatus::Rejected)
        );
    }

    #[test]
    fn approval_opens_the_gate() {
        let status = review(
            VerificationStatus::SubmittedForReview,
            VerificationDecision::Approve,
            None,
        )
        .unwrap();
        assert!(status.allows_publishing());
    }
}
