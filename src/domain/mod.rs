pub mod connection;
pub mod listing;
pub mod verification;
pub mod visibility;

use crate::models::ListingStatus;

/// Rule violations raised by the state machines. Handlers map these onto the
/// HTTP error taxonomy; none of them should ever reach the backend as a
/// doomed network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("seller verification is not approved; publishing is blocked")]
    VerificationRequired,
    #[error("verification status is unknown - contact support")]
    VerificationStatusUnknown,
    #[error("documents are already under review")]
    AlreadyUnderReview,
    #[error("verification is already approved")]
    AlreadyVerified,
    #[error("verification is not awaiting review")]
    NotAwaitingReview,
    #[error("cannot {action} a listing in status {from:?}")]
    InvalidListingTransition {
        from: ListingStatus,
        action: &'static str,
    },
    #[error("a rejection reason is required")]
    MissingReason,
    #[error("{0}")]
    MissingRequiredField(&'static str),
    #[error("connection requests can only target a published listing")]
    ListingNotPublished,
    #[error("an active connection already exists for this listing")]
    DuplicateConnection,
    #[error("connection requests between these users are blocked")]
    ConnectionBlocked,
    #[error("this connection request has already been resolved")]
    AlreadyResolved,
    #[error("only the counterparty of the request may respond to it")]
    NotCounterparty,
    #[error("messaging requires an approved connection")]
    MessagingLocked,
}
