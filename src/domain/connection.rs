//! Connection state machine: per (listing, buyer) request lifecycle that
//! gates messaging and detail visibility. `approved` and `rejected` are
//! terminal for a request instance; a fresh request may follow a rejection.

use serde::Serialize;
use uuid::Uuid;

use super::DomainError;
use crate::models::{Connection, ConnectionOutcome, ConnectionStatus, ListingStatus};

/// What the current viewer may do with a connection, used to render the
/// right controls: the counterparty of a pending request gets
/// approve/reject, the originator only a waiting indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum ConnectionDecision {
    CanRespond,
    AwaitingCounterparty,
    Resolved(ConnectionStatus),
}

/// Creation guard (`none -> pending`). The listing must be published, the
/// pair must not be blocked in either direction, and there must be no
/// active (pending or approved) request for the pair already. A prior
/// rejection does not count as active: re-requesting after rejection is
/// allowed, as a brand new instance.
pub fn can_create(
    listing_status: ListingStatus,
    latest_for_pair: Option<ConnectionStatus>,
    blocked_between: bool,
) -> Result<(), DomainError> {
    if listing_status != ListingStatus::Published {
        return Err(DomainError::ListingNotPublished);
    }
    if blocked_between {
        return Err(DomainError::ConnectionBlocked);
    }
    match latest_for_pair {
        Some(ConnectionStatus::Pending) | Some(ConnectionStatus::Approved) => {
            Err(DomainError::DuplicateConnection)
        }
        Some(ConnectionStatus::Rejected) | None => Ok(()),
    }
}

/// Response guard (`pending -> approved | rejected`). Only the counterparty
/// of the original requester may respond: for a seller-initiated request
/// that is the buyer, otherwise the listing's seller. Direction is checked
/// against the responder's identity, never just their role, so nobody can
/// resolve their own outgoing request.
pub fn respond(
    connection: &Connection,
    responder_id: Uuid,
    seller_user_id: Uuid,
    outcome: ConnectionOutcome,
) -> Result<ConnectionStatus, DomainError> {
    if connection.status != ConnectionStatus::Pending {
        return Err(DomainError::AlreadyResolved);
    }

    let counterparty_id = if connection.seller_initiated {
        connection.buyer_id
    } else {
        seller_user_id
    };
    if responder_id != counterparty_id {
        return Err(DomainError::NotCounterparty);
    }

    Ok(match outcome {
        ConnectionOutcome::Approve => ConnectionStatus::Approved,
        ConnectionOutcome::Reject => ConnectionStatus::Rejected,
    })
}

/// Resolves which control set a viewer should see for a connection.
pub fn decision_for_viewer(
    connection: &Connection,
    viewer_id: Uuid,
    seller_user_id: Uuid,
) -> ConnectionDecision {
    if connection.status != ConnectionStatus::Pending {
        return ConnectionDecision::Resolved(connection.status);
    }

    let counterparty_id = if connection.seller_initiated {
        connection.buyer_id
    } else {
        seller_user_id
    };
    if viewer_id == counterparty_id {
        ConnectionDecision::CanRespond
    } else {
        ConnectionDecision::AwaitingCounterparty
    }
}

/// Membership check for the message thread. Only the buyer and the
/// listing's seller are participants; admins may read a thread for
/// moderation but are never participants and never author messages in it.
pub fn is_participant(connection: &Connection, user_id: Uuid, seller_user_id: Uuid) -> bool {
    user_id == connection.buyer_id || user_id == seller_user_id
}

/// Messaging is unlocked by approval and nothing else.
pub fn can_message(status: ConnectionStatus) -> bool {
    status == ConnectionStatus::Approved
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pending_connection(seller_initiated: bool) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            status: ConnectionStatus::Pending,
            seller_initiated,
            initial_message: Some("Interested in the practice".into()),
            response_message: None,
            requested_at: Utc::now(),
            responded_at: None,
        }
    }

    #[test]
    fn creation_requires_published_listing() {
        assert_eq!(
            can_create(ListingStatus::Draft, None, false),
            Err(DomainError::ListingNotPublished)
        );
        assert_eq!(can_create(ListingStatus::Published, None, false), Ok(()));
    }

    #[test]
    fn creation_blocked_by_block_relation() {
        assert_eq!(
            can_create(ListingStatus::Published, None, true),
            Err(DomainError::ConnectionBlocked)
        );
    }

    #[test]
    fn active_request_prevents_a_second_one() {
        assert_eq!(
            can_create(ListingStatus::Published, Some(ConnectionStatus::Pending), false),
            Err(DomainError::DuplicateConnection)
        );
        assert_eq!(
            can_create(ListingStatus::Published, Some(ConnectionStatus::Approved), false),
            Err(DomainError::DuplicateConnection)
        );
    }

    #[test]
    fn rejection_permits_a_fresh_request() {
        assert_eq!(
            can_create(ListingStatus::Published, Some(ConnectionStatus::Rejected), false),
            Ok(())
        );
    }

    #[test]
    fn buyer_responds_to_seller_initiated_request() {
        let conn = pending_connection(true);
        let seller = Uuid::new_v4();
        assert_eq!(
            respond(&conn, conn.buyer_id, seller, ConnectionOutcome::Approve),
            Ok(ConnectionStatus::Approved)
        );
        // The seller originated it; they may not resolve it themselves.
        assert_eq!(
            respond(&conn, seller, seller, ConnectionOutcome::Approve),
            Err(DomainError::NotCounterparty)
        );
    }

    #[test]
    fn seller_responds_to_buyer_initiated_request() {
        let conn = pending_connection(false);
        let seller = Uuid::new_v4();
        assert_eq!(
            respond(&conn, seller, seller, ConnectionOutcome::Reject),
            Ok(ConnectionStatus::Rejected)
        );
        assert_eq!(
            respond(&conn, conn.buyer_id, seller, ConnectionOutcome::Approve),
            Err(DomainError::NotCounterparty)
        );
    }

    #[test]
    fn resolved_request_rejects_further_responses() {
        let mut conn = pending_connection(false);
        conn.status = ConnectionStatus::Approved;
        let seller = Uuid::new_v4();
        assert_eq!(
            respond(&conn, seller, seller, ConnectionOutcome::Approve),
            Err(DomainError::AlreadyResolved)
        );
        assert_eq!(
            respond(&conn, seller, seller, ConnectionOutcome::Reject),
            Err(DomainError::AlreadyResolved)
        );
    }

    #[test]
    fn viewer_controls_follow_direction() {
        let conn = pending_connection(true);
        let seller = Uuid::new_v4();
        assert_eq!(
            decision_for_viewer(&conn, conn.buyer_id, seller),
            ConnectionDecision::CanRespond
        );
        assert_eq!(
            decision_for_viewer(&conn, seller, seller),
            ConnectionDecision::AwaitingCounterparty
        );

        let conn = pending_connection(false);
        assert_eq!(
            decision_for_viewer(&conn, seller, seller),
            ConnectionDecision::CanRespond
        );
        assert_eq!(
            decision_for_viewer(&conn, conn.buyer_id, seller),
            ConnectionDecision::AwaitingCounterparty
        );
    }

    #[test]
    fn resolved_connection_shows_its_outcome() {
        let mut conn = pending_connection(false);
        conn.status = ConnectionStatus::Rejected;
        let seller = Uuid::new_v4();
        assert_eq!(
            decision_for_viewer(&conn, seller, seller),
            ConnectionDecision::Resolved(ConnectionStatus::Rejected)
        );
    }

    #[test]
    fn only_buyer_and_seller_are_participants() {
        let mut conn = pending_connection(false);
        conn.status = ConnectionStatus::Approved;
        let seller = Uuid::new_v4();
        assert!(is_participant(&conn, conn.buyer_id, seller));
        assert!(is_participant(&conn, seller, seller));
        // Any third party, an admin included, stays outside the thread.
        assert!(!is_participant(&conn, Uuid::new_v4(), seller));
    }

    #[test]
    fn messaging_unlocks_on_approval_only() {
        assert!(can_message(ConnectionStatus::Approved));
        assert!(!can_message(ConnectionStatus::Pending));
        assert!(!can_message(ConnectionStatus::Rejected));
    }
}
