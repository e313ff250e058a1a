//! Listing lifecycle: draft -> pending_approval -> published/rejected,
//! published -> archived, plus the pending-edit diff machinery that keeps a
//! published listing serving its last-approved values while an edit waits
//! for moderation.

use chrono::Utc;
use serde_json::{Map, Value};

use super::DomainError;
use crate::models::{
    Listing, ListingPayload, ListingStatus, ModerationOutcome, VerificationStatus,
};

/// Seller submits a listing for moderation. Allowed from `draft` (first
/// submission) and `rejected` (resubmission after edits); both paths pass the
/// verification gate first, so an unverified seller fails here before any
/// database write is attempted.
pub fn submit(
    current: ListingStatus,
    seller_verification: VerificationStatus,
) -> Result<ListingStatus, DomainError> {
    if !seller_verification.allows_publishing() {
        if seller_verification == VerificationStatus::Unknown {
            return Err(DomainError::VerificationStatusUnknown);
        }
        return Err(DomainError::VerificationRequired);
    }

    match current {
        ListingStatus::Draft | ListingStatus::Rejected => Ok(ListingStatus::PendingApproval),
        from => Err(DomainError::InvalidListingTransition {
            from,
            action: "submit",
        }),
    }
}

/// Admin resolves a pending listing. Rejection requires a reason that is
/// surfaced back to the owner as feedback.
pub fn moderate(
    current: ListingStatus,
    outcome: ModerationOutcome,
    reason: Option<&str>,
) -> Result<ListingStatus, DomainError> {
    if current != ListingStatus::PendingApproval {
        return Err(DomainError::InvalidListingTransition {
            from: current,
            action: "moderate",
        });
    }

    match outcome {
        ModerationOutcome::Approve => Ok(ListingStatus::Published),
        ModerationOutcome::Reject => {
            if reason.map(str::trim).filter(|r| !r.is_empty()).is_none() {
                return Err(DomainError::MissingReason);
            }
            Ok(ListingStatus::Rejected)
        }
    }
}

/// Guard for applying an approved pending edit. A diff only ever targets a
/// published listing; one that outlived an archive must not be applied.
pub fn can_apply_pending_edit(current: ListingStatus) -> Result<(), DomainError> {
    match current {
        ListingStatus::Published => Ok(()),
        from => Err(DomainError::InvalidListingTransition {
            from,
            action: "apply a pending edit to",
        }),
    }
}

/// Owner (or admin) takes a published listing off the market.
pub fn archive(current: ListingStatus) -> Result<ListingStatus, DomainError> {
    match current {
        ListingStatus::Published => Ok(ListingStatus::Archived),
        from => Err(DomainError::InvalidListingTransition {
            from,
            action: "archive",
        }),
    }
}

/// Required-field check run at submission time. The payload DTO already
/// enforces lengths on create/update; this re-checks the persisted row so a
/// listing drafted under older rules still cannot reach moderation empty.
pub fn validate_for_submission(listing: &Listing) -> Result<(), DomainError> {
    if listing.title.trim().is_empty() {
        return Err(DomainError::MissingRequiredField("title is required"));
    }
    if listing.description.trim().is_empty() {
        return Err(DomainError::MissingRequiredField("description is required"));
    }
    if listing.business_type.trim().is_empty() {
        return Err(DomainError::MissingRequiredField(
            "business type is required",
        ));
    }
    if listing.location.trim().is_empty() {
        return Err(DomainError::MissingRequiredField("location is required"));
    }
    if listing.asking_price <= 0 {
        return Err(DomainError::MissingRequiredField(
            "asking price is required",
        ));
    }
    Ok(())
}

/// Field-by-field diff between the live listing and an edit payload. Only
/// changed fields appear in the map; an empty map means the edit is a no-op
/// and nothing needs moderation.
pub fn compute_pending_changes(live: &Listing, update: &ListingPayload) -> Map<String, Value> {
    let mut changes = Map::new();

    if update.title != live.title {
        changes.insert("title".into(), Value::String(update.title.clone()));
    }
    if update.description != live.description {
        changes.insert(
            "description".into(),
            Value::String(update.description.clone()),
        );
    }
    if update.business_type != live.business_type {
        changes.insert(
            "business_type".into(),
            Value::String(update.business_type.clone()),
        );
    }
    if update.location != live.location {
        changes.insert("location".into(), Value::String(update.location.clone()));
    }
    if update.postcode != live.postcode {
        changes.insert("postcode".into(), Value::String(update.postcode.clone()));
    }
    if update.asking_price != live.asking_price {
        changes.insert("asking_price".into(), Value::from(update.asking_price));
    }
    if update.annual_revenue != live.annual_revenue {
        changes.insert(
            "annual_revenue".into(),
            update.annual_revenue.map(Value::from).unwrap_or(Value::Null),
        );
    }
    if update.net_profit != live.net_profit {
        changes.insert(
            "net_profit".into(),
            update.net_profit.map(Value::from).unwrap_or(Value::Null),
        );
    }
    if update.business_summary != live.business_summary {
        changes.insert(
            "business_summary".into(),
            update
                .business_summary
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
    }
    if let Some(details) = &update.business_details {
        if *details != live.business_details.0 {
            changes.insert(
                "business_details".into(),
                serde_json::to_value(details).unwrap_or(Value::Null),
            );
        }
    }

    changes
}

/// Applies an approved diff onto the live listing. Unrecognized keys are
/// skipped so a diff written by a newer build degrades to a partial apply
/// instead of corrupting the row.
pub fn apply_pending_changes(listing: &mut Listing, changes: &Map<String, Value>) {
    for (field, value) in changes {
        match field.as_str() {
            "title" => {
                if let Some(v) = value.as_str() {
                    listing.title = v.to_string();
                }
            }
            "description" => {
                if let Some(v) = value.as_str() {
                    listing.description = v.to_string();
                }
            }
            "business_type" => {
                if let Some(v) = value.as_str() {
                    listing.business_type = v.to_string();
                }
            }
            "location" => {
                if let Some(v) = value.as_str() {
                    listing.location = v.to_string();
                }
            }
            "postcode" => {
                if let Some(v) = value.as_str() {
                    listing.postcode = v.to_string();
                }
            }
            "asking_price" => {
                if let Some(v) = value.as_i64() {
                    listing.asking_price = v;
                }
            }
            "annual_revenue" => {
                listing.annual_revenue = value.as_i64();
            }
            "net_profit" => {
                listing.net_profit = value.as_i64();
            }
            "business_summary" => {
                listing.business_summary = value.as_str().map(str::to_string);
            }
            "business_details" => {
                if let Ok(details) = serde_json::from_value(value.clone()) {
                    listing.business_details = sqlx::types::Json(details);
                }
            }
            _ => {}
        }
    }
    listing.updated_at = Utc::now();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BusinessDetails;
    use chrono::Utc;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn published_listing() -> Listing {
        let now = Utc::now();
        Listing {
            id: Uuid::new_v4(),
            seller_profile_id: Uuid::new_v4(),
            status: ListingStatus::Published,
            title: "Established dental practice".into(),
            description: "Three-surgery practice with a loyal patient base.".into(),
            business_type: "dental".into(),
            location: "Leeds".into(),
            postcode: "LS1 4AP".into(),
            asking_price: 250_000,
            annual_revenue: Some(420_000),
            net_profit: Some(130_000),
            business_summary: Some("NHS contract plus private revenue.".into()),
            business_details: Json(BusinessDetails::default()),
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            published_at: Some(now),
        }
    }

    fn edit_payload(listing: &Listing) -> ListingPayload {
        ListingPayload {
            title: listing.title.clone(),
            description: listing.description.clone(),
            business_type: listing.business_type.clone(),
            location: listing.location.clone(),
            postcode: listing.postcode.clone(),
            asking_price: listing.asking_price,
            annual_revenue: listing.annual_revenue,
            net_profit: listing.net_profit,
            business_summary: listing.business_summary.clone(),
            business_details: None,
        }
    }

    #[test]
    fn submit_requires_approved_seller() {
        assert_eq!(
            submit(ListingStatus::Draft, VerificationStatus::Pending),
            Err(DomainError::VerificationRequired)
        );
        assert_eq!(
            submit(ListingStatus::Draft, VerificationStatus::SubmittedForReview),
            Err(DomainError::VerificationRequired)
        );
        assert_eq!(
            submit(ListingStatus::Draft, VerificationStatus::Unknown),
            Err(DomainError::VerificationStatusUnknown)
        );
        assert_eq!(
            submit(ListingStatus::Draft, VerificationStatus::Approved),
            Ok(ListingStatus::PendingApproval)
        );
    }

    #[test]
    fn rejected_listing_can_be_resubmitted() {
        assert_eq!(
            submit(ListingStatus::Rejected, VerificationStatus::Approved),
            Ok(ListingStatus::PendingApproval)
        );
    }

    #[test]
    fn published_listing_cannot_be_resubmitted() {
        assert_eq!(
            submit(ListingStatus::Published, VerificationStatus::Approved),
            Err(DomainError::InvalidListingTransition {
                from: ListingStatus::Published,
                action: "submit",
            })
        );
    }

    #[test]
    fn moderation_only_applies_to_pending_listings() {
        assert_eq!(
            moderate(ListingStatus::Published, ModerationOutcome::Approve, None),
            Err(DomainError::InvalidListingTransition {
                from: ListingStatus::Published,
                action: "moderate",
            })
        );
    }

    #[test]
    fn rejection_requires_a_reason() {
        assert_eq!(
            moderate(ListingStatus::PendingApproval, ModerationOutcome::Reject, None),
            Err(DomainError::MissingReason)
        );
        assert_eq!(
            moderate(
                ListingStatus::PendingApproval,
                ModerationOutcome::Reject,
                Some("Asking price missing supporting accounts")
            ),
            Ok(ListingStatus::Rejected)
        );
    }

    #[test]
    fn archive_only_from_published() {
        assert_eq!(archive(ListingStatus::Published), Ok(ListingStatus::Archived));
        assert_eq!(
            archive(ListingStatus::Draft),
            Err(DomainError::InvalidListingTransition {
                from: ListingStatus::Draft,
                action: "archive",
            })
        );
    }

    #[test]
    fn pending_edit_applies_only_to_published_listings() {
        assert_eq!(can_apply_pending_edit(ListingStatus::Published), Ok(()));
        assert_eq!(
            can_apply_pending_edit(ListingStatus::Archived),
            Err(DomainError::InvalidListingTransition {
                from: ListingStatus::Archived,
                action: "apply a pending edit to",
            })
        );
    }

    #[test]
    fn diff_contains_only_changed_fields_and_leaves_base_untouched() {
        let live = published_listing();
        let before = live.clone();
        let mut update = edit_payload(&live);
        update.asking_price = 275_000;
        update.business_summary = Some("Updated summary.".into());

        let changes = compute_pending_changes(&live, &update);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes["asking_price"], Value::from(275_000));
        assert_eq!(changes["business_summary"], Value::from("Updated summary."));
        // The live listing keeps serving its last-approved values.
        assert_eq!(live.asking_price, before.asking_price);
        assert_eq!(live.business_summary, before.business_summary);
    }

    #[test]
    fn identical_edit_produces_empty_diff() {
        let live = published_listing();
        let update = edit_payload(&live);
        assert!(compute_pending_changes(&live, &update).is_empty());
    }

    #[test]
    fn applying_a_diff_targets_only_its_fields() {
        let mut live = published_listing();
        let mut update = edit_payload(&live);
        update.asking_price = 275_000;
        let changes = compute_pending_changes(&live, &update);

        apply_pending_changes(&mut live, &changes);

        assert_eq!(live.asking_price, 275_000);
        assert_eq!(live.title, "Established dental practice");
        assert_eq!(live.net_profit, Some(130_000));
    }

    #[test]
    fn unknown_diff_keys_are_skipped() {
        let mut live = published_listing();
        let mut changes = Map::new();
        changes.insert("no_such_field".into(), Value::from(1));
        changes.insert("asking_price".into(), Value::from(300_000));

        apply_pending_changes(&mut live, &changes);

        assert_eq!(live.asking_price, 300_000);
    }

    #[test]
    fn submission_check_rejects_blank_required_fields() {
        let mut listing = published_listing();
        listing.title = "  ".into();
        assert_eq!(
            validate_for_submission(&listing),
            Err(DomainError::MissingRequiredField("title is required"))
        );
    }
}
