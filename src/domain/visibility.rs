//! Visibility resolver: for a (viewer, connection state) pair, decides which
//! business-detail fields of a listing are shown and builds the redacted
//! response view. Gating hides the asking price, business summary (with the
//! financial figures and practice detail), and postcode from buyers without
//! an approved connection; everything else stays visible.

use serde::Serialize;

use crate::models::{BusinessDetails, ConnectionStatus, Listing, ListingStatus, UserRole};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Placeholder served in place of a hidden price.
pub const PRICE_ON_REQUEST: &str = "Price on request";

/// Which gated field groups are shown to the current viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldVisibility {
    pub asking_price: bool,
    pub business_summary: bool,
    pub postcode: bool,
}

impl FieldVisibility {
    pub fn all_shown() -> Self {
        Self {
            asking_price: true,
            business_summary: true,
            postcode: true,
        }
    }

    pub fn all_redacted() -> Self {
        Self {
            asking_price: false,
            business_summary: false,
            postcode: false,
        }
    }
}

/// The resolver. Gated fields are shown iff the viewer is an admin, is not a
/// buyer (sellers always see their own listings in full), or holds an
/// approved connection. `None` (no connection yet) gates exactly like
/// `pending` and `rejected`.
pub fn resolve_visibility(
    viewer_role: UserRole,
    is_admin: bool,
    connection_status: Option<ConnectionStatus>,
) -> FieldVisibility {
    let shown = is_admin
        || viewer_role != UserRole::Buyer
        || connection_status == Some(ConnectionStatus::Approved);
    if shown {
        FieldVisibility::all_shown()
    } else {
        FieldVisibility::all_redacted()
    }
}

/// Listing as served to a viewer. Gated fields are `Option`s that are simply
/// absent when redacted; the underlying values never enter the serialized
/// body, so there is nothing to leak.
#[derive(Debug, Clone, Serialize)]
pub struct ListingView {
    pub id: Uuid,
    pub seller_profile_id: Uuid,
    pub status: ListingStatus,
    pub title: String,
    pub description: String,
    pub business_type: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asking_price: Option<i64>,
    pub price_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual_revenue: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_profit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_details: Option<BusinessDetails>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ListingView {
    /// Builds the view for one viewer. Must be called with a freshly read
    /// connection status after any transition; the mask is never cached.
    pub fn build(listing: &Listing, mask: FieldVisibility) -> Self {
        Self {
            id: listing.id,
            seller_profile_id: listing.seller_profile_id,
            status: listing.status,
            title: listing.title.clone(),
            description: listing.description.clone(),
            business_type: listing.business_type.clone(),
            location: listing.location.clone(),
            postcode: mask.postcode.then(|| listing.postcode.clone()),
            asking_price: mask.asking_price.then_some(listing.asking_price),
            price_display: if mask.asking_price {
                format!("\u{a3}{}", listing.asking_price)
            } else {
                PRICE_ON_REQUEST.to_string()
            },
            annual_revenue: listing.annual_revenue.filter(|_| mask.business_summary),
            net_profit: listing.net_profit.filter(|_| mask.business_summary),
            business_summary: if mask.business_summary {
                listing.business_summary.clone()
            } else {
                None
            },
            business_details: mask
                .business_summary
                .then(|| listing.business_details.0.clone()),
            created_at: listing.created_at,
            published_at: listing.published_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::types::Json;

    fn listing() -> Listing {
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
            business_details: Json(BusinessDetails {
                practice_name: Some("City Dental".into()),
                nhs_contract: Some(true),
                patient_count: Some(5400),
                staff_count: Some(12),
                cqc_registered: Some(true),
            }),
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            published_at: Some(now),
        }
    }

    #[test]
    fn full_permutation_grid() {
        let statuses = [
            None,
            Some(ConnectionStatus::Pending),
            Some(ConnectionStatus::Approved),
            Some(ConnectionStatus::Rejected),
        ];
        let roles = [UserRole::Buyer, UserRole::Seller, UserRole::Admin];

        for role in roles {
            for is_admin in [false, true] {
                for status in statuses {
                    let mask = resolve_visibility(role, is_admin, status);
                    let expected = is_admin
                        || role != UserRole::Buyer
                        || status == Some(ConnectionStatus::Approved);
                    assert_eq!(
                        mask,
                        if expected {
                            FieldVisibility::all_shown()
                        } else {
                            FieldVisibility::all_redacted()
                        },
                        "role {role:?}, is_admin {is_admin}, status {status:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn no_connection_gates_like_pending_and_rejected() {
        for status in [
            None,
            Some(ConnectionStatus::Pending),
            Some(ConnectionStatus::Rejected),
        ] {
            let mask = resolve_visibility(UserRole::Buyer, false, status);
            assert_eq!(mask, FieldVisibility::all_redacted(), "status {status:?}");
        }
    }

    #[test]
    fn redacted_view_never_leaks_gated_values() {
        let listing = listing();
        let view = ListingView::build(
            &listing,
            resolve_visibility(UserRole::Buyer, false, Some(ConnectionStatus::Pending)),
        );
        let body = serde_json::to_string(&view).unwrap();

        assert!(!body.contains("250000"), "price leaked: {body}");
        assert!(!body.contains("420000"), "revenue leaked: {body}");
        assert!(!body.contains("130000"), "profit leaked: {body}");
        assert!(!body.contains("LS1 4AP"), "postcode leaked: {body}");
        assert!(!body.contains("NHS contract plus"), "summary leaked: {body}");
        assert!(!body.contains("City Dental"), "details leaked: {body}");
        assert!(body.contains(PRICE_ON_REQUEST));
        // Non-gated fields stay visible.
        assert!(body.contains("Established dental practice"));
        assert!(body.contains("Leeds"));
    }

    #[test]
    fn approved_buyer_sees_everything() {
        let listing = listing();
        let view = ListingView::build(
            &listing,
            resolve_visibility(UserRole::Buyer, false, Some(ConnectionStatus::Approved)),
        );
        assert_eq!(view.asking_price, Some(250_000));
        assert_eq!(view.postcode.as_deref(), Some("LS1 4AP"));
        assert!(view.business_summary.is_some());
        assert_eq!(view.price_display, "\u{a3}250000");
    }

    #[test]
    fn owner_and_admin_bypass_gating() {
        let listing = listing();
        for (role, is_admin) in [(UserRole::Seller, false), (UserRole::Buyer, true)] {
            let view = ListingView::build(&listing, resolve_visibility(role, is_admin, None));
            assert_eq!(view.asking_price, Some(250_000));
        }
    }

    // Happy-path walk-through: redacted before the request, revealed once the
    // seller approves and the status is re-read.
    #[test]
    fn connect_then_reveal() {
        let listing = listing();

        let before = ListingView::build(&listing, resolve_visibility(UserRole::Buyer, false, None));
        assert_eq!(before.asking_price, None);
        assert_eq!(before.business_summary, None);
        assert_eq!(before.price_display, PRICE_ON_REQUEST);

        let while_pending = ListingView::build(
            &listing,
            resolve_visibility(UserRole::Buyer, false, Some(ConnectionStatus::Pending)),
        );
        assert_eq!(while_pending.asking_price, None);

        let after_approval = ListingView::build(
            &listing,
            resolve_visibility(UserRole::Buyer, false, Some(ConnectionStatus::Approved)),
        );
        assert_eq!(after_approval.asking_price, Some(250_000));
        assert_eq!(
            after_approval.business_summary.as_deref(),
            Some("NHS contract plus private revenue.")
        );
    }
}
