use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// ENUMS
// ============================================================================

/// Role carried by every actor (this is also a Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Buyer,
    Seller,
    Admin,
}

/// Seller KYC verification status (also a Postgres enum).
///
/// `Unknown` never comes out of the database; it exists so that an
/// unrecognized status arriving over the wire fails closed instead of
/// slipping past the verification gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "verification_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    SubmittedForReview,
    Approved,
    Rejected,
    #[serde(other)]
    Unknown,
}

/// Listing lifecycle status (also a Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "listing_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Draft,
    PendingApproval,
    Published,
    Rejected,
    Archived,
}

/// Connection request lifecycle status (also a Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "connection_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Approved,
    Rejected,
}

/// Admin decision on a submitted seller verification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationDecision {
    Approve,
    Reject,
}

/// Admin decision on a pending listing or pending edit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModerationOutcome {
    Approve,
    Reject,
}

/// Counterparty decision on a pending connection request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionOutcome {
    Approve,
    Reject,
}

// ============================================================================
// SELLER PROFILES (Verification Workflow)
// ============================================================================

/// Seller profile persisted in database, one per seller user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SellerProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub verification_status: VerificationStatus,
    pub admin_notes: Option<String>,
    pub identity_document_url: Option<String>,
    pub license_document_url: Option<String>,
    pub additional_document_urls: Vec<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SellerProfile {
    /// Blank profile in `pending`, as created implicitly at registration or
    /// by the missing-profile recovery path during draft creation.
    pub fn new_pending(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            business_name: String::new(),
            description: None,
            address: None,
            verification_status: VerificationStatus::Pending,
            admin_notes: None,
            identity_document_url: None,
            license_document_url: None,
            additional_document_urls: Vec::new(),
            submitted_at: None,
            reviewed_at: None,
            reviewed_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Summary row for the admin verification review queue
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingVerification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_name: String,
    pub identity_document_url: Option<String>,
    pub license_document_url: Option<String>,
    pub additional_document_urls: Vec<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

// ============================================================================
// LISTINGS
// ============================================================================

/// Structured practice detail attached to a listing. All fields optional;
/// absent keys deserialize to `None` rather than failing the whole payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusinessDetails {
    pub practice_name: Option<String>,
    pub nhs_contract: Option<bool>,
    pub patient_count: Option<i32>,
    pub staff_count: Option<i32>,
    pub cqc_registered: Option<bool>,
}

/// Practice listing owned by a seller profile
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Listing {
    pub id: Uuid,
    pub seller_profile_id: Uuid,
    pub status: ListingStatus,
    pub title: String,
    pub description: String,
    pub business_type: String,
    pub location: String,
    pub postcode: String,
    /// Whole pounds
    pub asking_price: i64,
    pub annual_revenue: Option<i64>,
    pub net_profit: Option<i64>,
    pub business_summary: Option<String>,
    pub business_details: Json<BusinessDetails>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Helper struct used when inserting a new listing
#[derive(Debug, Clone)]
pub struct NewListing {
    pub id: Uuid,
    pub seller_profile_id: Uuid,
    pub status: ListingStatus,
    pub title: String,
    pub description: String,
    pub business_type: String,
    pub location: String,
    pub postcode: String,
    pub asking_price: i64,
    pub annual_revenue: Option<i64>,
    pub net_profit: Option<i64>,
    pub business_summary: Option<String>,
    pub business_details: BusinessDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Image attached to a listing
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MediaFile {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub url: String,
    pub is_primary: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// Unapplied edit to a published listing; the live row keeps serving its
/// last-approved values until an admin approves this diff.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingEdit {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub changes: Json<serde_json::Map<String, serde_json::Value>>,
    pub created_at: DateTime<Utc>,
}

/// Summary row for the admin listing moderation queue
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingListing {
    pub id: Uuid,
    pub seller_profile_id: Uuid,
    pub title: String,
    pub business_type: String,
    pub location: String,
    pub asking_price: i64,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// CONNECTIONS & MESSAGES
// ============================================================================

/// Connection request between one listing and one buyer
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Connection {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub status: ConnectionStatus,
    pub seller_initiated: bool,
    pub initial_message: Option<String>,
    pub response_message: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Helper struct used when inserting a new connection
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub status: ConnectionStatus,
    pub seller_initiated: bool,
    pub initial_message: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// Chat message inside an approved connection; immutable once created
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Asymmetric block relation; suppresses new connection requests between
/// the two users in either direction of initiation
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockedUser {
    pub id: Uuid,
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// REQUEST/RESPONSE DTOs
// ============================================================================

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

/// Payload sent by sellers to create or update a listing
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ListingPayload {
    #[validate(length(min = 3, max = 160))]
    pub title: String,
    #[validate(length(min = 20, max = 8000))]
    pub description: String,
    #[validate(length(min = 2, max = 80))]
    pub business_type: String,
    #[validate(length(min = 2, max = 160))]
    pub location: String,
    #[validate(length(min = 3, max = 12))]
    pub postcode: String,
    #[validate(range(min = 1))]
    pub asking_price: i64,
    #[validate(range(min = 0))]
    pub annual_revenue: Option<i64>,
    #[validate(range(min = 0))]
    pub net_profit: Option<i64>,
    #[validate(length(max = 8000))]
    pub business_summary: Option<String>,
    pub business_details: Option<BusinessDetails>,
}

impl ListingPayload {
    pub fn into_new_listing(self, seller_profile_id: Uuid) -> NewListing {
        let now = Utc::now();
        NewListing {
            id: Uuid::new_v4(),
            seller_profile_id,
            status: ListingStatus::Draft,
            title: self.title,
            description: self.description,
            business_type: self.business_type,
            location: self.location,
            postcode: self.postcode,
            asking_price: self.asking_price,
            annual_revenue: self.annual_revenue,
            net_profit: self.net_profit,
            business_summary: self.business_summary,
            business_details: self.business_details.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Direct in-place update, used while the listing is still draft/rejected.
    /// Published listings go through the pending-edit diff path instead.
    pub fn apply_to_existing(&self, existing: &mut Listing) {
        existing.title = self.title.clone();
        existing.description = self.description.clone();
        existing.business_type = self.business_type.clone();
        existing.location = self.location.clone();
        existing.postcode = self.postcode.clone();
        existing.asking_price = self.asking_price;
        existing.annual_revenue = self.annual_revenue;
        existing.net_profit = self.net_profit;
        existing.business_summary = self.business_summary.clone();
        if let Some(details) = &self.business_details {
            existing.business_details = Json(details.clone());
        }
        existing.updated_at = Utc::now();
    }
}

/// Seller verification submission (document files are referenced by URL;
/// upload/storage is handled elsewhere)
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitVerificationRequest {
    pub user_id: Uuid,
    #[validate(length(min = 2, max = 160))]
    pub business_name: String,
    #[validate(length(min = 10, max = 4000))]
    pub description: Option<String>,
    #[validate(length(min = 5, max = 300))]
    pub address: Option<String>,
    #[validate(url)]
    pub identity_document_url: String,
    #[validate(url)]
    pub license_document_url: String,
    pub additional_document_urls: Option<Vec<String>>,
}

/// Admin decision payload for `PUT /admin/users/{id}/verify`
#[derive(Debug, Deserialize)]
pub struct VerifyUserRequest {
    pub decision: VerificationDecision,
    pub notes: Option<String>,
}

/// Admin decision payload for `PUT /admin/listings/{id}/approve`.
/// When `edit_id` is set the decision targets that pending edit instead
/// of the listing's own status.
#[derive(Debug, Deserialize)]
pub struct ModerateListingRequest {
    pub decision: ModerationOutcome,
    pub reason: Option<String>,
    pub edit_id: Option<Uuid>,
}

/// Payload to create a connection request. `buyer_id` is required when a
/// seller initiates toward a buyer; buyers connect as themselves.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateConnectionRequest {
    pub listing_id: Uuid,
    pub buyer_id: Option<Uuid>,
    #[validate(length(max = 2000))]
    pub initial_message: Option<String>,
}

/// Counterparty response to a pending connection
#[derive(Debug, Deserialize, Validate)]
pub struct RespondConnectionRequest {
    pub decision: ConnectionOutcome,
    #[validate(length(max = 2000))]
    pub response_message: Option<String>,
}

/// New chat message inside an approved connection
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 4000))]
    pub body: String,
}

/// Payload for block/unblock actions
#[derive(Debug, Deserialize, Validate)]
pub struct BlockUserRequest {
    pub user_id: Uuid,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Payload to attach an image to a listing
#[derive(Debug, Deserialize, Validate)]
pub struct AddMediaRequest {
    #[validate(url)]
    pub url: String,
    pub is_primary: Option<bool>,
    pub position: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================================================
// COMPOSITE RESPONSE TYPES
// ============================================================================

/// Connection status for one (listing, caller) pair, the shape the
/// visibility resolver keys off
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatusResponse {
    pub listing_id: Uuid,
    pub has_connection: bool,
    pub status: Option<ConnectionStatus>,
    pub connection: Option<Connection>,
}

impl ConnectionStatusResponse {
    pub fn from_latest(listing_id: Uuid, latest: Option<Connection>) -> Self {
        Self {
            listing_id,
            has_connection: latest.is_some(),
            status: latest.as_ref().map(|c| c.status),
            connection: latest,
        }
    }
}

/// Seller profile with the gate verdict and next-step guidance
#[derive(Debug, Clone, Serialize)]
pub struct VerificationStatusResponse {
    pub profile: SellerProfile,
    pub can_publish: bool,
    pub next_step: crate::domain::verification::NextStep,
}

/// Pending edit plus the names of the fields it touches, for the owner's
/// "Under Review" tags
#[derive(Debug, Clone, Serialize)]
pub struct PendingChangesResponse {
    pub pending_edit: Option<PendingEdit>,
    pub fields_under_review: Vec<String>,
}

/// Listing as served to one viewer: the redacted view, its images, the
/// viewer's connection state, and (for the owner) the fields a pending edit
/// touches
#[derive(Debug, Clone, Serialize)]
pub struct ListingDetailResponse {
    pub listing: crate::domain::visibility::ListingView,
    pub media: Vec<MediaFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionStatusResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_decision: Option<crate::domain::connection::ConnectionDecision>,
    pub fields_under_review: Vec<String>,
}

/// Connection with its message history
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionWithMessages {
    pub connection: Connection,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_listing_payload() -> ListingPayload {
        ListingPayload {
            title: "Established dental practice".into(),
            description: "Three-surgery practice with a loyal patient base and long-serving staff."
                .into(),
            business_type: "dental".into(),
            location: "Leeds".into(),
            postcode: "LS1 4AP".into(),
            asking_price: 250_000,
            annual_revenue: Some(420_000),
            net_profit: Some(130_000),
            business_summary: Some("NHS contract plus growing private revenue.".into()),
            business_details: None,
        }
    }

    #[test]
    fn listing_payload_accepts_valid_input() {
        assert!(valid_listing_payload().validate().is_ok());
    }

    #[test]
    fn listing_payload_rejects_short_description() {
        let mut payload = valid_listing_payload();
        payload.description = "too short".into();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn listing_payload_rejects_zero_price() {
        let mut payload = valid_listing_payload();
        payload.asking_price = 0;
        assert!(payload.validate().is_err());
    }

    #[test]
    fn unknown_verification_status_fails_closed_on_deserialize() {
        let status: VerificationStatus = serde_json::from_str("\"some_new_state\"").unwrap();
        assert_eq!(status, VerificationStatus::Unknown);
    }

    #[test]
    fn business_details_tolerates_missing_fields() {
        let details: BusinessDetails = serde_json::from_str("{\"nhs_contract\": true}").unwrap();
        assert_eq!(details.nhs_contract, Some(true));
        assert_eq!(details.patient_count, None);
    }

    #[test]
    fn connection_status_response_reports_absence() {
        let listing_id = Uuid::new_v4();
        let resp = ConnectionStatusResponse::from_latest(listing_id, None);
        assert!(!resp.has_connection);
        assert_eq!(resp.status, None);
    }
}
