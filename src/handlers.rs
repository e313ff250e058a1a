use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::clients::notifications::{ConnectionEvent, NotificationsClient};
use crate::database::Database;
use crate::domain::{connection as connection_rules, listing as listing_rules, verification};
use crate::domain::visibility::{resolve_visibility, FieldVisibility, ListingView};
use crate::error::ServiceError;
use crate::models::{
    AddMediaRequest, ApiResponse, BlockUserRequest, Connection, ConnectionStatus,
    ConnectionStatusResponse, CreateConnectionRequest, Listing, ListingDetailResponse,
    ListingPayload, ListingStatus, ModerateListingRequest, PaginationQuery,
    PendingChangesResponse, RespondConnectionRequest, SellerProfile, SendMessageRequest,
    SubmitVerificationRequest, UserRole, VerificationStatusResponse, VerifyUserRequest,
};

// ============================================================================
// ACTOR IDENTITY
// ============================================================================

/// Caller identity, injected by the gateway as headers on every
/// authenticated route.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

fn extract_actor(req: &HttpRequest) -> Result<Actor, ServiceError> {
    let id = req
        .headers()
        .get("X-Actor-Id")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ServiceError::Validation("Missing or invalid X-Actor-Id header".into()))?;

    let role = match req
        .headers()
        .get("X-Actor-Role")
        .and_then(|h| h.to_str().ok())
    {
        Some("buyer") => UserRole::Buyer,
        Some("seller") => UserRole::Seller,
        Some("admin") => UserRole::Admin,
        _ => {
            return Err(ServiceError::Validation(
                "Missing or invalid X-Actor-Role header".into(),
            ))
        }
    };

    Ok(Actor { id, role })
}

fn require_admin(actor: &Actor) -> Result<(), ServiceError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::Authorization(
            "This action requires an admin role".into(),
        ))
    }
}

/// Seller profiles belong to sellers only; a buyer must not be able to open
/// or walk the verification workflow for their own account.
fn require_seller(actor: &Actor) -> Result<(), ServiceError> {
    if actor.role == UserRole::Seller || actor.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::Authorization(
            "Seller verification is only available to seller accounts".into(),
        ))
    }
}

/// Loads the caller's seller profile, creating a blank `pending` one if it
/// is missing. This is the single auto-recovery path: a seller whose
/// profile row was never created can still save drafts, and every other
/// missing-row case stays an error.
async fn profile_or_recover(db: &Database, actor: &Actor) -> Result<SellerProfile, ServiceError> {
    if let Some(profile) = db.get_profile_by_user(actor.id).await? {
        return Ok(profile);
    }
    log::warn!("Seller profile missing for user {}, creating one", actor.id);
    Ok(db.create_profile(SellerProfile::new_pending(actor.id)).await?)
}

/// Loads the listing and checks the caller owns it; admins bypass the
/// ownership check.
async fn require_owned_listing(
    db: &Database,
    actor: &Actor,
    listing_id: Uuid,
) -> Result<Listing, ServiceError> {
    let listing = db
        .get_listing(listing_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Listing"))?;

    if !actor.is_admin() {
        let profile = db
            .get_profile_by_user(actor.id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Seller profile"))?;
        if listing.seller_profile_id != profile.id {
            return Err(ServiceError::Authorization(
                "You do not own this listing".into(),
            ));
        }
    }
    Ok(listing)
}

// ============================================================================
// HEALTH CHECK
// ============================================================================

#[get("/health")]
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "practice-marketplace-service",
        "timestamp": chrono::Utc::now()
    }))
}

// ============================================================================
// LISTINGS
// ============================================================================

#[post("/listings")]
pub async fn create_listing(
    req: HttpRequest,
    db: web::Data<Database>,
    payload: web::Json<ListingPayload>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    if actor.role != UserRole::Seller {
        return Err(ServiceError::Authorization(
            "Only sellers can create listings".into(),
        ));
    }

    let body = payload.into_inner();
    body.validate()?;

    // Draft saves are permitted at any verification status; the gate only
    // guards submission for moderation.
    let profile = profile_or_recover(&db, &actor).await?;
    let listing = db.create_listing(body.into_new_listing(profile.id)).await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(listing)))
}

#[get("/listings")]
pub async fn list_listings(
    req: HttpRequest,
    db: web::Data<Database>,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);

    let listings = db.list_published_listings(limit, offset).await?;

    // One batch status read for the whole page instead of a per-listing
    // refetch loop.
    let views: Vec<ListingView> = if actor.role == UserRole::Buyer {
        let ids: Vec<Uuid> = listings.iter().map(|l| l.id).collect();
        let latest = db.latest_connections_for_listings(actor.id, &ids).await?;
        listings
            .iter()
            .map(|listing| {
                let status = latest
                    .iter()
                    .find(|c| c.listing_id == listing.id)
                    .map(|c| c.status);
                ListingView::build(listing, resolve_visibility(actor.role, false, status))
            })
            .collect()
    } else {
        listings
            .iter()
            .map(|listing| {
                ListingView::build(
                    listing,
                    resolve_visibility(actor.role, actor.is_admin(), None),
                )
            })
            .collect()
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(views)))
}

#[get("/listings/{listing_id}")]
pub async fn get_listing_detail(
    req: HttpRequest,
    db: web::Data<Database>,
    listing_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let listing_id = listing_id.into_inner();

    let listing = db
        .get_listing(listing_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Listing"))?;
    let owner = db
        .get_listing_owner(listing_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Listing"))?;

    let is_owner = owner.seller_user_id == actor.id;

    // Unpublished listings exist only for their owner and admins; everyone
    // else gets the same 404 as a missing id.
    if listing.status != ListingStatus::Published && !is_owner && !actor.is_admin() {
        return Err(ServiceError::not_found("Listing"));
    }

    // Connection state is re-read on every request; the mask is never
    // served from a cache across a transition.
    let connection = if actor.role == UserRole::Buyer {
        db.latest_connection(listing_id, actor.id).await?
    } else {
        None
    };
    let connection_status = connection.as_ref().map(|c| c.status);

    let mask = resolve_visibility(actor.role, actor.is_admin(), connection_status);
    let media = db.list_media_files(listing_id).await?;

    let fields_under_review = if is_owner || actor.is_admin() {
        db.get_pending_edit(listing_id)
            .await?
            .map(|edit| edit.changes.0.keys().cloned().collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let connection_decision = connection
        .as_ref()
        .map(|c| connection_rules::decision_for_viewer(c, actor.id, owner.seller_user_id));

    let response = ListingDetailResponse {
        listing: ListingView::build(&listing, mask),
        media,
        connection: connection
            .map(|c| ConnectionStatusResponse::from_latest(listing_id, Some(c))),
        connection_decision,
        fields_under_review,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

#[put("/listings/{listing_id}")]
pub async fn update_listing(
    req: HttpRequest,
    db: web::Data<Database>,
    listing_id: web::Path<Uuid>,
    payload: web::Json<ListingPayload>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let listing_id = listing_id.into_inner();

    let body = payload.into_inner();
    body.validate()?;

    let mut listing = require_owned_listing(&db, &actor, listing_id).await?;

    match listing.status {
        // A published listing never mutates directly; the edit is parked as
        // a diff until an admin approves it.
        ListingStatus::Published => {
            let changes = listing_rules::compute_pending_changes(&listing, &body);
            if changes.is_empty() {
                return Ok(HttpResponse::Ok().json(ApiResponse::success(
                    PendingChangesResponse {
                        pending_edit: None,
                        fields_under_review: Vec::new(),
                    },
                )));
            }
            let fields_under_review = changes.keys().cloned().collect();
            let pending_edit = db.upsert_pending_edit(listing_id, changes).await?;
            Ok(HttpResponse::Ok().json(ApiResponse::success(PendingChangesResponse {
                pending_edit: Some(pending_edit),
                fields_under_review,
            })))
        }
        ListingStatus::Draft | ListingStatus::Rejected => {
            body.apply_to_existing(&mut listing);
            let updated = db.update_listing(listing).await?;
            Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
        }
        ListingStatus::PendingApproval => Err(ServiceError::StateConflict(
            "Listing is under review and cannot be edited until resolved".into(),
        )),
        ListingStatus::Archived => Err(ServiceError::StateConflict(
            "Archived listings cannot be edited".into(),
        )),
    }
}

#[post("/listings/{listing_id}/submit")]
pub async fn submit_listing(
    req: HttpRequest,
    db: web::Data<Database>,
    listing_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let listing_id = listing_id.into_inner();

    let listing = require_owned_listing(&db, &actor, listing_id).await?;
    let owner_profile = db
        .get_profile_by_id(listing.seller_profile_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Seller profile"))?;

    // Gate and field checks run before any write; an unverified seller is
    // stopped here, not by a doomed transition.
    listing_rules::validate_for_submission(&listing)?;
    listing_rules::submit(listing.status, owner_profile.verification_status)?;

    let submitted = db
        .submit_listing(listing_id)
        .await?
        .ok_or_else(|| ServiceError::StateConflict("Listing is no longer submittable".into()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(submitted)))
}

#[post("/listings/{listing_id}/archive")]
pub async fn archive_listing(
    req: HttpRequest,
    db: web::Data<Database>,
    listing_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let listing_id = listing_id.into_inner();

    let listing = require_owned_listing(&db, &actor, listing_id).await?;
    listing_rules::archive(listing.status)?;

    let archived = db
        .archive_listing(listing_id)
        .await?
        .ok_or_else(|| ServiceError::StateConflict("Listing is no longer published".into()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(archived)))
}

#[derive(Debug, Deserialize)]
pub struct DeleteConfirmQuery {
    pub confirm: Option<bool>,
}

#[delete("/listings/{listing_id}")]
pub async fn delete_listing(
    req: HttpRequest,
    db: web::Data<Database>,
    listing_id: web::Path<Uuid>,
    query: web::Query<DeleteConfirmQuery>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let listing_id = listing_id.into_inner();

    // Deletion is irreversible and cascades to media and pending edits, so
    // it demands an explicit acknowledgment.
    if query.confirm != Some(true) {
        return Err(ServiceError::Validation(
            "Deletion requires confirm=true".into(),
        ));
    }

    require_owned_listing(&db, &actor, listing_id).await?;
    db.delete_listing(listing_id).await?;

    Ok(HttpResponse::NoContent().finish())
}

#[get("/listings/{listing_id}/pending-changes")]
pub async fn get_pending_changes(
    req: HttpRequest,
    db: web::Data<Database>,
    listing_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let listing_id = listing_id.into_inner();

    require_owned_listing(&db, &actor, listing_id).await?;

    let pending_edit = db.get_pending_edit(listing_id).await?;
    let fields_under_review = pending_edit
        .as_ref()
        .map(|edit| edit.changes.0.keys().cloned().collect())
        .unwrap_or_default();

    Ok(HttpResponse::Ok().json(ApiResponse::success(PendingChangesResponse {
        pending_edit,
        fields_under_review,
    })))
}

#[post("/listings/{listing_id}/media")]
pub async fn add_listing_media(
    req: HttpRequest,
    db: web::Data<Database>,
    listing_id: web::Path<Uuid>,
    payload: web::Json<AddMediaRequest>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let listing_id = listing_id.into_inner();

    let body = payload.into_inner();
    body.validate()?;

    require_owned_listing(&db, &actor, listing_id).await?;

    let media = db
        .add_media_file(
            listing_id,
            &body.url,
            body.is_primary.unwrap_or(false),
            body.position.unwrap_or(0),
        )
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(media)))
}

// ============================================================================
// CONNECTIONS
// ============================================================================

#[post("/connections")]
pub async fn create_connection(
    req: HttpRequest,
    db: web::Data<Database>,
    notifier: web::Data<NotificationsClient>,
    payload: web::Json<CreateConnectionRequest>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let body = payload.into_inner();
    body.validate()?;

    let listing = db
        .get_listing(body.listing_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Listing"))?;
    let owner = db
        .get_listing_owner(body.listing_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Listing"))?;

    let (buyer_id, seller_initiated) = match actor.role {
        UserRole::Buyer => (actor.id, false),
        UserRole::Seller => {
            if owner.seller_user_id != actor.id {
                return Err(ServiceError::Authorization(
                    "Only the listing's seller can initiate from the sell side".into(),
                ));
            }
            let buyer_id = body.buyer_id.ok_or_else(|| {
                ServiceError::Validation(
                    "buyer_id is required for a seller-initiated connection".into(),
                )
            })?;
            (buyer_id, true)
        }
        UserRole::Admin => {
            return Err(ServiceError::Authorization(
                "Admins cannot create connections".into(),
            ))
        }
    };

    let latest = db.latest_connection(body.listing_id, buyer_id).await?;
    let blocked = db
        .is_blocked_between(buyer_id, owner.seller_user_id)
        .await?;
    connection_rules::can_create(listing.status, latest.map(|c| c.status), blocked)?;

    let connection = db
        .create_connection(crate::models::NewConnection {
            id: Uuid::new_v4(),
            listing_id: body.listing_id,
            buyer_id,
            status: ConnectionStatus::Pending,
            seller_initiated,
            initial_message: body.initial_message,
            requested_at: chrono::Utc::now(),
        })
        .await?;

    notify_connection(&notifier, &connection, ConnectionEvent::Requested);

    Ok(HttpResponse::Created().json(ApiResponse::success(connection)))
}

#[put("/connections/{connection_id}/status")]
pub async fn respond_connection(
    req: HttpRequest,
    db: web::Data<Database>,
    notifier: web::Data<NotificationsClient>,
    connection_id: web::Path<Uuid>,
    payload: web::Json<RespondConnectionRequest>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let connection_id = connection_id.into_inner();

    let body = payload.into_inner();
    body.validate()?;

    let connection = db
        .get_connection(connection_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Connection"))?;
    let owner = db
        .get_listing_owner(connection.listing_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Listing"))?;

    let new_status =
        connection_rules::respond(&connection, actor.id, owner.seller_user_id, body.decision)?;

    // The WHERE status = 'pending' guard makes a racing duplicate response
    // surface as a conflict instead of double-applying.
    let updated = db
        .respond_connection(connection_id, new_status, body.response_message.as_deref())
        .await?
        .ok_or_else(|| {
            ServiceError::StateConflict("This connection request has already been resolved".into())
        })?;

    notify_connection(&notifier, &updated, ConnectionEvent::Resolved);

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

#[get("/connections/status")]
pub async fn batch_connection_status(
    req: HttpRequest,
    db: web::Data<Database>,
    query: web::Query<BatchStatusQuery>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;

    let listing_ids: Vec<Uuid> = query
        .listing_ids
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| Uuid::parse_str(s.trim()))
        .collect::<Result<_, _>>()
        .map_err(|_| ServiceError::Validation("listing_ids must be a comma-separated list of UUIDs".into()))?;

    let latest = db
        .latest_connections_for_listings(actor.id, &listing_ids)
        .await?;

    let statuses: Vec<ConnectionStatusResponse> = listing_ids
        .into_iter()
        .map(|listing_id| {
            let connection = latest.iter().find(|c| c.listing_id == listing_id).cloned();
            ConnectionStatusResponse::from_latest(listing_id, connection)
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(statuses)))
}

#[derive(Debug, Deserialize)]
pub struct BatchStatusQuery {
    pub listing_ids: String,
}

#[get("/connections/{listing_id}/status")]
pub async fn get_connection_status(
    req: HttpRequest,
    db: web::Data<Database>,
    listing_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let listing_id = listing_id.into_inner();

    let latest = db.latest_connection(listing_id, actor.id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(
        ConnectionStatusResponse::from_latest(listing_id, latest),
    )))
}

#[get("/connections")]
pub async fn list_my_connections(
    req: HttpRequest,
    db: web::Data<Database>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;

    let connections = match actor.role {
        UserRole::Buyer => db.list_connections_for_buyer(actor.id).await?,
        UserRole::Seller => {
            let profile = db
                .get_profile_by_user(actor.id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Seller profile"))?;
            db.list_connections_for_seller(profile.id).await?
        }
        UserRole::Admin => {
            return Err(ServiceError::Authorization(
                "Admins do not hold connections".into(),
            ))
        }
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(connections)))
}

async fn seller_of_connection(
    db: &Database,
    connection: &Connection,
) -> Result<Uuid, ServiceError> {
    Ok(db
        .get_listing_owner(connection.listing_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Listing"))?
        .seller_user_id)
}

#[get("/connections/{connection_id}/messages")]
pub async fn list_messages(
    req: HttpRequest,
    db: web::Data<Database>,
    connection_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let connection_id = connection_id.into_inner();

    let connection = db
        .get_connection(connection_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Connection"))?;

    // Admins may read a thread for moderation; everyone else must be a party.
    let seller_id = seller_of_connection(&db, &connection).await?;
    if !actor.is_admin() && !connection_rules::is_participant(&connection, actor.id, seller_id) {
        return Err(ServiceError::Authorization(
            "You are not a party to this connection".into(),
        ));
    }

    let messages = db.list_messages(connection_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(
        crate::models::ConnectionWithMessages {
            connection,
            messages,
        },
    )))
}

#[post("/connections/{connection_id}/messages")]
pub async fn send_message(
    req: HttpRequest,
    db: web::Data<Database>,
    connection_id: web::Path<Uuid>,
    payload: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let connection_id = connection_id.into_inner();

    let body = payload.into_inner();
    body.validate()?;

    let connection = db
        .get_connection(connection_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Connection"))?;

    // Authorship is participant-only; no admin bypass here.
    let seller_id = seller_of_connection(&db, &connection).await?;
    if !connection_rules::is_participant(&connection, actor.id, seller_id) {
        return Err(ServiceError::Authorization(
            "Only the connection's participants may send messages".into(),
        ));
    }

    if !connection_rules::can_message(connection.status) {
        return Err(crate::domain::DomainError::MessagingLocked.into());
    }

    let message = db.insert_message(connection_id, actor.id, &body.body).await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(message)))
}

// ============================================================================
// SELLER VERIFICATION
// ============================================================================

#[post("/users/seller-verification")]
pub async fn submit_verification(
    req: HttpRequest,
    db: web::Data<Database>,
    payload: web::Json<SubmitVerificationRequest>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    require_seller(&actor)?;
    let body = payload.into_inner();
    body.validate()?;

    if body.user_id != actor.id && !actor.is_admin() {
        return Err(ServiceError::Authorization(
            "You can only submit verification for your own account".into(),
        ));
    }

    let profile = profile_or_recover(&db, &Actor {
        id: body.user_id,
        role: UserRole::Seller,
    })
    .await?;

    // Transition check against the freshly read status; the UPDATE below
    // re-checks it at the row level.
    verification::submit_for_review(profile.verification_status)?;

    let additional = body.additional_document_urls.unwrap_or_default();
    let updated = db
        .submit_verification(
            body.user_id,
            &body.business_name,
            body.description.as_deref(),
            body.address.as_deref(),
            &body.identity_document_url,
            &body.license_document_url,
            &additional,
        )
        .await?
        .ok_or_else(|| {
            ServiceError::StateConflict("Verification is no longer open for submission".into())
        })?;

    let can_publish = updated.verification_status.allows_publishing();
    let next_step = updated.verification_status.next_step();
    Ok(HttpResponse::Ok().json(ApiResponse::success(VerificationStatusResponse {
        profile: updated,
        can_publish,
        next_step,
    })))
}

#[get("/users/{user_id}/seller-verification")]
pub async fn get_verification(
    req: HttpRequest,
    db: web::Data<Database>,
    user_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    require_seller(&actor)?;
    let user_id = user_id.into_inner();

    if user_id != actor.id && !actor.is_admin() {
        return Err(ServiceError::Authorization(
            "You can only view your own verification status".into(),
        ));
    }

    let profile = db
        .get_profile_by_user(user_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Seller profile"))?;

    let can_publish = profile.verification_status.allows_publishing();
    let next_step = profile.verification_status.next_step();
    Ok(HttpResponse::Ok().json(ApiResponse::success(VerificationStatusResponse {
        profile,
        can_publish,
        next_step,
    })))
}

// ============================================================================
// ADMIN: VERIFICATION & MODERATION
// ============================================================================

#[put("/admin/users/{user_id}/verify")]
pub async fn verify_user(
    req: HttpRequest,
    db: web::Data<Database>,
    user_id: web::Path<Uuid>,
    payload: web::Json<VerifyUserRequest>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    require_admin(&actor)?;
    let user_id = user_id.into_inner();
    let body = payload.into_inner();

    let profile = db
        .get_profile_by_user(user_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Seller profile"))?;

    let new_status = verification::review(
        profile.verification_status,
        body.decision,
        body.notes.as_deref(),
    )?;

    let updated = db
        .review_verification(user_id, new_status, body.notes.as_deref(), actor.id)
        .await?
        .ok_or_else(|| {
            ServiceError::StateConflict("This verification has already been resolved".into())
        })?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

#[get("/admin/verifications/pending")]
pub async fn list_pending_verifications(
    req: HttpRequest,
    db: web::Data<Database>,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    require_admin(&actor)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);

    let pending = db.list_pending_verifications(limit, offset).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(pending)))
}

#[put("/admin/listings/{listing_id}/approve")]
pub async fn moderate_listing(
    req: HttpRequest,
    db: web::Data<Database>,
    listing_id: web::Path<Uuid>,
    payload: web::Json<ModerateListingRequest>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    require_admin(&actor)?;
    let listing_id = listing_id.into_inner();
    let body = payload.into_inner();

    let listing = db
        .get_listing(listing_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Listing"))?;

    // A decision carrying an edit_id targets the pending edit of a
    // published listing, not the listing's own status.
    if let Some(edit_id) = body.edit_id {
        let edit = db
            .get_pending_edit(listing_id)
            .await?
            .filter(|e| e.id == edit_id)
            .ok_or_else(|| ServiceError::not_found("Pending edit"))?;

        return match body.decision {
            crate::models::ModerationOutcome::Approve => {
                // A diff parked before an archive race must not be applied.
                listing_rules::can_apply_pending_edit(listing.status)?;
                let mut updated = listing;
                listing_rules::apply_pending_changes(&mut updated, &edit.changes.0);
                let applied = db.apply_pending_edit(updated, edit_id).await.map_err(|e| {
                    if matches!(e, sqlx::Error::RowNotFound) {
                        ServiceError::StateConflict(
                            "This pending edit has already been resolved".into(),
                        )
                    } else {
                        e.into()
                    }
                })?;
                Ok(HttpResponse::Ok().json(ApiResponse::success(applied)))
            }
            crate::models::ModerationOutcome::Reject => {
                if body.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()).is_none() {
                    return Err(crate::domain::DomainError::MissingReason.into());
                }
                db.delete_pending_edit(edit_id).await.map_err(|e| {
                    if matches!(e, sqlx::Error::RowNotFound) {
                        ServiceError::StateConflict(
                            "This pending edit has already been resolved".into(),
                        )
                    } else {
                        e.into()
                    }
                })?;
                Ok(HttpResponse::Ok().json(ApiResponse::success(listing)))
            }
        };
    }

    let new_status =
        listing_rules::moderate(listing.status, body.decision, body.reason.as_deref())?;

    let updated = db
        .moderate_listing(listing_id, new_status, body.reason.as_deref())
        .await?
        .ok_or_else(|| {
            ServiceError::StateConflict("This listing has already been moderated".into())
        })?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

#[get("/admin/listings/pending")]
pub async fn list_pending_listings(
    req: HttpRequest,
    db: web::Data<Database>,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    require_admin(&actor)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);

    let pending = db.list_pending_listings(limit, offset).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(pending)))
}

#[get("/admin/listings/{listing_id}")]
pub async fn admin_get_listing(
    req: HttpRequest,
    db: web::Data<Database>,
    listing_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    require_admin(&actor)?;
    let listing_id = listing_id.into_inner();

    let listing = db
        .get_listing(listing_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Listing"))?;
    let media = db.list_media_files(listing_id).await?;
    let fields_under_review = db
        .get_pending_edit(listing_id)
        .await?
        .map(|edit| edit.changes.0.keys().cloned().collect())
        .unwrap_or_default();

    let response = ListingDetailResponse {
        listing: ListingView::build(&listing, FieldVisibility::all_shown()),
        media,
        connection: None,
        connection_decision: None,
        fields_under_review,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

// ============================================================================
// BLOCKING
// ============================================================================

#[post("/blocking/block")]
pub async fn block_user(
    req: HttpRequest,
    db: web::Data<Database>,
    payload: web::Json<BlockUserRequest>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let body = payload.into_inner();
    body.validate()?;

    if body.user_id == actor.id {
        return Err(ServiceError::Validation("You cannot block yourself".into()));
    }

    let block = db
        .block_user(actor.id, body.user_id, body.reason.as_deref())
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(block)))
}

#[post("/blocking/unblock")]
pub async fn unblock_user(
    req: HttpRequest,
    db: web::Data<Database>,
    payload: web::Json<BlockUserRequest>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let body = payload.into_inner();

    db.unblock_user(actor.id, body.user_id).await?;

    Ok(HttpResponse::NoContent().finish())
}

#[get("/blocking")]
pub async fn list_blocked(
    req: HttpRequest,
    db: web::Data<Database>,
) -> Result<HttpResponse, ServiceError> {
    let actor = extract_actor(&req)?;
    let blocks = db.list_blocks(actor.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(blocks)))
}

// ============================================================================
// NOTIFICATIONS (best-effort)
// ============================================================================

/// Fire-and-forget; a notification failure never blocks or rolls back the
/// transition it reports.
fn notify_connection(
    notifier: &web::Data<NotificationsClient>,
    connection: &Connection,
    event: ConnectionEvent,
) {
    let notifier = NotificationsClient::clone(notifier);
    let connection = connection.clone();
    actix_web::rt::spawn(async move {
        if let Err(err) = notifier.connection_event(event, &connection).await {
            log::warn!(
                "Failed to deliver {event:?} notification for connection {}: {err}",
                connection.id
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn actor(role: UserRole) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn actor_headers_are_required() {
        let req = TestRequest::default().to_http_request();
        assert!(extract_actor(&req).is_err());

        let req = TestRequest::default()
            .insert_header(("X-Actor-Id", Uuid::new_v4().to_string()))
            .insert_header(("X-Actor-Role", "superuser"))
            .to_http_request();
        assert!(extract_actor(&req).is_err());
    }

    #[test]
    fn actor_headers_round_trip() {
        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header(("X-Actor-Id", id.to_string()))
            .insert_header(("X-Actor-Role", "seller"))
            .to_http_request();
        let actor = extract_actor(&req).unwrap();
        assert_eq!(actor.id, id);
        assert_eq!(actor.role, UserRole::Seller);
    }

    #[test]
    fn verification_workflow_is_closed_to_buyers() {
        assert!(require_seller(&actor(UserRole::Buyer)).is_err());
        assert!(require_seller(&actor(UserRole::Seller)).is_ok());
        assert!(require_seller(&actor(UserRole::Admin)).is_ok());
    }

    #[test]
    fn admin_actions_are_closed_to_everyone_else() {
        assert!(require_admin(&actor(UserRole::Buyer)).is_err());
        assert!(require_admin(&actor(UserRole::Seller)).is_err());
        assert!(require_admin(&actor(UserRole::Admin)).is_ok());
    }
}
