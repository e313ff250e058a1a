use std::{borrow::Cow, time::Duration};

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    types::Json,
    Connection as _, PgConnection, PgPool,
};
use uuid::Uuid;

use crate::models::{
    BlockedUser, Connection, ConnectionStatus, Listing, ListingStatus, MediaFile, Message,
    NewConnection, NewListing, PendingEdit, PendingListing, PendingVerification, SellerProfile,
    VerificationStatus,
};

const LISTING_COLUMNS: &str = r#"
    id,
    seller_profile_id,
    status,
    title,
    description,
    business_type,
    location,
    postcode,
    asking_price,
    annual_revenue,
    net_profit,
    business_summary,
    business_details,
    rejection_reason,
    created_at,
    updated_at,
    published_at
"#;

const PROFILE_COLUMNS: &str = r#"
    id,
    user_id,
    business_name,
    description,
    address,
    verification_status,
    admin_notes,
    identity_document_url,
    license_document_url,
    additional_document_urls,
    submitted_at,
    reviewed_at,
    reviewed_by,
    created_at,
    updated_at
"#;

const CONNECTION_COLUMNS: &str = r#"
    id,
    listing_id,
    buyer_id,
    status,
    seller_initiated,
    initial_message,
    response_message,
    requested_at,
    responded_at
"#;

/// Owning seller of a listing, resolved in one query for connection and
/// authorization checks.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct ListingOwner {
    pub seller_profile_id: Uuid,
    pub seller_user_id: Uuid,
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = match Self::pool_options().connect(database_url).await {
            Ok(pool) => pool,
            Err(sqlx::Error::Database(db_err)) if db_err.code() == Some(Cow::Borrowed("3D000")) => {
                log::info!("Database missing, attempting to create it");
                create_database_if_missing(database_url).await?;

                Self::pool_options().connect(database_url).await?
            }
            Err(err) => return Err(err),
        };

        // Run embedded migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    fn pool_options() -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Some(Duration::from_secs(600)))
            .test_before_acquire(true)
    }

    // ========================================================================
    // SELLER PROFILES (Verification Workflow)
    // ========================================================================

    pub async fn get_profile_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SellerProfile>, sqlx::Error> {
        sqlx::query_as::<_, SellerProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM seller_profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_profile_by_id(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<SellerProfile>, sqlx::Error> {
        sqlx::query_as::<_, SellerProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM seller_profiles WHERE id = $1"
        ))
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn create_profile(
        &self,
        profile: SellerProfile,
    ) -> Result<SellerProfile, sqlx::Error> {
        sqlx::query_as::<_, SellerProfile>(&format!(
            r#"
            INSERT INTO seller_profiles (
                id,
                user_id,
                business_name,
                description,
                address,
                verification_status,
                admin_notes,
                identity_document_url,
                license_document_url,
                additional_document_urls,
                submitted_at,
                reviewed_at,
                reviewed_by,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(profile.id)
        .bind(profile.user_id)
        .bind(profile.business_name)
        .bind(profile.description)
        .bind(profile.address)
        .bind(profile.verification_status)
        .bind(profile.admin_notes)
        .bind(profile.identity_document_url)
        .bind(profile.license_document_url)
        .bind(profile.additional_document_urls)
        .bind(profile.submitted_at)
        .bind(profile.reviewed_at)
        .bind(profile.reviewed_by)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .fetch_one(&self.pool)
        .await
    }

    /// Records a verification submission. The status guard in the WHERE
    /// clause makes a concurrent duplicate submission come back as `None`
    /// instead of clobbering a review in flight.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_verification(
        &self,
        user_id: Uuid,
        business_name: &str,
        description: Option<&str>,
        address: Option<&str>,
        identity_document_url: &str,
        license_document_url: &str,
        additional_document_urls: &[String],
    ) -> Result<Option<SellerProfile>, sqlx::Error> {
        sqlx::query_as::<_, SellerProfile>(&format!(
            r#"
            UPDATE seller_profiles
            SET business_name = $2,
                description = $3,
                address = $4,
                identity_document_url = $5,
                license_document_url = $6,
                additional_document_urls = $7,
                verification_status = 'submitted_for_review',
                submitted_at = NOW(),
                updated_at = NOW()
            WHERE user_id = $1
              AND verification_status IN ('pending', 'rejected')
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(business_name)
        .bind(description)
        .bind(address)
        .bind(identity_document_url)
        .bind(license_document_url)
        .bind(additional_document_urls)
        .fetch_optional(&self.pool)
        .await
    }

    /// Applies the admin's verification decision; only a profile still
    /// awaiting review can be resolved.
    pub async fn review_verification(
        &self,
        user_id: Uuid,
        new_status: VerificationStatus,
        notes: Option<&str>,
        reviewer_id: Uuid,
    ) -> Result<Option<SellerProfile>, sqlx::Error> {
        sqlx::query_as::<_, SellerProfile>(&format!(
            r#"
            UPDATE seller_profiles
            SET verification_status = $2,
                admin_notes = $3,
                reviewed_at = NOW(),
                reviewed_by = $4,
                updated_at = NOW()
            WHERE user_id = $1
              AND verification_status = 'submitted_for_review'
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(new_status)
        .bind(notes)
        .bind(reviewer_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_pending_verifications(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PendingVerification>, sqlx::Error> {
        sqlx::query_as::<_, PendingVerification>(
            r#"
            SELECT
                id,
                user_id,
                business_name,
                identity_document_url,
                license_document_url,
                additional_document_urls,
                submitted_at
            FROM seller_profiles
            WHERE verification_status = 'submitted_for_review'
            ORDER BY submitted_at ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    // ========================================================================
    // LISTINGS
    // ========================================================================

    pub async fn create_listing(&self, listing: NewListing) -> Result<Listing, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            r#"
            INSERT INTO listings (
                id,
                seller_profile_id,
                status,
                title,
                description,
                business_type,
                location,
                postcode,
                asking_price,
                annual_revenue,
                net_profit,
                business_summary,
                business_details,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(listing.id)
        .bind(listing.seller_profile_id)
        .bind(listing.status)
        .bind(listing.title)
        .bind(listing.description)
        .bind(listing.business_type)
        .bind(listing.location)
        .bind(listing.postcode)
        .bind(listing.asking_price)
        .bind(listing.annual_revenue)
        .bind(listing.net_profit)
        .bind(listing.business_summary)
        .bind(Json(listing.business_details))
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_listing(&self, listing_id: Uuid) -> Result<Option<Listing>, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"
        ))
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_listing_owner(
        &self,
        listing_id: Uuid,
    ) -> Result<Option<ListingOwner>, sqlx::Error> {
        sqlx::query_as::<_, ListingOwner>(
            r#"
            SELECT l.seller_profile_id AS seller_profile_id, p.user_id AS seller_user_id
            FROM listings l
            JOIN seller_profiles p ON p.id = l.seller_profile_id
            WHERE l.id = $1
            "#,
        )
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_published_listings(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Listing>, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            r#"
            SELECT {LISTING_COLUMNS}
            FROM listings
            WHERE status = 'published'
            ORDER BY published_at DESC NULLS LAST
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_listings_for_seller(
        &self,
        seller_profile_id: Uuid,
    ) -> Result<Vec<Listing>, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            r#"
            SELECT {LISTING_COLUMNS}
            FROM listings
            WHERE seller_profile_id = $1
            ORDER BY updated_at DESC
            "#
        ))
        .bind(seller_profile_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Full-row update, used for direct edits of draft/rejected listings.
    pub async fn update_listing(&self, listing: Listing) -> Result<Listing, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            r#"
            UPDATE listings
            SET title = $2,
                description = $3,
                business_type = $4,
                location = $5,
                postcode = $6,
                asking_price = $7,
                annual_revenue = $8,
                net_profit = $9,
                business_summary = $10,
                business_details = $11,
                updated_at = $12
            WHERE id = $1
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(listing.id)
        .bind(listing.title)
        .bind(listing.description)
        .bind(listing.business_type)
        .bind(listing.location)
        .bind(listing.postcode)
        .bind(listing.asking_price)
        .bind(listing.annual_revenue)
        .bind(listing.net_profit)
        .bind(listing.business_summary)
        .bind(listing.business_details)
        .bind(listing.updated_at)
        .fetch_one(&self.pool)
        .await
    }

    /// `draft|rejected -> pending_approval`. The status guard means a
    /// concurrent second submit comes back `None` (state conflict) rather
    /// than silently re-applying.
    pub async fn submit_listing(&self, listing_id: Uuid) -> Result<Option<Listing>, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            r#"
            UPDATE listings
            SET status = 'pending_approval',
                rejection_reason = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND status IN ('draft', 'rejected')
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// `pending_approval -> published | rejected` (admin decision).
    pub async fn moderate_listing(
        &self,
        listing_id: Uuid,
        new_status: ListingStatus,
        rejection_reason: Option<&str>,
    ) -> Result<Option<Listing>, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            r#"
            UPDATE listings
            SET status = $2,
                rejection_reason = $3,
                published_at = CASE
                    WHEN $2::listing_status = 'published' THEN NOW()
                    ELSE published_at
                END,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending_approval'
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(listing_id)
        .bind(new_status)
        .bind(rejection_reason)
        .fetch_optional(&self.pool)
        .await
    }

    /// `published -> archived`.
    pub async fn archive_listing(&self, listing_id: Uuid) -> Result<Option<Listing>, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            r#"
            UPDATE listings
            SET status = 'archived',
                updated_at = NOW()
            WHERE id = $1
              AND status = 'published'
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Irreversible; media, pending edits, connections and messages go with
    /// the row via ON DELETE CASCADE.
    pub async fn delete_listing(&self, listing_id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(listing_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    // ========================================================================
    // PENDING EDITS
    // ========================================================================

    /// A later edit to the same listing replaces the earlier unapproved one.
    pub async fn upsert_pending_edit(
        &self,
        listing_id: Uuid,
        changes: Map<String, Value>,
    ) -> Result<PendingEdit, sqlx::Error> {
        sqlx::query_as::<_, PendingEdit>(
            r#"
            INSERT INTO pending_edits (id, listing_id, changes, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (listing_id)
            DO UPDATE SET changes = EXCLUDED.changes, created_at = NOW()
            RETURNING id, listing_id, changes, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(listing_id)
        .bind(Json(changes))
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_pending_edit(
        &self,
        listing_id: Uuid,
    ) -> Result<Option<PendingEdit>, sqlx::Error> {
        sqlx::query_as::<_, PendingEdit>(
            "SELECT id, listing_id, changes, created_at FROM pending_edits WHERE listing_id = $1",
        )
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Atomically writes the post-diff listing and clears the pending edit.
    /// If the edit row is already gone (approved or rejected concurrently)
    /// the whole transaction rolls back with `RowNotFound`.
    pub async fn apply_pending_edit(
        &self,
        updated: Listing,
        edit_id: Uuid,
    ) -> Result<Listing, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM pending_edits WHERE id = $1")
            .bind(edit_id)
            .execute(tx.as_mut())
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        let listing = sqlx::query_as::<_, Listing>(&format!(
            r#"
            UPDATE listings
            SET title = $2,
                description = $3,
                business_type = $4,
                location = $5,
                postcode = $6,
                asking_price = $7,
                annual_revenue = $8,
                net_profit = $9,
                business_summary = $10,
                business_details = $11,
                updated_at = $12
            WHERE id = $1
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(updated.id)
        .bind(updated.title)
        .bind(updated.description)
        .bind(updated.business_type)
        .bind(updated.location)
        .bind(updated.postcode)
        .bind(updated.asking_price)
        .bind(updated.annual_revenue)
        .bind(updated.net_profit)
        .bind(updated.business_summary)
        .bind(updated.business_details)
        .bind(updated.updated_at)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(listing)
    }

    pub async fn delete_pending_edit(&self, edit_id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM pending_edits WHERE id = $1")
            .bind(edit_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    pub async fn list_pending_listings(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PendingListing>, sqlx::Error> {
        sqlx::query_as::<_, PendingListing>(
            r#"
            SELECT
                id,
                seller_profile_id,
                title,
                business_type,
                location,
                asking_price,
                updated_at
            FROM listings
            WHERE status = 'pending_approval'
            ORDER BY updated_at ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    // ========================================================================
    // MEDIA FILES
    // ========================================================================

    /// Inserts an image, keeping the one-primary invariant: the first image
    /// is always primary, and a new primary demotes the previous one.
    pub async fn add_media_file(
        &self,
        listing_id: Uuid,
        url: &str,
        is_primary: bool,
        position: i32,
    ) -> Result<MediaFile, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM media_files WHERE listing_id = $1")
                .bind(listing_id)
                .fetch_one(tx.as_mut())
                .await?;

        let make_primary = is_primary || existing == 0;
        if make_primary && existing > 0 {
            sqlx::query("UPDATE media_files SET is_primary = FALSE WHERE listing_id = $1")
                .bind(listing_id)
                .execute(tx.as_mut())
                .await?;
        }

        let media = sqlx::query_as::<_, MediaFile>(
            r#"
            INSERT INTO media_files (id, listing_id, url, is_primary, position, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id, listing_id, url, is_primary, position, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(listing_id)
        .bind(url)
        .bind(make_primary)
        .bind(position)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(media)
    }

    pub async fn list_media_files(&self, listing_id: Uuid) -> Result<Vec<MediaFile>, sqlx::Error> {
        sqlx::query_as::<_, MediaFile>(
            r#"
            SELECT id, listing_id, url, is_primary, position, created_at
            FROM media_files
            WHERE listing_id = $1
            ORDER BY position ASC, created_at ASC
            "#,
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await
    }

    // ========================================================================
    // CONNECTIONS
    // ========================================================================

    /// Latest request for the pair; the UI keys off this row alone.
    pub async fn latest_connection(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
    ) -> Result<Option<Connection>, sqlx::Error> {
        sqlx::query_as::<_, Connection>(&format!(
            r#"
            SELECT {CONNECTION_COLUMNS}
            FROM connections
            WHERE listing_id = $1 AND buyer_id = $2
            ORDER BY requested_at DESC
            LIMIT 1
            "#
        ))
        .bind(listing_id)
        .bind(buyer_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Latest request per listing for one buyer, for the batch status
    /// endpoint that replaces per-listing polling.
    pub async fn latest_connections_for_listings(
        &self,
        buyer_id: Uuid,
        listing_ids: &[Uuid],
    ) -> Result<Vec<Connection>, sqlx::Error> {
        sqlx::query_as::<_, Connection>(&format!(
            r#"
            SELECT DISTINCT ON (listing_id) {CONNECTION_COLUMNS}
            FROM connections
            WHERE buyer_id = $1 AND listing_id = ANY($2)
            ORDER BY listing_id, requested_at DESC
            "#
        ))
        .bind(buyer_id)
        .bind(listing_ids)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create_connection(
        &self,
        connection: NewConnection,
    ) -> Result<Connection, sqlx::Error> {
        sqlx::query_as::<_, Connection>(&format!(
            r#"
            INSERT INTO connections (
                id,
                listing_id,
                buyer_id,
                status,
                seller_initiated,
                initial_message,
                requested_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CONNECTION_COLUMNS}
            "#
        ))
        .bind(connection.id)
        .bind(connection.listing_id)
        .bind(connection.buyer_id)
        .bind(connection.status)
        .bind(connection.seller_initiated)
        .bind(connection.initial_message)
        .bind(connection.requested_at)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_connection(
        &self,
        connection_id: Uuid,
    ) -> Result<Option<Connection>, sqlx::Error> {
        sqlx::query_as::<_, Connection>(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = $1"
        ))
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// `pending -> approved | rejected`. The status guard makes a duplicate
    /// response come back `None` instead of double-applying.
    pub async fn respond_connection(
        &self,
        connection_id: Uuid,
        new_status: ConnectionStatus,
        response_message: Option<&str>,
    ) -> Result<Option<Connection>, sqlx::Error> {
        sqlx::query_as::<_, Connection>(&format!(
            r#"
            UPDATE connections
            SET status = $2,
                response_message = $3,
                responded_at = NOW()
            WHERE id = $1
              AND status = 'pending'
            RETURNING {CONNECTION_COLUMNS}
            "#
        ))
        .bind(connection_id)
        .bind(new_status)
        .bind(response_message)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_connections_for_buyer(
        &self,
        buyer_id: Uuid,
    ) -> Result<Vec<Connection>, sqlx::Error> {
        sqlx::query_as::<_, Connection>(&format!(
            r#"
            SELECT {CONNECTION_COLUMNS}
            FROM connections
            WHERE buyer_id = $1
            ORDER BY requested_at DESC
            "#
        ))
        .bind(buyer_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_connections_for_seller(
        &self,
        seller_profile_id: Uuid,
    ) -> Result<Vec<Connection>, sqlx::Error> {
        sqlx::query_as::<_, Connection>(
            r#"
            SELECT
                c.id,
                c.listing_id,
                c.buyer_id,
                c.status,
                c.seller_initiated,
                c.initial_message,
                c.response_message,
                c.requested_at,
                c.responded_at
            FROM connections c
            JOIN listings l ON l.id = c.listing_id
            WHERE l.seller_profile_id = $1
            ORDER BY c.requested_at DESC
            "#,
        )
        .bind(seller_profile_id)
        .fetch_all(&self.pool)
        .await
    }

    // ========================================================================
    // MESSAGES
    // ========================================================================

    pub async fn insert_message(
        &self,
        connection_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> Result<Message, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, connection_id, sender_id, body, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, connection_id, sender_id, body, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(connection_id)
        .bind(sender_id)
        .bind(body)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_messages(&self, connection_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT id, connection_id, sender_id, body, created_at
            FROM messages
            WHERE connection_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await
    }

    // ========================================================================
    // BLOCKED USERS
    // ========================================================================

    pub async fn block_user(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
        reason: Option<&str>,
    ) -> Result<BlockedUser, sqlx::Error> {
        sqlx::query_as::<_, BlockedUser>(
            r#"
            INSERT INTO blocked_users (id, blocker_id, blocked_id, reason, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (blocker_id, blocked_id)
            DO UPDATE SET reason = EXCLUDED.reason
            RETURNING id, blocker_id, blocked_id, reason, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(blocker_id)
        .bind(blocked_id)
        .bind(reason)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn unblock_user(&self, blocker_id: Uuid, blocked_id: Uuid) -> Result<(), sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM blocked_users WHERE blocker_id = $1 AND blocked_id = $2")
                .bind(blocker_id)
                .bind(blocked_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// True if either user has blocked the other; blocks suppress new
    /// connection requests in both directions of initiation.
    pub async fn is_blocked_between(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM blocked_users
                WHERE (blocker_id = $1 AND blocked_id = $2)
                   OR (blocker_id = $2 AND blocked_id = $1)
            )
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_blocks(&self, blocker_id: Uuid) -> Result<Vec<BlockedUser>, sqlx::Error> {
        sqlx::query_as::<_, BlockedUser>(
            r#"
            SELECT id, blocker_id, blocked_id, reason, created_at
            FROM blocked_users
            WHERE blocker_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(blocker_id)
        .fetch_all(&self.pool)
        .await
    }
}

async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    let options: PgConnectOptions = database_url.parse()?;
    let db_name = options
        .get_database()
        .unwrap_or("practice_marketplace")
        .to_string();

    let admin_options = options.database("postgres");
    let mut conn = PgConnection::connect_with(&admin_options).await?;

    let valid_name = db_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_name {
        return Err(sqlx::Error::Configuration(
            format!("refusing to create database with invalid name '{db_name}'").into(),
        ));
    }

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&mut conn)
        .await?;
    log::info!("Database '{db_name}' created");

    Ok(())
}
