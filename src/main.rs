mod clients;
mod database;
mod domain;
mod error;
mod handlers;
mod models;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::env;

use crate::clients::notifications::NotificationsClient;
use crate::database::Database;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "8085".to_string());
    let bind_address = format!("{}:{}", host, port);
    let notifications_service_url = env::var("NOTIFICATIONS_SERVICE_URL")
        .unwrap_or_else(|_| "http://localhost:8086".to_string());

    let database_url = env::var("DATABASE_URL").map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "DATABASE_URL must be set in environment",
        )
    })?;

    let db = Database::connect(&database_url).await.map_err(|err| {
        log::error!("Failed to initialize database: {err:?}");
        std::io::Error::new(std::io::ErrorKind::Other, err)
    })?;

    let db_data = web::Data::new(db);
    let notifications_client = web::Data::new(NotificationsClient::new(notifications_service_url));

    log::info!(
        "🚀 Starting Practice Marketplace Service on {}",
        bind_address
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(db_data.clone())
            .app_data(notifications_client.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .service(
                web::scope("/api/v1")
                    // Health
                    .service(handlers::health_check)
                    // Listings
                    .service(handlers::create_listing)
                    .service(handlers::list_listings)
                    .service(handlers::get_listing_detail)
                    .service(handlers::update_listing)
                    .service(handlers::submit_listing)
                    .service(handlers::archive_listing)
                    .service(handlers::delete_listing)
                    .service(handlers::get_pending_changes)
                    .service(handlers::add_listing_media)
                    // Connections (batch status before the parameterized route)
                    .service(handlers::batch_connection_status)
                    .service(handlers::create_connection)
                    .service(handlers::respond_connection)
                    .service(handlers::get_connection_status)
                    .service(handlers::list_my_connections)
                    .service(handlers::list_messages)
                    .service(handlers::send_message)
                    // Seller verification (KYC workflow)
                    .service(handlers::submit_verification)
                    .service(handlers::get_verification)
                    // Admin review queues and decisions
                    .service(handlers::verify_user)
                    .service(handlers::list_pending_verifications)
                    .service(handlers::list_pending_listings)
                    .service(handlers::moderate_listing)
                    .service(handlers::admin_get_listing)
                    // Blocking
                    .service(handlers::block_user)
                    .service(handlers::unblock_user)
                    .service(handlers::list_blocked),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
