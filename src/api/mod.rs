// ============================================================================
// HTTP API - thin actix-web layer over the command handler
// ============================================================================
//
//   POST   /enterprise        create (admin + creator)
//   GET    /enterprise        list by contract end (?limit, ?order=asc|desc)
//   GET    /enterprise/{id}   fetch one
//   PUT    /enterprise/{id}   partial update (admin)
//   DELETE /enterprise/{id}   remove (admin)
//   GET    /event             recent audit events (?limit)
//
// ============================================================================

pub mod auth;
pub mod error;
pub mod routes;

use actix_web::{middleware::Logger, web, App, HttpServer};

pub use auth::Caller;
pub use error::ApiError;
pub use routes::{configure, ApiState};

pub async fn start_api_server(state: web::Data<ApiState>, host: &str, port: u16) -> std::io::Result<()> {
    tracing::info!("🌐 Starting API server on http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await
}
