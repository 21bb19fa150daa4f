use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::domain::enterprise::{
    CreateEnterprise, EnterpriseCommandHandler, SortOrder, UpdateEnterprise,
};

use super::auth::Caller;
use super::error::ApiError;

pub struct ApiState {
    pub handler: Arc<EnterpriseCommandHandler>,
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i32>,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub limit: Option<i32>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/enterprise")
            .route(web::post().to(create_enterprise))
            .route(web::get().to(list_enterprises)),
    )
    .service(
        web::resource("/enterprise/{id}")
            .route(web::get().to(get_enterprise))
            .route(web::put().to(update_enterprise))
            .route(web::delete().to(delete_enterprise)),
    )
    .route("/event", web::get().to(list_events));
}

async fn create_enterprise(
    state: web::Data<ApiState>,
    caller: Caller,
    body: web::Json<CreateEnterprise>,
) -> Result<HttpResponse, ApiError> {
    caller.require_create(&state.auth)?;
    let enterprise = state.handler.create(&caller.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(enterprise))
}

async fn list_enterprises(
    state: web::Data<ApiState>,
    _caller: Caller,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let summaries = state.handler.list(query.limit, query.order).await?;
    Ok(HttpResponse::Ok().json(summaries))
}

async fn get_enterprise(
    state: web::Data<ApiState>,
    _caller: Caller,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let enterprise = state.handler.get(&path).await?;
    Ok(HttpResponse::Ok().json(enterprise))
}

async fn update_enterprise(
    state: web::Data<ApiState>,
    caller: Caller,
    path: web::Path<String>,
    body: web::Json<UpdateEnterprise>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin(&state.auth)?;
    let enterprise = state
        .handler
        .modify(&caller.user_id, &path, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(enterprise))
}

async fn delete_enterprise(
    state: web::Data<ApiState>,
    caller: Caller,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin(&state.auth)?;
    let summary = state.handler.remove(&caller.user_id, &path).await?;
    Ok(HttpResponse::Ok().json(summary))
}

async fn list_events(
    state: web::Data<ApiState>,
    _caller: Caller,
    query: web::Query<EventQuery>,
) -> Result<HttpResponse, ApiError> {
    let events = state.handler.recent_events(query.limit).await?;
    Ok(HttpResponse::Ok().json(events))
}
