//! HTTP surface: the hot-reload control plane and the catch-all dispatch
//! service that serves generated endpoints.
//!
//! Control plane routes live under `/api/v1`:
//!
//! - `GET  /api/v1/health`: liveness
//! - `GET  /api/v1/reload/status`: full orchestrator status
//! - `POST /api/v1/reload/trigger`: manual / forced / validate-only reload
//! - `POST /api/v1/reload/enable`: clear a failure disablement
//!
//! Generated endpoints are not registered as framework routes; the host
//! mounts [`dispatch`] as its default service and the dispatch router
//! resolves `(method, path)` against the live table on every request.

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use restweave_core::model::HttpMethod;

use crate::orchestrator::{ReloadOrchestrator, ReloadRequest};
use crate::registry::{DispatchRouter, QueryParams};

#[derive(Debug, Default, Deserialize)]
pub struct TriggerReloadBody {
    #[serde(default)]
    pub validate_only: bool,
    #[serde(default)]
    pub force: bool,
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": restweave_core::VERSION,
    }))
}

#[get("/reload/status")]
async fn reload_status(orchestrator: web::Data<Arc<ReloadOrchestrator>>) -> impl Responder {
    HttpResponse::Ok().json(orchestrator.status())
}

#[post("/reload/trigger")]
async fn reload_trigger(
    orchestrator: web::Data<Arc<ReloadOrchestrator>>,
    body: Option<web::Json<TriggerReloadBody>>,
) -> impl Responder {
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let request = if body.validate_only {
        ReloadRequest::validation()
    } else if body.force {
        ReloadRequest::forced()
    } else {
        ReloadRequest::manual()
    };

    let outcome = orchestrator.trigger_reload(request).await;
    if outcome.success {
        HttpResponse::Ok().json(outcome)
    } else if outcome.rejected {
        HttpResponse::Conflict().json(outcome)
    } else {
        HttpResponse::UnprocessableEntity().json(outcome)
    }
}

#[post("/reload/enable")]
async fn reload_enable(orchestrator: web::Data<Arc<ReloadOrchestrator>>) -> impl Responder {
    orchestrator.re_enable();
    HttpResponse::Ok().json(orchestrator.status())
}

/// Mount the control plane under `/api/v1`.
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health)
            .service(reload_status)
            .service(reload_trigger)
            .service(reload_enable),
    );
}

/// Catch-all service resolving generated endpoints against the live route
/// table.
pub async fn dispatch(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
    router: web::Data<Arc<DispatchRouter>>,
) -> HttpResponse {
    let Ok(method) = req.method().as_str().parse::<HttpMethod>() else {
        return HttpResponse::MethodNotAllowed().json(json!({
            "error": format!("unsupported method {}", req.method()),
        }));
    };

    match router.lookup(method, req.path()) {
        None => HttpResponse::NotFound().json(json!({
            "error": "no endpoint for this route",
            "path": req.path(),
        })),
        Some(handler) => {
            let params = QueryParams::from_raw(query.into_inner());
            let response = handler.handle(params).await;
            let status = StatusCode::from_u16(response.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            HttpResponse::build(status).json(response.body)
        }
    }
}
