//! HTTP API
//!
//! Thin actix-web layer over the pipeline: ingest login events, list
//! alerts, resolve alerts. Handlers hold no state of their own; the
//! shared `Pipeline` arrives through app data.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use crate::models::{Alert, AlertStatus, DetectorKind, LoginEvent, Outcome, Severity};
use crate::persistence::AlertFilter;
use crate::pipeline::Pipeline;

/// Ingest payload from the authentication layer
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginEventBody {
    pub subject: String,
    pub source_address: IpAddr,
    pub user_agent: String,
    /// Unix seconds; defaults to the server clock when omitted
    pub timestamp: Option<i64>,
    pub outcome: Outcome,
}

impl LoginEventBody {
    fn into_event(self) -> LoginEvent {
        LoginEvent {
            subject: self.subject,
            source_addr: self.source_address,
            user_agent: self.user_agent,
            timestamp: self
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp()),
            outcome: self.outcome,
        }
    }
}

/// Compact alert view returned from the ingest endpoint
#[derive(Debug, Serialize)]
pub struct AlertSummary {
    pub id: Uuid,
    pub kind: DetectorKind,
    pub severity: Severity,
    pub summary: String,
}

impl From<&Alert> for AlertSummary {
    fn from(alert: &Alert) -> Self {
        AlertSummary {
            id: alert.id,
            kind: alert.kind,
            severity: alert.severity,
            summary: alert.summary.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    accepted: bool,
    alerts: Vec<AlertSummary>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn bad_request(message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorBody { error: message })
}

/// Raw query parameters for GET /alerts; validated into an AlertFilter
#[derive(Debug, Deserialize, Default)]
pub struct AlertQuery {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub kind: Option<String>,
    pub since: Option<i64>,
}

impl AlertQuery {
    fn into_filter(self) -> Result<AlertFilter, String> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<AlertStatus>)
            .transpose()?;
        let severity = self
            .severity
            .as_deref()
            .map(str::parse::<Severity>)
            .transpose()?;
        let kind = self
            .kind
            .as_deref()
            .map(str::parse::<DetectorKind>)
            .transpose()?;
        Ok(AlertFilter {
            status,
            severity,
            kind,
            since: self.since,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub resolution: String,
}

async fn ingest_login(
    pipeline: web::Data<Pipeline>,
    body: web::Json<LoginEventBody>,
) -> HttpResponse {
    let event = body.into_inner().into_event();
    match pipeline.handle_event(&event).await {
        Ok(alerts) => HttpResponse::Accepted().json(IngestResponse {
            accepted: true,
            alerts: alerts.iter().map(AlertSummary::from).collect(),
        }),
        Err(e) => bad_request(e.to_string()),
    }
}

async fn list_alerts(
    pipeline: web::Data<Pipeline>,
    query: web::Query<AlertQuery>,
) -> HttpResponse {
    let filter = match query.into_inner().into_filter() {
        Ok(filter) => filter,
        Err(message) => return bad_request(message),
    };
    match pipeline.alerts(&filter) {
        Ok(alerts) => HttpResponse::Ok().json(alerts),
        Err(e) => {
            log::error!("alert query failed: {}", e);
            HttpResponse::InternalServerError().json(ErrorBody {
                error: "alert query failed".to_string(),
            })
        }
    }
}

async fn resolve_alert(
    pipeline: web::Data<Pipeline>,
    path: web::Path<Uuid>,
    body: web::Json<ResolveBody>,
) -> HttpResponse {
    let id = path.into_inner();
    match pipeline.resolve_alert(id, &body.resolution) {
        Ok(alert) => HttpResponse::Ok().json(alert),
        Err(e) => HttpResponse::NotFound().json(ErrorBody {
            error: e.to_string(),
        }),
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Mount every route on an actix service config
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/events/login").route(web::post().to(ingest_login)))
        .service(web::resource("/alerts").route(web::get().to(list_alerts)))
        .service(web::resource("/alerts/{id}/resolve").route(web::post().to(resolve_alert)));
}
