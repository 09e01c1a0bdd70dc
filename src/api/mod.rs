use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use log::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use utoipa::ToSchema;

use crate::config::SharedConfig;
use crate::connection::{ConnectionState, MeterAddress};
use crate::mqtt::{get_app_status, MqttConnectionStatus};
use crate::registry::{MeterRegistry, MeterStatus, RegistryError};


pub struct ApiManager {
    state: ApiState,
    port: u16,
}

#[derive(Clone)]
pub struct ApiState {
    pub registry: MeterRegistry,
    pub config: SharedConfig,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub mqtt: MqttHealthInfo,
    pub meters: MetersHealthInfo,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Serialize, ToSchema)]
pub struct MqttHealthInfo {
    pub status: String,
    pub last_connected_ago_seconds: Option<u64>,
    pub last_message_sent_ago_seconds: Option<u64>,
    pub connection_attempts: u64,
}

#[derive(Serialize, ToSchema)]
pub struct MetersHealthInfo {
    pub configured: usize,
    pub connected: usize,
}

#[derive(OpenApi)]
#[openapi(
    info(description = "dsmr2mqtt API description"),
    paths(
            health_check,
            list_meters,
            get_meter,
            get_meter_snapshot,
            put_meter_address,
            start_meter,
            stop_meter,
    )
)]
struct ApiDoc;

fn registry_error_response(e: RegistryError) -> HttpResponse {
    match e {
        RegistryError::UnknownMeter(_) => HttpResponse::NotFound().content_type("text/plain").body(e.to_string()),
        RegistryError::SupervisorGone(_) => HttpResponse::ServiceUnavailable().content_type("text/plain").body(e.to_string()),
    }
}

#[utoipa::path(get,
    path = "/health",
    summary = "Health check endpoint for container monitoring",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy")
    ),
)]
async fn health_check(state: web::Data<ApiState>) -> impl Responder {
    let app_status = get_app_status().await;
    let mqtt_health = &app_status.mqtt_health;
    let now = std::time::Instant::now();
    let system_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    // Calculate time differences
    let last_connected_ago = mqtt_health.last_connected
        .map(|t| now.duration_since(t).as_secs());
    let last_message_sent_ago = mqtt_health.last_message_sent
        .map(|t| now.duration_since(t).as_secs());

    let mqtt_status = match &mqtt_health.status {
        MqttConnectionStatus::Connected => "connected",
        MqttConnectionStatus::Disconnected => "disconnected",
        MqttConnectionStatus::Error(_) => "error",
    };

    let meters = state.registry.list().await;
    let connected = meters.iter().filter(|m| m.state == ConnectionState::Connected).count();

    let overall_healthy = matches!(mqtt_health.status, MqttConnectionStatus::Connected) &&
        last_message_sent_ago.unwrap_or(3600) < 300; // Consider healthy if last message sent within 5 minutes

    let response = HealthResponse {
        status: if overall_healthy { "healthy".to_string() } else { "unhealthy".to_string() },
        mqtt: MqttHealthInfo {
            status: mqtt_status.to_string(),
            last_connected_ago_seconds: last_connected_ago,
            last_message_sent_ago_seconds: last_message_sent_ago,
            connection_attempts: mqtt_health.connection_attempts,
        },
        meters: MetersHealthInfo {
            configured: meters.len(),
            connected,
        },
        uptime_seconds: app_status.uptime_seconds(),
        timestamp: system_time,
    };

    if overall_healthy {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

//////////////////// METERS //////////////////////////////////////////////////////////////////////////////////////////////

#[utoipa::path(get,
    path = "/api/v1/meters",
    summary = "Get the status of all configured meters",
    responses(
        (status = 200, description = "Status of every meter", body = Vec<MeterStatus>)
    ),
)]
async fn list_meters(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.registry.list().await)
}

#[utoipa::path(get,
    path = "/api/v1/meters/{name}",
    summary = "Get the status of one meter",
    params(
        ("name" = String, Path, description = "Name of the meter")
    ),
    responses(
        (status = 200, description = "Status of the meter", body = MeterStatus),
        (status = 404, description = "The meter is not configured")
    ),
)]
async fn get_meter(state: web::Data<ApiState>, path: web::Path<String>) -> impl Responder {
    match state.registry.status(&path.into_inner()).await {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => registry_error_response(e),
    }
}

#[utoipa::path(get,
    path = "/api/v1/meters/{name}/snapshot",
    summary = "Get the last decoded telegram of a meter",
    params(
        ("name" = String, Path, description = "Name of the meter")
    ),
    responses(
        (status = 200, description = "The last decoded telegram"),
        (status = 204, description = "No telegram received yet"),
        (status = 404, description = "The meter is not configured")
    ),
)]
async fn get_meter_snapshot(state: web::Data<ApiState>, path: web::Path<String>) -> impl Responder {
    match state.registry.snapshot(&path.into_inner()).await {
        Ok(Some(snapshot)) => HttpResponse::Ok().json(snapshot),
        Ok(None) => HttpResponse::NoContent().finish(),
        Err(e) => registry_error_response(e),
    }
}

#[utoipa::path(put,
    path = "/api/v1/meters/{name}/address",
    summary = "Point a meter to a new address, reconnects right away",
    params(
        ("name" = String, Path, description = "Name of the meter")
    ),
    request_body (content = MeterAddress, description = "New host and port of the meter", content_type = "application/json"),
    responses(
        (status = 200, description = "The address was changed"),
        (status = 400, description = "The address is not usable"),
        (status = 404, description = "The meter is not configured")
    ),
)]
async fn put_meter_address(
    state: web::Data<ApiState>,
    path: web::Path<String>,
    address: web::Json<MeterAddress>,
) -> impl Responder {
    let name = path.into_inner();
    let address = address.into_inner();

    if address.host.trim().is_empty() || address.port == 0 {
        return HttpResponse::BadRequest().body("Host and port are required");
    }

    info!("Changing address of meter {name} to {address}");
    if let Err(e) = state.registry.reconfigure(&name, address.clone()).await {
        return registry_error_response(e);
    }

    match state.config.write() {
        Ok(mut config) => {
            config.update_meter_address(&name, &address);
        }
        Err(_) => error!("Config lock poisoned, address of {name} is not persisted"),
    }

    HttpResponse::Ok().body(format!("Meter '{}' now uses {}", name, address))
}

#[utoipa::path(post,
    path = "/api/v1/meters/{name}/start",
    summary = "Connect a stopped meter",
    params(
        ("name" = String, Path, description = "Name of the meter")
    ),
    responses(
        (status = 200, description = "Start requested"),
        (status = 404, description = "The meter is not configured")
    ),
)]
async fn start_meter(state: web::Data<ApiState>, path: web::Path<String>) -> impl Responder {
    let name = path.into_inner();
    match state.registry.start(&name).await {
        Ok(()) => HttpResponse::Ok().body(format!("Meter '{}' starting", name)),
        Err(e) => registry_error_response(e),
    }
}

#[utoipa::path(post,
    path = "/api/v1/meters/{name}/stop",
    summary = "Disconnect a meter, it stays disconnected until started again",
    params(
        ("name" = String, Path, description = "Name of the meter")
    ),
    responses(
        (status = 200, description = "Stop requested"),
        (status = 404, description = "The meter is not configured")
    ),
)]
async fn stop_meter(state: web::Data<ApiState>, path: web::Path<String>) -> impl Responder {
    let name = path.into_inner();
    match state.registry.stop(&name).await {
        Ok(()) => HttpResponse::Ok().body(format!("Meter '{}' stopped", name)),
        Err(e) => registry_error_response(e),
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/api/v1/meters", web::get().to(list_meters))
        .route("/api/v1/meters/{name}", web::get().to(get_meter))
        .route("/api/v1/meters/{name}/snapshot", web::get().to(get_meter_snapshot))
        .route("/api/v1/meters/{name}/address", web::put().to(put_meter_address))
        .route("/api/v1/meters/{name}/start", web::post().to(start_meter))
        .route("/api/v1/meters/{name}/stop", web::post().to(stop_meter));
}

impl ApiManager {
    pub fn new(registry: MeterRegistry, config: SharedConfig, port: u16) -> Self {
        return ApiManager {
            state: ApiState { registry, config },
            port,
        };
    }

    pub async fn start_thread(&self) -> std::io::Result<()> {
        let state = self.state.clone();

        info!("Starting API on port {}", self.port);
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure_routes)
                .service(
                    SwaggerUi::new("/swagger-ui/{_:.*}")
                        .url("/api/v1/openapi.json", ApiDoc::openapi()),
                )
        })
        .bind(format!("0.0.0.0:{}", self.port))?
        .run();
        server.await
    }
}
