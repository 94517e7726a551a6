use crate::cli::Args;
use crate::models::scenario::{ all_scenarios, get_scenario };
use crate::trainer::Trainer;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::get,
    Router,
    Json,
    extract::{ Path, State },
    response::IntoResponse,
    http::StatusCode,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error };

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
}

#[derive(Clone)]
struct AppState {
    trainer: Arc<Trainer>,
}

pub fn router(trainer: Arc<Trainer>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/scenarios", get(scenarios_handler))
        .route("/api/scenarios/{id}", get(scenario_handler))
        .route("/api/progress", get(progress_handler))
        .route("/api/reload-prompts", get(reload_prompts_handler))
        .layer(cors)
        .with_state(AppState { trainer })
}

pub async fn start_http_server(
    http_port: u16,
    trainer: Arc<Trainer>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    let app = router(trainer);

    match (args.enable_tls, &args.tls_cert_path, &args.tls_key_path) {
        (true, Some(cert_path), Some(key_path)) => {
            info!("Starting HTTPS API server on: https://{}", addr);
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                cert_path,
                key_path
            ).await?;

            tokio::spawn(async move {
                let result = axum_server
                    ::bind_rustls(addr, tls_config)
                    .serve(app.into_make_service()).await;

                if let Err(e) = result {
                    error!("HTTPS server error: {}", e);
                }
            });
        }
        _ => {
            info!("Starting HTTP API server on: http://{}", addr);
            tokio::spawn(async move {
                match tokio::net::TcpListener::bind(addr).await {
                    Ok(listener) => {
                        if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                            error!("HTTP server error: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                    }
                }
            });
        }
    }

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn scenarios_handler() -> impl IntoResponse {
    Json(all_scenarios())
}

async fn scenario_handler(Path(id): Path<String>) -> impl IntoResponse {
    match get_scenario(&id) {
        Some(scenario) => (StatusCode::OK, Json(json!(scenario))).into_response(),
        None =>
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("Unknown scenario '{}'", id) })),
            ).into_response(),
    }
}

async fn progress_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.trainer.progress().await {
        Ok(progress) => (StatusCode::OK, Json(json!(progress))).into_response(),
        Err(e) => {
            error!("Failed to read progress: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn reload_prompts_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (code, response) = match state.trainer.reload_prompts_if_changed().await {
        Ok(true) => (StatusCode::OK, ReloadResponse { success: true, message: "Prompts reloaded".into() }),
        Ok(false) => (StatusCode::OK, ReloadResponse { success: true, message: "Prompts unchanged".into() }),
        Err(e) => (StatusCode::BAD_REQUEST, ReloadResponse { success: false, message: format!("Reload error: {}", e) }),
    };
    (code, Json(response)).into_response()
}
