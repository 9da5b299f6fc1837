//! Health and operator HTTP server.
//!
//! Serves the queue endpoints from [`job_queue::admin_router`] plus
//! `POST /templates/backfill`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use core_config::server::AdminServerConfig;
use domain_notifications::{TemplateRenderer, TemplateSeeder};
use eyre::{Result, WrapErr};
use job_queue::{AdminState, admin_router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Template maintenance state for the admin server.
#[derive(Clone)]
pub struct TemplateAdmin {
    pub seeder: Arc<TemplateSeeder>,
    pub renderer: Arc<TemplateRenderer>,
}

/// `POST /templates/backfill`
///
/// Upserts every bundled template, then drops compiled templates so the
/// next render reads the new content.
async fn backfill_handler(
    State(admin): State<TemplateAdmin>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match admin.seeder.backfill_all().await {
        Ok(upserted) => {
            admin.renderer.invalidate_all();
            Ok(Json(json!({ "success": true, "upserted": upserted })))
        }
        Err(e) => {
            error!(error = %e, "Template backfill failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ))
        }
    }
}

pub fn admin_app(queue: AdminState, templates: TemplateAdmin) -> Router {
    let template_routes = Router::new()
        .route("/templates/backfill", post(backfill_handler))
        .with_state(templates);

    admin_router(queue).merge(template_routes)
}

/// Serve `app` until `shutdown` flips to `true`.
pub async fn serve(app: Router, config: &AdminServerConfig, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind admin server to {}", addr))?;

    info!(address = %addr, "Health and admin server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .wrap_err("Admin server failed")?;

    Ok(())
}
