//! Axum endpoint forwarding diagram descriptions to an external renderer.
//!
//! `POST /service-graph/diagram` takes the form field `dsl_text` (the output
//! of [`diagram::edges`](crate::diagram::edges)), hands it to a
//! [`DiagramRenderer`] and redirects to [`YUML_REDIRECT_BASE`] followed by
//! whatever the renderer answered.
//!
//! ```no_run
//! use lazy_locator::config::{bootstrap, LocatorConfig};
//! use lazy_locator::web::{diagram_router, DiagramRenderer, DiagramState};
//! use lazy_locator::BoxError;
//! use std::sync::Arc;
//!
//! struct Offline;
//!
//! #[async_trait::async_trait]
//! impl DiagramRenderer for Offline {
//!     async fn render(&self, _dsl_text: &str) -> Result<String, BoxError> {
//!         Ok("offline.png".to_string())
//!     }
//! }
//!
//! # async fn run() {
//! let locator = bootstrap(LocatorConfig::default()).unwrap();
//! let app = diagram_router(DiagramState::for_locator(&locator, Arc::new(Offline)));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Locator;
use crate::diagram::YUML_REDIRECT_BASE;
use crate::error::BoxError;

/// Route the diagram endpoint is mounted on.
pub const DIAGRAM_ROUTE: &str = "/service-graph/diagram";

/// How long the renderer may take before the request fails.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts a diagram description to the rendering service and returns the
/// response body, which is the rendered diagram's path on that service.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, dsl_text: &str) -> Result<String, BoxError>;
}

/// State behind [`diagram_router`].
#[derive(Clone)]
pub struct DiagramState {
    renderer: Arc<dyn DiagramRenderer>,
    enabled: bool,
    timeout: Duration,
}

impl DiagramState {
    pub fn new(renderer: Arc<dyn DiagramRenderer>, enabled: bool) -> Self {
        Self {
            renderer,
            enabled,
            timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    /// Enabled exactly when the locator's diagnostics are.
    pub fn for_locator(locator: &Locator, renderer: Arc<dyn DiagramRenderer>) -> Self {
        Self::new(renderer, locator.diagnostics_enabled())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for DiagramState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagramState")
            .field("enabled", &self.enabled)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct DiagramForm {
    #[serde(default)]
    dsl_text: String,
}

/// Why the endpoint did not redirect.
#[derive(Debug)]
pub enum DiagramRejection {
    /// Diagnostics are switched off for this locator.
    Disabled,
    /// The rendering service failed or answered with an error.
    RendererFailed(String),
    TimedOut,
}

impl IntoResponse for DiagramRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            DiagramRejection::Disabled => (StatusCode::BAD_REQUEST, "Diagnostics not enabled, aborting".to_string()),
            DiagramRejection::RendererFailed(reason) => {
                (StatusCode::BAD_GATEWAY, format!("Diagram request failed: {}", reason))
            }
            DiagramRejection::TimedOut => (StatusCode::GATEWAY_TIMEOUT, "Diagram request timed out".to_string()),
        };
        (status, message).into_response()
    }
}

/// Router serving [`DIAGRAM_ROUTE`].
pub fn diagram_router(state: DiagramState) -> Router {
    Router::new()
        .route(DIAGRAM_ROUTE, post(render_diagram))
        .with_state(state)
}

async fn render_diagram(
    State(state): State<DiagramState>,
    Form(form): Form<DiagramForm>,
) -> Result<Redirect, DiagramRejection> {
    if !state.enabled {
        return Err(DiagramRejection::Disabled);
    }

    debug!(bytes = form.dsl_text.len(), "forwarding diagram description");
    let body = match tokio::time::timeout(state.timeout, state.renderer.render(&form.dsl_text)).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => {
            warn!(error = %e, "diagram renderer failed");
            return Err(DiagramRejection::RendererFailed(e.to_string()));
        }
        Err(_) => {
            warn!(timeout = ?state.timeout, "diagram renderer timed out");
            return Err(DiagramRejection::TimedOut);
        }
    };

    Ok(Redirect::to(&format!("{}{}", YUML_REDIRECT_BASE, body.trim())))
}
