//! HTTP server for the order desk API.

use crate::apis;
use axum::{
	routing::{get, post},
	Router,
};
use orderdesk_config::ApiConfig;
use orderdesk_core::{Desk, OrderView};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Long-lived services built from configuration.
	pub desk: Arc<Desk>,
	/// The open view served by this process.
	pub view: Arc<OrderView>,
}

/// Builds the API router under `/api`.
///
/// `timeout` bounds every route except confirm and cancel, which run until
/// the transition completes or fails.
pub fn router(state: AppState, timeout: Duration) -> Router {
	let transitions = Router::new()
		.route("/orders/{id}/confirm", post(apis::orders::confirm))
		.route("/orders/{id}/cancel", post(apis::orders::cancel));

	let bounded = Router::new()
		.route("/orders", get(apis::orders::list_pending))
		.route("/archive", get(apis::archive::list_archive))
		.route(
			"/routing-mode",
			get(apis::routing::get_mode).put(apis::routing::set_mode),
		)
		.route("/routing-mode/toggle", post(apis::routing::toggle_mode))
		.route("/health", get(apis::health::health))
		.layer(TimeoutLayer::new(timeout));

	Router::new()
		.nest("/api", bounded.merge(transitions))
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive()),
		)
		.with_state(state)
}

/// Serves the API until `shutdown` resolves.
pub async fn start_server(
	api_config: ApiConfig,
	state: AppState,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(state, Duration::from_secs(api_config.timeout_seconds));

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;
	tracing::info!(address = %bind_address, "Order desk API listening");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown)
		.await?;
	Ok(())
}
