//! HTTP server implementation

use axum::{
    routing::{get, MethodRouter},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use super::handlers::{
    add_exam, delete_exam, get_exam, get_student, handle_panic, list_all_scores, list_exam_ids,
    list_students, method_not_allowed, not_found, stats_handler, AppState,
};
use crate::scores::ScoreQueries;

/// Build the application router
pub fn router(queries: ScoreQueries) -> Router {
    let routes = Router::new()
        .route("/students", only(get(list_students)))
        .route("/students/:id", only(get(get_student)))
        .route("/exams", only(get(list_exam_ids).post(add_exam)))
        .route("/exams/all", only(get(list_all_scores)))
        .route("/exams/:id", only(get(get_exam).delete(delete_exam)))
        .route("/stats", only(get(stats_handler)))
        .fallback(not_found);

    with_layers(routes).with_state(queries)
}

/// Answer unsupported methods with the generic JSON body
fn only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(method_not_allowed)
}

/// Panic recovery, request tracing and CORS
fn with_layers(routes: Router<AppState>) -> Router<AppState> {
    routes
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the web server until `shutdown` is cancelled
pub async fn run_web_server(
    addr: &str,
    queries: ScoreQueries,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(queries);

    // Start the server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Score API available at http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Web server stopped");
    Ok(())
}
