//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with a catch-all dispatch handler
//! - Wire up middleware (tracing, timeout, concurrency limit, request ID)
//! - Hand every request to the worker's `RequestPipeline`
//! - Report completed requests to the parent process
//! - Observability (metrics, correlation IDs)

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::cluster::ipc::IpcNotifier;
use crate::config::HttpConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::metrics;
use crate::pipeline::{RequestContext, RequestPipeline};

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RequestPipeline>,
    /// Present when this process runs under a cluster supervisor.
    pub notifier: Option<IpcNotifier>,
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState, config: &HttpConfig) -> Router {
    Router::new()
        .route("/{*path}", any(dispatch))
        .route("/", any(dispatch))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        // One semaphore shared by every route.
        .layer(GlobalConcurrencyLimitLayer::new(config.server.max_connections))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

/// Single entry point for every request.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let (parts, body) = request.into_parts();
    let ctx = RequestContext::from_parts(&parts);

    tracing::debug!(
        request_id = %ctx.request_id,
        method = %parts.method,
        path = %ctx.path,
        "Dispatching request"
    );

    let reply = state.pipeline.handle(ctx, body.into_data_stream()).await;

    metrics::record_request(parts.method.as_str(), reply.status.as_u16(), start_time);
    if let Some(notifier) = &state.notifier {
        notifier.notify_request();
    }

    reply.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BodyConfig;
    use crate::pipeline::{handler_fn, BoxFuture, Filters, Flow, Handler, HandlerResult, SharedHandler};
    use crate::routing::RouteTable;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct Occupancy {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Handler for Occupancy {
        fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async move {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                ctx.respond(StatusCode::OK, "done");
                Ok(Flow::Next)
            })
        }
    }

    fn router(notifier: Option<IpcNotifier>) -> Router {
        let mut routes = RouteTable::builder();
        routes.get(
            "/hello",
            handler_fn(|ctx| {
                ctx.respond(StatusCode::OK, "hello");
                Ok(Flow::Next)
            }),
        );
        let pipeline = RequestPipeline::new(Filters::default(), routes.build(), BodyConfig::default());
        build_router(
            AppState {
                pipeline: Arc::new(pipeline),
                notifier,
            },
            &HttpConfig::default(),
        )
    }

    #[tokio::test]
    async fn dispatches_to_pipeline_and_sets_request_id() {
        let response = router(None)
            .oneshot(Request::builder().uri("/hello").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn root_path_reaches_pipeline() {
        let response = router(None)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn completed_requests_are_reported() {
        let (notifier, mut rx) = IpcNotifier::channel(8, 4242);
        let app = router(Some(notifier));

        for uri in ["/hello", "/missing"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert!(response.status() == StatusCode::OK || response.status() == StatusCode::NOT_FOUND);
        }

        assert_eq!(rx.recv().await.unwrap().pid(), Some(4242));
        assert_eq!(rx.recv().await.unwrap().pid(), Some(4242));
    }

    #[tokio::test]
    async fn connection_limit_is_shared_across_routes() {
        let occupancy = Arc::new(Occupancy::default());
        let mut routes = RouteTable::builder();
        routes.route("/", occupancy.clone() as SharedHandler);
        let pipeline = RequestPipeline::new(Filters::default(), routes.build(), BodyConfig::default());
        let mut config = HttpConfig::default();
        config.server.max_connections = 1;
        let app = build_router(
            AppState {
                pipeline: Arc::new(pipeline),
                notifier: None,
            },
            &config,
        );

        // "/" and "/nested" hit different axum routes.
        let requests = ["/", "/nested", "/", "/nested"].map(|uri| {
            let app = app.clone();
            tokio::spawn(async move {
                app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                    .await
                    .unwrap()
                    .status()
            })
        });
        for request in requests {
            assert_eq!(request.await.unwrap(), StatusCode::OK);
        }
        assert_eq!(occupancy.peak.load(Ordering::SeqCst), 1);
    }
}
