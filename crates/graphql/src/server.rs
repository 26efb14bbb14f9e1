//! GraphQL HTTP server.
//!
//! Identity is resolved upstream by the API gateway and forwarded as
//! `x-user-*` headers. The server turns them into a [`RequestContext`]
//! and attaches it to each GraphQL request.

use std::future::Future;
use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
};
use tracing::{debug, info, warn};

use wallet_core::models::{Caller, Owner, RequestContext, Role, UserId};
use wallet_core::services::WalletService;

use crate::schema::build_schema;
use crate::types::WalletSchema;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_LAST_NAME_HEADER: &str = "x-user-last-name";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_playground: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            enable_playground: true,
        }
    }
}

#[derive(Clone)]
struct AppState {
    schema: WalletSchema,
    service: Arc<WalletService>,
}

/// Routes for the wallet API. The GraphiQL UI is only mounted when
/// `enable_playground` is set.
pub fn router(service: Arc<WalletService>, config: &ServerConfig) -> Router {
    let state = AppState {
        schema: build_schema(service.clone()),
        service,
    };

    let graphql = if config.enable_playground {
        get(graphql_playground).post(graphql_handler)
    } else {
        post(graphql_handler)
    };

    let mut app = Router::new()
        .route("/graphql", graphql)
        .route("/health", get(health_check));

    if config.enable_playground {
        app = app.route("/", get(graphql_playground));
    }
    app.with_state(state)
}

/// Start the GraphQL server and run until `shutdown_signal` resolves.
pub async fn serve_with_shutdown<F>(
    service: Arc<WalletService>,
    config: ServerConfig,
    shutdown_signal: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(service, &config);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("⚡ GraphQL server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    debug!("GraphQL server stopped");
    Ok(())
}

/// Build the caller identity from gateway headers.
///
/// A missing or blank user id, or a missing or unknown role, yields an
/// anonymous context. Display headers are optional.
pub fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    let Ok(id) = UserId::new(header(USER_ID_HEADER)) else {
        return RequestContext::anonymous();
    };
    let Ok(role) = header(USER_ROLE_HEADER).parse::<Role>() else {
        debug!(user = %id, "Request with missing or unknown role treated as anonymous");
        return RequestContext::anonymous();
    };

    let owner = Owner {
        id,
        name: header(USER_NAME_HEADER),
        last_name: header(USER_LAST_NAME_HEADER),
        email: header(USER_EMAIL_HEADER),
    };
    RequestContext::with_caller(Caller::new(owner, role))
}

/// GraphQL query handler.
async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let ctx = context_from_headers(&headers);
    state.schema.execute(req.into_inner().data(ctx)).await.into()
}

/// GraphQL Playground UI.
async fn graphql_playground() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

/// Health check endpoint. Reports 503 while the ledger store is unreachable.
async fn health_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.service.is_healthy().await {
        (StatusCode::OK, "OK")
    } else {
        warn!("⚠️  Health check failed, ledger store unreachable");
        (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, Method, Request};
    use tower::ServiceExt;
    use wallet_core::pin::PinConfig;
    use wallet_core::services::WalletConfig;
    use wallet_storage::MemoryLedgerStore;

    fn service(store: Arc<MemoryLedgerStore>) -> Arc<WalletService> {
        let config = WalletConfig {
            pin: PinConfig::low_cost(),
            ..WalletConfig::default()
        };
        Arc::new(WalletService::new(config, store).unwrap())
    }

    async fn status(app: Router, method: Method, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_health_reflects_store_availability() {
        let store = Arc::new(MemoryLedgerStore::new());
        let app = router(service(store.clone()), &ServerConfig::default());
        assert_eq!(status(app.clone(), Method::GET, "/health").await, StatusCode::OK);

        store.set_unavailable(true).await;
        assert_eq!(
            status(app, Method::GET, "/health").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_playground_routes_follow_config() {
        let store = Arc::new(MemoryLedgerStore::new());
        let enabled = router(service(store.clone()), &ServerConfig::default());
        assert_eq!(status(enabled.clone(), Method::GET, "/").await, StatusCode::OK);
        assert_eq!(status(enabled, Method::GET, "/graphql").await, StatusCode::OK);

        let config = ServerConfig {
            enable_playground: false,
            ..ServerConfig::default()
        };
        let disabled = router(service(store), &config);
        assert_eq!(status(disabled.clone(), Method::GET, "/").await, StatusCode::NOT_FOUND);
        assert_eq!(
            status(disabled, Method::GET, "/graphql").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_full_identity_headers() {
        let ctx = context_from_headers(&headers(&[
            (USER_ID_HEADER, "u-42"),
            (USER_ROLE_HEADER, "driver"),
            (USER_NAME_HEADER, "Ana"),
            (USER_LAST_NAME_HEADER, "Perez"),
            (USER_EMAIL_HEADER, "ana@example.com"),
        ]));
        let caller = ctx.caller().unwrap();
        assert_eq!(caller.id().as_str(), "u-42");
        assert_eq!(caller.role, Role::Driver);
        assert_eq!(caller.owner.email, "ana@example.com");
    }

    #[test]
    fn test_missing_user_id_is_anonymous() {
        let ctx = context_from_headers(&headers(&[(USER_ROLE_HEADER, "ADMIN")]));
        assert!(ctx.caller().is_err());
    }

    // Test critique: un rôle inconnu ne doit jamais donner d'identité
    #[test]
    fn test_unknown_role_is_anonymous() {
        let ctx = context_from_headers(&headers(&[
            (USER_ID_HEADER, "u-1"),
            (USER_ROLE_HEADER, "superuser"),
        ]));
        assert!(ctx.caller().is_err());

        let ctx = context_from_headers(&headers(&[(USER_ID_HEADER, "u-1")]));
        assert!(ctx.caller().is_err());
    }

    #[test]
    fn test_display_headers_are_optional() {
        let ctx = context_from_headers(&headers(&[
            (USER_ID_HEADER, "u-7"),
            (USER_ROLE_HEADER, "RIDER"),
        ]));
        let caller = ctx.caller().unwrap();
        assert_eq!(caller.role, Role::Rider);
        assert!(caller.owner.name.is_empty());
    }
}
