//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo. Each request passes, outermost first,
//! through: real IP, request log, throttle, CORS, CSRF, credential
//! extraction, then either a gateway-local route or the reverse proxy.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::{HeaderValue, ORIGIN, SET_COOKIE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use platform_core::clients::UserClient;
use platform_core::db::DbPool;
use platform_core::{response, AuthInfo, EventBus};

use super::{cors, middleware};
use crate::auth::cookies::{self, get_cookie, CSRF_COOKIE};
use crate::auth::csrf::{self, CSRF_HEADER};
use crate::auth::{CredentialExtractor, Csrf};
use crate::config::Args;
use crate::error::{error_response, GatewayError};
use crate::routes::{self, Proxy, RouteMatch, RouteTable};
use crate::sessions::SessionStore;
use crate::sites::SiteRegistry;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub sessions: SessionStore,
    pub users: Arc<dyn UserClient>,
    pub bus: Arc<dyn EventBus>,
    pub sites: Arc<SiteRegistry>,
    pub csrf: Csrf,
    pub credentials: CredentialExtractor,
    pub routes: RouteTable,
    pub proxy: Proxy,
    throttle: Semaphore,
}

impl AppState {
    pub fn new(
        args: Args,
        pool: DbPool,
        http: reqwest::Client,
        users: Arc<dyn UserClient>,
        bus: Arc<dyn EventBus>,
        sites: Arc<SiteRegistry>,
    ) -> Result<Self, GatewayError> {
        let sessions = SessionStore::new(pool);
        let routes = RouteTable::new(&args.stripe_webhook_path)
            .map_err(|e| GatewayError::Config(format!("Invalid route pattern: {}", e)))?;

        Ok(Self {
            csrf: Csrf::new(&args.csrf_secret(), !args.dev_mode, &args.stripe_webhook_path),
            credentials: CredentialExtractor::new(sessions.clone(), users.clone()),
            proxy: Proxy::new(http, args.services.clone()),
            throttle: Semaphore::new(args.max_in_flight),
            sessions,
            users,
            bus,
            sites,
            routes,
            args,
        })
    }

    /// Cookies carry `Secure` everywhere except dev mode
    pub fn secure_cookies(&self) -> bool {
        !self.args.dev_mode
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Gateway listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - CSRF checks disabled, cookies not Secure");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, Infallible>(handle_request(state, addr, req).await) }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Handle one request through the full middleware chain
pub async fn handle_request<B>(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<B>,
) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let ip = middleware::real_ip(req.headers(), addr);
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = throttled(&state, req).await;

    info!(
        ip = %ip,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

async fn throttled<B>(state: &AppState, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let Ok(_permit) = state.throttle.try_acquire() else {
        warn!("In-flight request limit reached");
        return response::service_unavailable("Too many requests");
    };
    with_cors(state, req).await
}

async fn with_cors<B>(state: &AppState, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let allowed = match origin.as_deref() {
        Some(origin) => state.sites.allows(origin).await,
        None => false,
    };

    if req.method() == Method::OPTIONS {
        return cors::preflight(origin.as_deref().filter(|_| allowed));
    }

    let mut response = with_csrf(state, req).await;
    if let (Some(origin), true) = (origin.as_deref(), allowed) {
        cors::decorate(&mut response, origin);
    }
    response
}

async fn with_csrf<B>(state: &AppState, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let cookie_token = get_cookie(req.headers(), CSRF_COOKIE)
        .and_then(|value| state.csrf.verify_cookie(&value));

    let (token, new_cookie) = match cookie_token.clone() {
        Some(token) => (token, None),
        None => match state.csrf.issue() {
            Ok((token, value)) => (token, Some(value)),
            Err(e) => return error_response(e.into()),
        },
    };

    let mut response = if state.csrf.requires_check(req.method(), req.uri().path()) {
        let header = req.headers().get(CSRF_HEADER).and_then(|v| v.to_str().ok());
        let valid = match (cookie_token.as_deref(), header) {
            (Some(expected), Some(header)) => state.csrf.header_matches(expected, header),
            _ => false,
        };
        if valid {
            authenticated(state, req).await
        } else {
            warn!(path = %req.uri().path(), "CSRF check failed");
            response::forbidden("Invalid CSRF token")
        }
    } else {
        authenticated(state, req).await
    };

    match csrf::mask(&token).map(|masked| HeaderValue::from_str(&masked)) {
        Ok(Ok(value)) => {
            response.headers_mut().insert(CSRF_HEADER, value);
        }
        _ => warn!("Could not attach CSRF header"),
    }
    if let Some(value) = new_cookie {
        let cookie = cookies::csrf_cookie(&value, state.secure_cookies());
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

async fn authenticated<B>(state: &AppState, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let auth = state.credentials.extract(req.headers()).await;
    route(state, req, &auth).await
}

async fn route<B>(state: &AppState, req: Request<B>, auth: &AuthInfo) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => routes::health_check(state).await,

        (_, p) if p.starts_with("/auth/") => routes::handle_auth_request(state, req, auth).await,

        _ => match state.routes.resolve(&method, &path) {
            RouteMatch::Matched(route) if route.requires_auth && !auth.is_user() => {
                response::unauthorized()
            }
            RouteMatch::Matched(route) => state
                .proxy
                .forward(req, route.backend, auth)
                .await
                .unwrap_or_else(error_response),
            RouteMatch::MethodNotAllowed => response::method_not_allowed(),
            RouteMatch::NotFound => response::not_found("Not found"),
        },
    }
}
