//! HTTP server for the item service
//!
//! hyper http1 with TokioIo, one task per connection. The gateway has
//! already authenticated the caller; the outcome arrives as `X-Auth-*`
//! headers and is read back with [`AuthInfo::from_headers`].

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use platform_core::{response, AuthInfo};

use crate::config::Args;
use crate::error::{error_response, ItemError};
use crate::model::{Approval, Format};
use crate::repo::claims::ClaimStatus;
use crate::repo::collections::Position;
use crate::repo::listing::{Pagination, DEFAULT_PER_PAGE};
use crate::services::search::{LinkSpec, RawQuery, SearchQuery};
use crate::services::Services;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

type HttpResponse = Response<Full<Bytes>>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub services: Services,
}

impl AppState {
    pub fn new(args: Args, services: Services) -> Self {
        Self { args, services }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), ItemError> {
    let listener = TcpListener::bind(state.args.listen)
        .await
        .map_err(|e| ItemError::Core(platform_core::CoreError::Io(e.to_string())))?;
    info!("Item service listening on {}", state.args.listen);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, Infallible>(handle_request(&state, req).await) }
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

/// Route one request and log its outcome
pub async fn handle_request<B>(state: &AppState, req: Request<B>) -> HttpResponse
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match route(state, req).await {
        Ok(response) => response,
        Err(e) => error_response(e),
    };

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

async fn route<B>(state: &AppState, req: Request<B>) -> Result<HttpResponse, ItemError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let auth = AuthInfo::from_headers(req.headers());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let svc = &state.services;

    match (&method, segments.as_slice()) {
        (&Method::GET, ["health"]) => Ok(health(svc).await),

        // Items
        (&Method::GET, ["items"]) => {
            let query = SearchQuery::parse(parse_query::<RawQuery>(&query)?)?;
            Ok(response::ok(&svc.search.search(&auth, query).await?))
        }
        (&Method::POST, ["items"]) => {
            let owner = parse_query::<OwnerQuery>(&query)?.owner;
            let body = read_json(req).await?;
            Ok(response::ok(&svc.items.create(&auth, body, owner).await?))
        }
        (&Method::GET, ["items", "info"]) => {
            let ids = parse_query::<IdsQuery>(&query)?.ids;
            let ids: Vec<String> = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            Ok(response::ok(&svc.items.info(ids).await?))
        }
        (&Method::GET, ["item", id]) => {
            let view = parse_query::<ViewQuery>(&query)?;
            let format = match view.format.as_deref() {
                Some(format) => format.parse().map_err(ItemError::BadRequest)?,
                None => Format::Full,
            };
            let links = match view.links.as_deref() {
                Some(links) => LinkSpec::parse_list(links)?,
                None => Vec::new(),
            };
            let listed = svc.items.get(&auth, id).await?;
            let mut views = svc.search.render(&auth, vec![listed], format, &links).await?;
            match views.pop() {
                Some(view) => Ok(response::ok(&view)),
                None => Err(ItemError::ItemNotFound),
            }
        }
        (&Method::PATCH, ["item", id]) => {
            let patch = read_json(req).await?;
            Ok(response::ok(&svc.items.update(&auth, id, patch).await?))
        }
        (&Method::DELETE, ["item", id]) => {
            let pictures = svc.items.delete(&auth, id).await?;
            Ok(response::ok(&DeletedItem { pictures }))
        }
        (&Method::POST, ["item", id, "approval"]) => {
            let body: ApprovalBody = read_json(req).await?;
            Ok(response::ok(&svc.items.set_approval(&auth, id, body.approval).await?))
        }
        (&Method::POST, ["item", id, "availability"]) => {
            let body: AvailabilityBody = read_json(req).await?;
            let item = svc
                .items
                .set_availability(&auth, id, body.available_quantity)
                .await?;
            Ok(response::ok(&item))
        }
        (&Method::POST, ["item", id, "claim-ownership"]) => {
            let owner = parse_query::<OwnerQuery>(&query)?.owner;
            Ok(response::ok(&svc.claims.claim(&auth, id, owner).await?))
        }

        // Links
        (&Method::POST, ["item", id, "links"]) => {
            let body: LinkBody = read_json(req).await?;
            let link = svc
                .links
                .create(&auth, id, &body.link_type, &body.target)
                .await?;
            Ok(response::ok(&link))
        }
        (&Method::GET, ["item", id, "links"]) => {
            let link_type = parse_query::<LinkTypeQuery>(&query)?.link_type;
            Ok(response::ok(&svc.links.list(&auth, id, link_type).await?))
        }
        (&Method::DELETE, ["item-link", id]) => {
            svc.links.delete(&auth, id).await?;
            Ok(response::no_content())
        }

        // Collections
        (&Method::GET, ["item-collections"]) => Ok(response::ok(&svc.collections.list().await?)),
        (&Method::POST, ["item-collections"]) => {
            let body: CollectionBody = read_json(req).await?;
            let coll = svc.collections.create(&auth, &body.name, body.owner).await?;
            Ok(response::ok(&coll))
        }
        (&Method::GET, ["item-collection", name]) => Ok(response::ok(&svc.collections.view(name).await?)),
        (&Method::DELETE, ["item-collection", name]) => {
            svc.collections.delete(&auth, name).await?;
            Ok(response::no_content())
        }
        (&Method::PUT, ["item-collection", name, "item", item_id]) => {
            let position = read_optional_json::<PositionBody, _>(req).await?.into_position()?;
            let idx = svc.collections.add_item(&auth, name, item_id, position).await?;
            Ok(response::ok(&PlacedItem { idx }))
        }
        (&Method::DELETE, ["item-collection", name, "item", item_id]) => {
            svc.collections.remove_item(&auth, name, item_id).await?;
            Ok(response::no_content())
        }

        // Ownership claims
        (&Method::GET, ["ownership-claims"]) => Ok(response::ok(&svc.claims.list(&auth).await?)),
        (&Method::DELETE, ["ownership-claim", id]) => {
            svc.claims.delete(&auth, id).await?;
            Ok(response::no_content())
        }
        (&Method::POST, ["ownership-claim", id, "status"]) => {
            let body: ClaimStatusBody = read_json(req).await?;
            Ok(response::ok(&svc.claims.set_status(&auth, id, body.status).await?))
        }

        // Tags
        (&Method::GET, ["tag", tag]) => {
            let page = parse_query::<PageQuery>(&query)?;
            let pagination = Pagination::new(page.page.unwrap_or(1), page.per_page.unwrap_or(DEFAULT_PER_PAGE));
            let tag = decode_segment(tag)?;
            Ok(response::ok(&svc.search.search(&auth, SearchQuery::for_tag(&tag, pagination)).await?))
        }

        (_, ["health"])
        | (_, ["items"])
        | (_, ["items", "info"])
        | (_, ["item", ..])
        | (_, ["item-link", _])
        | (_, ["item-collections"])
        | (_, ["item-collection", ..])
        | (_, ["ownership-claims"])
        | (_, ["ownership-claim", ..])
        | (_, ["tag", _]) => Ok(response::method_not_allowed()),

        _ => {
            warn!(method = %method, path = %path, "No route");
            Ok(response::not_found("Not found"))
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    version: &'static str,
}

async fn health(services: &Services) -> HttpResponse {
    let database = match services.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!(error = %e, "Health check database ping failed");
            "unavailable"
        }
    };
    let (status, code) = match database {
        "ok" => ("ok", StatusCode::OK),
        _ => ("degraded", StatusCode::SERVICE_UNAVAILABLE),
    };
    response::json_response(
        code,
        &HealthResponse {
            status,
            database,
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

fn parse_query<T: DeserializeOwned>(query: &str) -> Result<T, ItemError> {
    serde_urlencoded::from_str(query).map_err(|e| ItemError::BadRequest(format!("Invalid query: {}", e)))
}

fn decode_segment(segment: &str) -> Result<String, ItemError> {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .map_err(|e| ItemError::BadRequest(format!("Invalid path segment: {}", e)))
}

async fn read_json<T, B>(req: Request<B>) -> Result<T, ItemError>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Ok(response::read_json(req.into_body(), MAX_BODY_BYTES).await?)
}

/// Like [`read_json`], but an empty body yields the default
async fn read_optional_json<T, B>(req: Request<B>) -> Result<T, ItemError>
where
    T: DeserializeOwned + Default,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = response::read_body(req.into_body(), MAX_BODY_BYTES).await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

#[derive(Deserialize)]
struct OwnerQuery {
    owner: Option<String>,
}

#[derive(Deserialize)]
struct IdsQuery {
    #[serde(default)]
    ids: String,
}

#[derive(Deserialize)]
struct ViewQuery {
    format: Option<String>,
    links: Option<String>,
}

#[derive(Deserialize)]
struct LinkTypeQuery {
    link_type: Option<String>,
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<i64>,
    per_page: Option<i64>,
}

#[derive(Deserialize)]
struct ApprovalBody {
    approval: Approval,
}

#[derive(Deserialize)]
struct AvailabilityBody {
    available_quantity: i64,
}

#[derive(Deserialize)]
struct LinkBody {
    link_type: String,
    target: String,
}

#[derive(Deserialize)]
struct CollectionBody {
    name: String,
    owner: Option<String>,
}

#[derive(Deserialize, Default)]
struct PositionBody {
    before: Option<String>,
    after: Option<String>,
}

impl PositionBody {
    fn into_position(self) -> Result<Position, ItemError> {
        match (self.before, self.after) {
            (Some(_), Some(_)) => Err(ItemError::BadRequest(
                "Give at most one of 'before' and 'after'".into(),
            )),
            (Some(before), None) => Ok(Position::Before(before)),
            (None, Some(after)) => Ok(Position::After(after)),
            (None, None) => Ok(Position::End),
        }
    }
}

#[derive(Deserialize)]
struct ClaimStatusBody {
    status: ClaimStatus,
}

#[derive(Serialize)]
struct DeletedItem {
    pictures: Vec<String>,
}

#[derive(Serialize)]
struct PlacedItem {
    idx: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_body() {
        let both = PositionBody {
            before: Some("a".into()),
            after: Some("b".into()),
        };
        assert!(matches!(both.into_position(), Err(ItemError::BadRequest(_))));
        assert_eq!(PositionBody::default().into_position().unwrap(), Position::End);
        let before = PositionBody {
            before: Some("rst_x".into()),
            after: None,
        };
        assert_eq!(before.into_position().unwrap(), Position::Before("rst_x".into()));
    }

    #[test]
    fn test_decode_segment() {
        assert_eq!(decode_segment("gluten%20free").unwrap(), "gluten free");
        assert_eq!(decode_segment("vegan").unwrap(), "vegan");
    }
}
