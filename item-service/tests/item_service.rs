//! End-to-end tests of the item service request chain
//!
//! Requests go straight into `handle_request` with gateway-style `X-Auth-*`
//! headers. The item database is a temporary SQLite file, the collaborator
//! services are in-memory fakes and the event bus is in-process.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;

use item_service::http::{handle_request, AppState};
use item_service::schema::{CategoryTable, SchemaEngine};
use item_service::services::{Avatars, Context, Services};
use item_service::Args;
use platform_core::clients::{
    ApiKeyUser, GeoPoint, Info, OrgMembership, SearchIndexClient, SearchInfo, SocialClient, User, UserClient,
};
use platform_core::db::DbPool;
use platform_core::events::topics::{self, ItemChange, ItemChangeType};
use platform_core::events::MemoryBus;
use platform_core::{AuthInfo, CoreError};

const ADMIN: &str = "usr_admin0000000000000000";
const ALICE: &str = "usr_alice0000000000000000";
const BOB: &str = "usr_bob000000000000000000";

#[derive(Default)]
struct FakeUsers {
    orgs: HashMap<String, Vec<OrgMembership>>,
}

#[async_trait]
impl UserClient for FakeUsers {
    async fn login(&self, _email: &str, _site: &str, _language: &str) -> Result<User, CoreError> {
        Err(CoreError::NotFound("login".into()))
    }

    async fn api_key_user(&self, _api_key: &str) -> Result<Option<ApiKeyUser>, CoreError> {
        Ok(None)
    }

    async fn info(&self, ids: &[String]) -> Result<Vec<Info>, CoreError> {
        Ok(ids
            .iter()
            .map(|id| Info {
                id: id.clone(),
                name: format!("name of {}", id),
                email: None,
                avatar: None,
            })
            .collect())
    }

    async fn orgs(&self, user_id: &str) -> Result<Vec<OrgMembership>, CoreError> {
        Ok(self.orgs.get(user_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeSocial {
    counts: Mutex<HashMap<String, i64>>,
}

#[async_trait]
impl SocialClient for FakeSocial {
    async fn item_rank(&self, _item_id: &str) -> Result<f64, CoreError> {
        Ok(1.5)
    }

    async fn upvote_counts(&self) -> Result<HashMap<String, i64>, CoreError> {
        Ok(self.counts.lock().unwrap().clone())
    }

    async fn user_upvotes(&self, _user_id: &str, _item_ids: &[String]) -> Result<HashSet<String>, CoreError> {
        Ok(HashSet::new())
    }
}

#[derive(Default)]
struct FakeIndex {
    geo_hits: Mutex<Vec<String>>,
    upserted: Mutex<Vec<SearchInfo>>,
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl SearchIndexClient for FakeIndex {
    async fn geo(&self, _point: GeoPoint, _dist_km: f64) -> Result<Vec<String>, CoreError> {
        Ok(self.geo_hits.lock().unwrap().clone())
    }

    async fn full_text(&self, _query: &str) -> Result<Vec<String>, CoreError> {
        Ok(Vec::new())
    }

    async fn upsert(&self, info: &SearchInfo) -> Result<(), CoreError> {
        self.upserted.lock().unwrap().push(info.clone());
        Ok(())
    }

    async fn delete(&self, item_id: &str) -> Result<(), CoreError> {
        self.deleted.lock().unwrap().push(item_id.to_string());
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    state: AppState,
    pool: DbPool,
    bus: Arc<MemoryBus>,
    index: Arc<FakeIndex>,
    social: Arc<FakeSocial>,
}

async fn harness() -> Harness {
    harness_with(FakeUsers::default()).await
}

async fn harness_with(users: FakeUsers) -> Harness {
    let dir = TempDir::new().unwrap();
    let db_url = dir.path().join("items.db").to_string_lossy().to_string();
    let args = Args::parse_from(["item-service", "--database-url", &db_url]);

    let pool = item_service::db::open(&args.database_url).await.unwrap();
    let bus = Arc::new(MemoryBus::new());
    let index = Arc::new(FakeIndex::default());
    let social = Arc::new(FakeSocial::default());
    let schemas = SchemaEngine::new(Arc::new(CategoryTable::new())).unwrap();

    let ctx = Context {
        pool: pool.clone(),
        schemas: Arc::new(schemas),
        bus: bus.clone(),
        users: Arc::new(users),
        social: social.clone(),
        search: index.clone(),
        avatars: Avatars::new("https://cdn.test/avatar-{n}.png", 4),
    };

    Harness {
        _dir: dir,
        state: AppState::new(args, Services::new(ctx)),
        pool,
        bus,
        index,
        social,
    }
}

fn auth_headers(auth: &AuthInfo) -> HeaderMap {
    let mut headers = HeaderMap::new();
    auth.apply_to(&mut headers);
    headers
}

async fn send(h: &Harness, method: Method, uri: &str, auth: &AuthInfo, body: Option<Value>) -> Response<Full<Bytes>> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in auth_headers(auth).iter() {
        builder = builder.header(name, value);
    }
    let body = match body {
        Some(body) => Full::new(Bytes::from(body.to_string())),
        None => Full::new(Bytes::new()),
    };
    handle_request(&h.state, builder.body(body).unwrap()).await
}

async fn body_json(response: Response<Full<Bytes>>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn admin() -> AuthInfo {
    AuthInfo::session(ADMIN, true)
}

fn alice() -> AuthInfo {
    AuthInfo::session(ALICE, false)
}

fn bob() -> AuthInfo {
    AuthInfo::session(BOB, false)
}

fn hotel(name: &str) -> Value {
    json!({
        "item_type": "hotel",
        "name": name,
        "pictures": ["u1"],
        "featured_picture": "u1",
        "address": {"street": "1 Green Lane", "city": "Berlin", "country": "DE"},
        "location": {"lat": 51.2, "lon": 10.3}
    })
}

/// Create an item and return its id
async fn create(h: &Harness, auth: &AuthInfo, body: Value) -> String {
    let response = send(h, Method::POST, "/items", auth, Some(body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["id"].as_str().unwrap().to_string()
}

fn ids(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let h = harness().await;
    let response = send(&h, Method::GET, "/health", &AuthInfo::none(), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["database"], "ok");
}

#[tokio::test]
async fn test_creation_and_approval_gating() {
    let h = harness().await;

    let response = send(&h, Method::POST, "/items", &admin(), Some(hotel("The Vegan Lodge"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["approval"], "approved");
    assert_eq!(created["slug"], "the-vegan-lodge");
    assert_eq!(created["owner"], ADMIN);
    assert_eq!(created["address"]["city"], "Berlin");

    let response = send(&h, Method::POST, "/items", &alice(), Some(hotel("Leafy Rooms"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let pending = body_json(response).await;
    assert_eq!(pending["approval"], "pending");
    let pending_id = pending["id"].as_str().unwrap().to_string();

    // An unrelated user never sees it
    let response = send(&h, Method::GET, "/items?approval=pending", &bob(), None).await;
    if response.status() == StatusCode::OK {
        assert!(!ids(&body_json(response).await).contains(&pending_id));
    } else {
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    let response = send(&h, Method::GET, &format!("/item/{}", pending_id), &bob(), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The creator does
    let response = send(&h, Method::GET, "/items?approval=pending", &alice(), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(ids(&body_json(response).await), vec![pending_id.clone()]);

    // Anonymous callers cannot ask for unapproved items
    let response = send(&h, Method::GET, "/items?approval=pending", &AuthInfo::none(), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Default listing shows approved items only
    let response = send(&h, Method::GET, "/items", &AuthInfo::none(), None).await;
    let page = body_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["name"], "The Vegan Lodge");

    let changes = h.bus.published(topics::ITEM_CHANGE);
    assert_eq!(changes.len(), 2);
    let first: ItemChange = changes[0].json().unwrap();
    assert_eq!(first.change, ItemChangeType::Create);
}

#[tokio::test]
async fn test_links_of_hidden_items_are_not_found() {
    let h = harness().await;
    let pending = create(&h, &alice(), hotel("Quiet Rooms")).await;
    let uri = format!("/item/{}/links", pending);

    for caller in [AuthInfo::none(), bob()] {
        let response = send(&h, Method::GET, &uri, &caller, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    for caller in [alice(), admin()] {
        let response = send(&h, Method::GET, &uri, &caller, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }
}

#[tokio::test]
async fn test_anonymous_create_is_unauthorized() {
    let h = harness().await;
    let response = send(&h, Method::POST, "/items", &AuthInfo::none(), Some(hotel("Nope"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_item_rejected() {
    let h = harness().await;
    let mut body = hotel("No Address");
    body.as_object_mut().unwrap().remove("address");
    let response = send(&h, Method::POST, "/items", &admin(), Some(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut body = hotel("Bad Field");
    body["approval"] = json!("approved");
    let response = send(&h, Method::POST, "/items", &alice(), Some(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_names_get_distinct_slugs() {
    let h = harness().await;
    let a = create(&h, &admin(), hotel("Twin Peaks")).await;
    let b = create(&h, &admin(), hotel("Twin Peaks")).await;

    let response = send(&h, Method::GET, &format!("/items/info?ids={},{}", a, b), &AuthInfo::none(), None).await;
    let infos = body_json(response).await;
    let slugs: HashSet<&str> = infos
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs.len(), 2);
    assert!(slugs.contains("twin-peaks"));
}

#[tokio::test]
async fn test_patch_and_ownership() {
    let h = harness().await;
    let id = create(&h, &alice(), hotel("Patchable")).await;

    let response = send(
        &h,
        Method::PATCH,
        &format!("/item/{}", id),
        &bob(),
        Some(json!({"description": "hijacked"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &h,
        Method::PATCH,
        &format!("/item/{}", id),
        &alice(),
        Some(json!({"description": "Quiet rooms", "stars": 4})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let patched = body_json(response).await;
    assert_eq!(patched["description"], "Quiet rooms");
    assert_eq!(patched["stars"], 4);
    assert_eq!(patched["address"]["street"], "1 Green Lane");

    let response = send(
        &h,
        Method::PATCH,
        &format!("/item/{}", id),
        &alice(),
        Some(json!({"slug": "new-slug"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_races_approval_changes() {
    let h = harness().await;
    let id = create(&h, &alice(), hotel("Busy Lodge")).await;
    let item_uri = format!("/item/{}", id);
    let approval_uri = format!("/item/{}/approval", id);

    for round in 0..10 {
        let approval = if round % 2 == 0 { "approved" } else { "pending" };
        let alice_user = alice();
        let admin_user = admin();
        let (patched, approved) = tokio::join!(
            send(&h, Method::PATCH, &item_uri, &alice_user, Some(json!({"stars": round % 5 + 1}))),
            send(&h, Method::POST, &approval_uri, &admin_user, Some(json!({"approval": approval}))),
        );
        assert_eq!(patched.status(), StatusCode::OK, "round {}", round);
        assert_eq!(approved.status(), StatusCode::OK, "round {}", round);
    }
}

#[tokio::test]
async fn test_full_view_carries_owner_info() {
    let h = harness().await;
    let id = create(&h, &admin(), hotel("Decorated")).await;

    let response = send(&h, Method::GET, &format!("/item/{}", id), &AuthInfo::none(), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let full = body_json(response).await;
    assert_eq!(full["owner_info"]["name"], format!("name of {}", ADMIN));
    assert!(full["owner_info"]["avatar"]
        .as_str()
        .unwrap()
        .starts_with("https://cdn.test/avatar-"));
    assert_eq!(full["upvotes"], 0);
    assert!(full.get("user_upvoted").is_none());
}

#[tokio::test]
async fn test_approval_requires_admin() {
    let h = harness().await;
    let id = create(&h, &alice(), hotel("Awaiting")).await;

    let uri = format!("/item/{}/approval", id);
    let response = send(&h, Method::POST, &uri, &alice(), Some(json!({"approval": "approved"}))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&h, Method::POST, &uri, &admin(), Some(json!({"approval": "approved"}))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&h, Method::GET, &format!("/item/{}", id), &bob(), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_delete_returns_pictures_and_leaves_collections() {
    let h = harness().await;
    let id = create(&h, &admin(), hotel("Short Lived")).await;
    let response = send(&h, Method::POST, "/item-collections", &admin(), Some(json!({"name": "picks"}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let coll_id = body_json(response).await["id"].as_i64().unwrap();
    let response = send(&h, Method::PUT, &format!("/item-collection/picks/item/{}", id), &admin(), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&h, Method::DELETE, &format!("/item/{}", id), &admin(), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["pictures"], json!(["u1"]));

    let response = send(&h, Method::GET, "/item-collection/picks", &AuthInfo::none(), None).await;
    assert_eq!(body_json(response).await["items"], json!([]));

    let changes: Vec<ItemChange> = h
        .bus
        .published(topics::ITEM_CHANGE)
        .iter()
        .map(|m| m.json().unwrap())
        .collect();
    let tail = &changes[changes.len() - 2..];
    assert_eq!(tail[0], ItemChange::in_collection(ItemChangeType::CollRem, &id, coll_id));
    assert_eq!(tail[1], ItemChange::new(ItemChangeType::Delete, &id));

    let response = send(&h, Method::GET, &format!("/item/{}", id), &admin(), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_collection_ordering() {
    let h = harness().await;
    let mut item = HashMap::new();
    for name in ["A", "B", "C", "D", "E"] {
        item.insert(name, create(&h, &admin(), hotel(&format!("Hotel {}", name))).await);
    }

    let response = send(&h, Method::POST, "/item-collections", &admin(), Some(json!({"name": "C"}))).await;
    assert_eq!(response.status(), StatusCode::OK);

    for (n, name) in ["A", "B", "C", "D"].iter().enumerate() {
        let response = send(&h, Method::PUT, &format!("/item-collection/C/item/{}", item[name]), &admin(), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["idx"], n as i64 + 1);
    }

    let members = |view: Value| -> Vec<(i64, String)> {
        view["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| (m["idx"].as_i64().unwrap(), m["item_id"].as_str().unwrap().to_string()))
            .collect()
    };
    let expect = |names: &[&str]| -> Vec<(i64, String)> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (i as i64 + 1, item[n].clone()))
            .collect()
    };

    let response = send(&h, Method::GET, "/item-collection/C", &AuthInfo::none(), None).await;
    assert_eq!(members(body_json(response).await), expect(&["A", "B", "C", "D"]));

    let response = send(
        &h,
        Method::PUT,
        &format!("/item-collection/C/item/{}", item["E"]),
        &admin(),
        Some(json!({"before": item["B"]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["idx"], 2);
    let response = send(&h, Method::GET, "/item-collection/C", &AuthInfo::none(), None).await;
    assert_eq!(members(body_json(response).await), expect(&["A", "E", "B", "C", "D"]));

    let response = send(&h, Method::DELETE, &format!("/item-collection/C/item/{}", item["C"]), &admin(), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(&h, Method::GET, "/item-collection/C", &AuthInfo::none(), None).await;
    assert_eq!(members(body_json(response).await), expect(&["A", "E", "B", "D"]));

    // Listing by collection keeps the manual order
    let response = send(&h, Method::GET, "/items?collections=C", &AuthInfo::none(), None).await;
    let listed = ids(&body_json(response).await);
    assert_eq!(listed, vec![item["A"].clone(), item["E"].clone(), item["B"].clone(), item["D"].clone()]);

    let response = send(
        &h,
        Method::PUT,
        &format!("/item-collection/C/item/{}", item["A"]),
        &admin(),
        Some(json!({"before": item["B"], "after": item["D"]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_collection_names_and_owners() {
    let h = harness().await;
    let response = send(&h, Method::POST, "/item-collections", &admin(), Some(json!({"name": "no spaces"}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&h, Method::POST, "/item-collections", &alice(), Some(json!({"name": "alices"}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(&h, Method::POST, "/item-collections", &bob(), Some(json!({"name": "alices"}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let id = create(&h, &admin(), hotel("Listed")).await;
    let response = send(&h, Method::PUT, &format!("/item-collection/alices/item/{}", id), &bob(), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&h, Method::DELETE, "/item-collection/alices", &alice(), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(&h, Method::GET, "/item-collection/alices", &alice(), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

fn product(name: &str) -> Value {
    json!({
        "item_type": "packaged-food",
        "name": name,
        "pictures": ["p1"]
    })
}

fn offering(name: &str) -> Value {
    json!({
        "item_type": "offering",
        "name": name,
        "pictures": ["o1"],
        "sku": "SKU-1",
        "price": 450,
        "currency": "EUR",
        "available_quantity": 3
    })
}

#[tokio::test]
async fn test_forward_and_inverse_links() {
    let h = harness().await;
    let p = create(&h, &admin(), product("Tofu")).await;
    let o = create(&h, &admin(), offering("Tofu 400g")).await;

    let response = send(
        &h,
        Method::POST,
        &format!("/item/{}/links", p),
        &admin(),
        Some(json!({"link_type": "product-has-offerings", "target": o})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let forward = body_json(response).await;
    let x = forward["id"].as_str().unwrap().to_string();
    let y = forward["inverse_id"].as_str().unwrap().to_string();
    assert!(x.starts_with("lnk_"));

    let response = send(&h, Method::GET, &format!("/item/{}/links", o), &AuthInfo::none(), None).await;
    let inverse = body_json(response).await;
    assert_eq!(inverse.as_array().unwrap().len(), 1);
    assert_eq!(inverse[0]["id"], y.as_str());
    assert_eq!(inverse[0]["inverse_id"], x.as_str());
    assert_eq!(inverse[0]["link_type"], "offering-of-product");
    assert_eq!(inverse[0]["target"], p.as_str());

    // Linked ids embedded in the product view
    let response = send(
        &h,
        Method::GET,
        &format!("/item/{}?links=product-has-offerings", p),
        &AuthInfo::none(),
        None,
    )
    .await;
    assert_eq!(body_json(response).await["links"]["product-has-offerings"], json!([o]));

    let response = send(&h, Method::DELETE, &format!("/item-link/{}", x), &admin(), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    for id in [&p, &o] {
        let response = send(&h, Method::GET, &format!("/item/{}/links", id), &AuthInfo::none(), None).await;
        assert_eq!(body_json(response).await, json!([]));
    }
}

#[tokio::test]
async fn test_link_rules() {
    let h = harness().await;
    let p = create(&h, &admin(), product("Seitan")).await;
    let o = create(&h, &admin(), offering("Seitan 200g")).await;
    let hotel_id = create(&h, &admin(), hotel("Linkless")).await;

    let link = |origin: &str, link_type: &str, target: &str| {
        (
            format!("/item/{}/links", origin),
            json!({"link_type": link_type, "target": target}),
        )
    };

    // Inverse types are created only through their forward type
    let (uri, body) = link(&o, "offering-of-product", &p);
    let response = send(&h, Method::POST, &uri, &admin(), Some(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Wrong origin type
    let (uri, body) = link(&hotel_id, "product-has-offerings", &o);
    let response = send(&h, Method::POST, &uri, &admin(), Some(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (uri, body) = link(&p, "no-such-link", &o);
    let response = send(&h, Method::POST, &uri, &admin(), Some(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Owner-to-owner needs both ends
    let (uri, body) = link(&p, "product-has-offerings", &o);
    let response = send(&h, Method::POST, &uri, &alice(), Some(body)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Expanding a link type the item type cannot originate
    let response = send(
        &h,
        Method::GET,
        &format!("/item/{}?links=product-has-offerings", hotel_id),
        &AuthInfo::none(),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unique_origin_link() {
    let h = harness().await;
    let job = create(
        &h,
        &admin(),
        json!({
            "item_type": "job-ad",
            "name": "Chef wanted",
            "pictures": ["j1"],
            "body": "Cook things",
            "employment_type": "full-time"
        }),
    )
    .await;
    let first = create(&h, &admin(), hotel("First")).await;
    let second = create(&h, &admin(), hotel("Second")).await;

    let uri = format!("/item/{}/links", job);
    let response = send(
        &h,
        Method::POST,
        &uri,
        &admin(),
        Some(json!({"link_type": "job-ad-for-venue", "target": first})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(
        &h,
        Method::POST,
        &uri,
        &admin(),
        Some(json!({"link_type": "job-ad-for-venue", "target": second})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_geo_order_preserved() {
    let h = harness().await;
    let mut created = Vec::new();
    for name in ["One", "Two", "Three"] {
        created.push(create(&h, &admin(), hotel(name)).await);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let (i1, i2, i3) = (created[0].clone(), created[1].clone(), created[2].clone());
    *h.index.geo_hits.lock().unwrap() = vec![i3.clone(), i1.clone(), i2.clone()];

    let response = send(
        &h,
        Method::GET,
        "/items?geo=51.2,10.3&dist=100&format=summary",
        &AuthInfo::none(),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(ids(&page), vec![i3.clone(), i1.clone(), i2.clone()]);
    assert!(page["items"][0].get("address").is_none());

    let response = send(
        &h,
        Method::GET,
        "/items?geo=51.2,10.3&dist=100&format=summary&sort_by=created_at:desc",
        &AuthInfo::none(),
        None,
    )
    .await;
    assert_eq!(ids(&body_json(response).await), vec![i3, i2, i1]);

    let response = send(&h, Method::GET, "/items?dist=5", &AuthInfo::none(), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tag_listing() {
    let h = harness().await;
    let mut body = hotel("Tagged");
    body["tags"] = json!(["gluten-free"]);
    let tagged = create(&h, &admin(), body).await;
    create(&h, &admin(), hotel("Untagged")).await;

    let response = send(&h, Method::GET, "/tag/gluten-free", &AuthInfo::none(), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(ids(&body_json(response).await), vec![tagged]);
}

#[tokio::test]
async fn test_page_past_the_end_is_empty() {
    let h = harness().await;
    create(&h, &admin(), hotel("Only One")).await;

    for page in ["2", "9223372036854775807"] {
        let uri = format!("/items?format=summary&page={}", page);
        let response = send(&h, Method::GET, &uri, &AuthInfo::none(), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(ids(&body).is_empty());
        assert_eq!(body["total"], 1);
    }
}

#[tokio::test]
async fn test_owner_filter_includes_orgs() {
    let mut users = FakeUsers::default();
    users.orgs.insert(
        ALICE.to_string(),
        vec![OrgMembership {
            org_id: "org_green".into(),
            is_org_admin: true,
        }],
    );
    let h = harness_with(users).await;

    let own = create(&h, &admin(), hotel("Admin Own")).await;
    let response = send(&h, Method::POST, "/items?owner=org_green", &alice(), Some(hotel("Org Hotel"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let org_item = body_json(response).await;
    assert_eq!(org_item["owner"], "org_green");
    let org_id = org_item["id"].as_str().unwrap().to_string();

    let response = send(&h, Method::POST, "/items?owner=org_other", &alice(), Some(hotel("Elsewhere"))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let uri = format!("/item/{}/approval", org_id);
    send(&h, Method::POST, &uri, &admin(), Some(json!({"approval": "approved"}))).await;

    let response = send(&h, Method::GET, &format!("/items?owner={}", ALICE), &AuthInfo::none(), None).await;
    let listed = ids(&body_json(response).await);
    assert_eq!(listed, vec![org_id]);
    assert!(!listed.contains(&own));
}

#[tokio::test]
async fn test_availability() {
    let h = harness().await;
    let o = create(&h, &admin(), offering("Oat milk")).await;
    let hotel_id = create(&h, &admin(), hotel("No stock")).await;

    let response = send(
        &h,
        Method::POST,
        &format!("/item/{}/availability", o),
        &admin(),
        Some(json!({"available_quantity": 0})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["available_quantity"], 0);

    let response = send(
        &h,
        Method::POST,
        &format!("/item/{}/availability", o),
        &admin(),
        Some(json!({"available_quantity": -1})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &h,
        Method::POST,
        &format!("/item/{}/availability", hotel_id),
        &admin(),
        Some(json!({"available_quantity": 5})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ownership_claim_flow() {
    let h = harness().await;
    let id = create(&h, &admin(), hotel("Claimable")).await;

    let uri = format!("/item/{}/claim-ownership", id);
    let response = send(&h, Method::POST, &uri, &alice(), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let claim = body_json(response).await;
    assert_eq!(claim["status"], "pending");
    assert_eq!(claim["owner_id"], ALICE);
    let claim_id = claim["id"].as_str().unwrap().to_string();

    let response = send(&h, Method::POST, &uri, &alice(), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Claims are visible to their owner and admins only
    let response = send(&h, Method::GET, "/ownership-claims", &bob(), None).await;
    assert_eq!(body_json(response).await, json!([]));
    let response = send(&h, Method::GET, "/ownership-claims", &admin(), None).await;
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let status_uri = format!("/ownership-claim/{}/status", claim_id);
    let response = send(&h, Method::POST, &status_uri, &alice(), Some(json!({"status": "approved"}))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = send(&h, Method::POST, &status_uri, &admin(), Some(json!({"status": "approved"}))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&h, Method::GET, &format!("/item/{}", id), &alice(), None).await;
    let item = body_json(response).await;
    assert_eq!(item["owner"], ALICE);
    assert_eq!(item["ownership"], "claimed");
    assert_eq!(item["creator"], ADMIN);

    // Decided claims cannot be withdrawn
    let response = send(&h, Method::DELETE, &format!("/ownership-claim/{}", claim_id), &alice(), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_routes() {
    let h = harness().await;
    let response = send(&h, Method::GET, "/nothing/here", &AuthInfo::none(), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = send(&h, Method::PUT, "/items", &admin(), None).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

mod reconcilers {
    use super::*;
    use item_service::reconcile::catalogue::{CatalogueSync, SyncAction};
    use item_service::reconcile::{search_index, upvotes};
    use platform_core::clients::HttpCatalogueClient;
    use platform_core::events::publish_json;
    use platform_core::EventBus;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_index_follows_changes() {
        let h = harness().await;
        let id = create(&h, &admin(), hotel("Indexed")).await;

        tokio_test::assert_ok!(
            search_index::apply(&h.pool, h.index.as_ref(), &ItemChange::new(ItemChangeType::Create, &id)).await
        );
        let upserted = h.index.upserted.lock().unwrap().clone();
        assert_eq!(upserted.len(), 1);
        assert_eq!(upserted[0].id, id);
        assert_eq!(upserted[0].location, Some(GeoPoint { lat: 51.2, lon: 10.3 }));

        search_index::apply(&h.pool, h.index.as_ref(), &ItemChange::new(ItemChangeType::Delete, &id))
            .await
            .unwrap();
        // Gone from the store by the time an update arrives
        search_index::apply(&h.pool, h.index.as_ref(), &ItemChange::new(ItemChangeType::Update, "htl_missing"))
            .await
            .unwrap();
        assert_eq!(*h.index.deleted.lock().unwrap(), vec![id, "htl_missing".to_string()]);
    }

    #[tokio::test]
    async fn test_search_index_consumer_over_bus() {
        let h = harness().await;
        let bus: Arc<dyn EventBus> = h.bus.clone();
        let _task = tokio_test::assert_ok!(search_index::start(bus.clone(), h.pool.clone(), h.index.clone()).await);

        let id = create(&h, &admin(), hotel("Via bus")).await;
        for _ in 0..100 {
            if !h.index.upserted.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.index.upserted.lock().unwrap()[0].id, id);
    }

    #[tokio::test]
    async fn test_upvote_sweep_and_events() {
        let h = harness().await;
        let a = create(&h, &admin(), hotel("Loved")).await;
        let b = create(&h, &admin(), hotel("Ignored")).await;
        h.social.counts.lock().unwrap().insert(a.clone(), 7);

        let written = upvotes::sweep(&h.pool, h.social.as_ref()).await.unwrap();
        assert_eq!(written, 1);
        let response = send(&h, Method::GET, "/items?sort_by=upvotes", &AuthInfo::none(), None).await;
        let page = body_json(response).await;
        assert_eq!(ids(&page), vec![a.clone(), b.clone()]);
        assert_eq!(page["items"][0]["upvotes"], 7);

        // Nothing changed, nothing written
        assert_eq!(upvotes::sweep(&h.pool, h.social.as_ref()).await.unwrap(), 0);

        let bus: Arc<dyn EventBus> = h.bus.clone();
        let _task = upvotes::start_consumer(bus.clone(), h.pool.clone()).await.unwrap();
        publish_json(
            bus.as_ref(),
            topics::ITEM_UPVOTES,
            &topics::ItemUpvotes {
                item_id: b.clone(),
                upvotes: 9,
            },
        )
        .await
        .unwrap();

        let mut order = Vec::new();
        for _ in 0..100 {
            let response = send(&h, Method::GET, "/items?sort_by=upvotes", &AuthInfo::none(), None).await;
            order = ids(&body_json(response).await);
            if order[0] == b {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(order, vec![b, a]);
    }

    #[tokio::test]
    async fn test_catalogue_follows_shopping_collection() {
        let h = harness().await;
        let server = MockServer::start().await;
        let o = create(&h, &admin(), offering("Oat milk")).await;

        Mock::given(method("PUT"))
            .and(path(format!("/products/{}", o)))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("/products/{}", o)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = Arc::new(HttpCatalogueClient::new(
            reqwest::Client::new(),
            &server.uri(),
            Some("s3cret".into()),
        ));
        let sync = CatalogueSync::new(h.pool.clone(), client, "shopping");

        // No shopping collection yet
        let change = ItemChange::new(ItemChangeType::Update, &o);
        assert_eq!(sync.apply(&change).await.unwrap(), SyncAction::Skipped);

        let response = send(&h, Method::POST, "/item-collections", &admin(), Some(json!({"name": "shopping"}))).await;
        let coll_id = body_json(response).await["id"].as_i64().unwrap();
        // Not a member yet
        assert_eq!(sync.apply(&change).await.unwrap(), SyncAction::Skipped);

        send(&h, Method::PUT, &format!("/item-collection/shopping/item/{}", o), &admin(), None).await;
        let added = ItemChange::in_collection(ItemChangeType::CollAdd, &o, coll_id);
        assert_eq!(sync.apply(&added).await.unwrap(), SyncAction::Upserted);

        send(&h, Method::DELETE, &format!("/item-collection/shopping/item/{}", o), &admin(), None).await;
        let removed = ItemChange::in_collection(ItemChangeType::CollRem, &o, coll_id);
        assert_eq!(sync.apply(&removed).await.unwrap(), SyncAction::Deleted);

        let deleted = ItemChange::new(ItemChangeType::Delete, &o);
        assert_eq!(sync.apply(&deleted).await.unwrap(), SyncAction::Skipped);
    }
}
