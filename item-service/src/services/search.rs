//! Search façade
//!
//! Turns query parameters into a listing: abstract item types are expanded,
//! `owner` is resolved to the ids it stands for, named collections and the
//! external geo/full-text indexes each contribute an id list, and the
//! repository intersects them. Results are rendered as summaries or full
//! items, optionally with linked items embedded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use platform_core::clients::{GeoPoint, Info};
use platform_core::AuthInfo;

use super::owners::{allowed_owners, owner_filter};
use super::Context;
use crate::error::ItemError;
use crate::model::item_type::expand_all;
use crate::model::{
    Approval, Format, FullItem, ItemType, ItemView, LinkDepth, LinkedItems, ListedItem, Page, SummaryItem,
};
use crate::repo::listing::{self, ordered_intersection, ListParams, Pagination, Sort, DEFAULT_PER_PAGE};
use crate::repo::{collections, items, links};

/// Radius used when `geo` comes without `dist`
pub const DEFAULT_DIST_KM: f64 = 10.0;

/// Query string of `GET /items`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuery {
    pub item_type: Option<String>,
    pub approval: Option<String>,
    pub owner: Option<String>,
    pub tag: Option<String>,
    pub ids: Option<String>,
    pub q: Option<String>,
    pub geo: Option<String>,
    pub dist: Option<f64>,
    pub collections: Option<String>,
    pub format: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub sort_by: Option<String>,
    pub links: Option<String>,
}

/// One `links=<name>[:depth]` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub link_type: String,
    pub depth: LinkDepth,
}

impl LinkSpec {
    /// Parse a comma separated list of `name[:ids|summary|full]`
    pub fn parse_list(raw: &str) -> Result<Vec<LinkSpec>, ItemError> {
        split(raw)
            .into_iter()
            .map(|entry| {
                let (name, depth) = match entry.split_once(':') {
                    Some((name, depth)) => (name, depth.parse().map_err(ItemError::BadRequest)?),
                    None => (entry.as_str(), LinkDepth::Ids),
                };
                Ok(LinkSpec {
                    link_type: name.to_string(),
                    depth,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub item_types: Vec<ItemType>,
    pub approval: Vec<Approval>,
    pub owner: Option<String>,
    pub tag: Option<String>,
    pub ids: Option<Vec<String>>,
    pub q: Option<String>,
    pub geo: Option<(GeoPoint, f64)>,
    pub collections: Option<Vec<String>>,
    pub format: Format,
    pub pagination: Pagination,
    pub sort: Option<Sort>,
    pub links: Vec<LinkSpec>,
}

fn split(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_geo(raw: &str) -> Result<GeoPoint, ItemError> {
    let bad = || ItemError::BadRequest(format!("geo must be 'lat,lon', got '{}'", raw));
    let (lat, lon) = raw.split_once(',').ok_or_else(bad)?;
    let lat: f64 = lat.trim().parse().map_err(|_| bad())?;
    let lon: f64 = lon.trim().parse().map_err(|_| bad())?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(bad());
    }
    Ok(GeoPoint { lat, lon })
}

impl SearchQuery {
    pub fn parse(raw: RawQuery) -> Result<Self, ItemError> {
        let item_types = match raw.item_type.as_deref() {
            Some(types) => expand_all(&split(types)).map_err(ItemError::BadRequest)?,
            None => Vec::new(),
        };
        let approval = match raw.approval.as_deref() {
            Some(list) => split(list)
                .iter()
                .map(|a| a.parse::<Approval>().map_err(ItemError::BadRequest))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![Approval::Approved],
        };

        let geo = match raw.geo.as_deref() {
            Some(geo) => {
                let dist = raw.dist.unwrap_or(DEFAULT_DIST_KM);
                if dist <= 0.0 {
                    return Err(ItemError::BadRequest("dist must be positive".into()));
                }
                Some((parse_geo(geo)?, dist))
            }
            None if raw.dist.is_some() => {
                return Err(ItemError::BadRequest("dist requires geo".into()));
            }
            None => None,
        };

        Ok(Self {
            item_types,
            approval,
            owner: raw.owner.filter(|o| !o.is_empty()),
            tag: raw.tag.filter(|t| !t.is_empty()),
            ids: raw.ids.as_deref().map(split),
            q: raw.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
            geo,
            collections: raw.collections.as_deref().map(split),
            format: match raw.format.as_deref() {
                Some(format) => format.parse().map_err(ItemError::BadRequest)?,
                None => Format::Summary,
            },
            pagination: Pagination::new(raw.page.unwrap_or(1), raw.per_page.unwrap_or(DEFAULT_PER_PAGE)),
            sort: raw
                .sort_by
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(ItemError::BadRequest)?,
            links: match raw.links.as_deref() {
                Some(links) => LinkSpec::parse_list(links)?,
                None => Vec::new(),
            },
        })
    }

    /// Summary listing of one tag
    pub fn for_tag(tag: &str, pagination: Pagination) -> Self {
        Self {
            item_types: Vec::new(),
            approval: vec![Approval::Approved],
            owner: None,
            tag: Some(tag.to_string()),
            ids: None,
            q: None,
            geo: None,
            collections: None,
            format: Format::Summary,
            pagination,
            sort: None,
            links: Vec::new(),
        }
    }
}

pub struct SearchService {
    ctx: Arc<Context>,
}

impl SearchService {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn search(&self, auth: &AuthInfo, query: SearchQuery) -> Result<Page<ItemView>, ItemError> {
        let users = self.ctx.users.as_ref();

        let mut owners = match query.owner.as_deref() {
            Some(owner) => Some(owner_filter(users, owner).await?),
            None => None,
        };

        // Unapproved items only for what the caller may act for
        if query.approval.iter().any(|a| *a != Approval::Approved) && !auth.is_admin() {
            if !auth.is_user() {
                return Err(ItemError::ItemNotFound);
            }
            let own = allowed_owners(users, auth).await?;
            let own = own.ids().map(<[String]>::to_vec).unwrap_or_default();
            owners = Some(match owners {
                Some(requested) => requested.into_iter().filter(|id| own.contains(id)).collect(),
                None => own,
            });
        }
        if owners.as_ref().is_some_and(Vec::is_empty) {
            return Ok(empty_page(query.pagination));
        }

        let coll_ids = match query.collections.clone() {
            Some(names) => Some(self.ctx.db(move |conn| collections::member_ids(conn, &names)).await?),
            None => None,
        };
        let filter_ids = self.index_lookup(&query).await?;

        let params = ListParams {
            item_types: query.item_types.clone(),
            approval: query.approval.clone(),
            owners,
            tag: query.tag.clone(),
            ids: query.ids.clone(),
            sort: query.sort,
        };
        let pagination = query.pagination;
        let page = self
            .ctx
            .db(move |conn| {
                listing::list_items(conn, &params, filter_ids.as_deref(), coll_ids.as_deref(), pagination)
            })
            .await?;

        let items = self.render(auth, page.items, query.format, &query.links).await?;
        Ok(Page {
            items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    /// Ids from the external indexes, queried concurrently and intersected
    async fn index_lookup(&self, query: &SearchQuery) -> Result<Option<Vec<String>>, ItemError> {
        if query.q.is_none() && query.geo.is_none() {
            return Ok(None);
        }
        let index = self.ctx.search.as_ref();

        let text = async {
            match query.q.as_deref() {
                Some(q) => index.full_text(q).await.map(Some),
                None => Ok(None),
            }
        };
        let geo = async {
            match query.geo {
                Some((point, dist)) => index.geo(point, dist).await.map(Some),
                None => Ok(None),
            }
        };
        let (text, geo) = tokio::try_join!(text, geo)?;
        debug!(
            text_hits = text.as_ref().map(Vec::len),
            geo_hits = geo.as_ref().map(Vec::len),
            "Search index lookup"
        );

        let lists: Vec<&[String]> = [text.as_deref(), geo.as_deref()].into_iter().flatten().collect();
        Ok(Some(ordered_intersection(&lists)))
    }

    /// Render listed items in the requested format with links expanded
    pub async fn render(
        &self,
        auth: &AuthInfo,
        listed: Vec<ListedItem>,
        format: Format,
        specs: &[LinkSpec],
    ) -> Result<Vec<ItemView>, ItemError> {
        let types = self.check_links(&listed, specs).await?;

        let mut views: Vec<ItemView> = match format {
            Format::Summary => listed
                .iter()
                .map(|l| ItemView::Summary(SummaryItem::from(l)))
                .collect(),
            Format::Full => {
                let mut full: Vec<FullItem> = listed.into_iter().map(FullItem::from).collect();
                self.decorate(auth, &mut full).await?;
                full.into_iter().map(|f| ItemView::Full(Box::new(f))).collect()
            }
        };

        for (spec, link_type) in specs.iter().zip(types) {
            self.expand_links(auth, &mut views, spec, &link_type).await?;
        }
        Ok(views)
    }

    /// Every requested link type must exist and accept every item as origin
    async fn check_links(&self, listed: &[ListedItem], specs: &[LinkSpec]) -> Result<Vec<String>, ItemError> {
        let mut names = Vec::with_capacity(specs.len());
        for spec in specs {
            let name = spec.link_type.clone();
            let lt = self
                .ctx
                .db(move |conn| links::get_link_type(conn, &name))
                .await?
                .ok_or_else(|| ItemError::UnknownLinkType(spec.link_type.clone()))?;
            if let Some(bad) = listed.iter().find(|l| !lt.allows_origin(l.item.item_type)) {
                debug!(link_type = %lt.name, item_type = %bad.item.item_type, "Link type not allowed");
                return Err(ItemError::DisallowedLinkType(lt.name));
            }
            names.push(lt.name);
        }
        Ok(names)
    }

    /// Attach creator/owner info and the caller's upvotes
    async fn decorate(&self, auth: &AuthInfo, full: &mut [FullItem]) -> Result<(), ItemError> {
        if full.is_empty() {
            return Ok(());
        }

        let mut people: Vec<String> = Vec::new();
        for f in full.iter() {
            for id in [&f.item.creator, &f.item.owner] {
                if !id.is_empty() && !people.contains(id) {
                    people.push(id.clone());
                }
            }
        }
        let infos: HashMap<String, Info> = self
            .ctx
            .users
            .info(&people)
            .await?
            .into_iter()
            .map(|mut info| {
                self.ctx.avatars.fill(&mut info);
                (info.id.clone(), info)
            })
            .collect();

        let upvoted: Option<HashSet<String>> = if auth.is_user() {
            let ids: Vec<String> = full.iter().map(|f| f.item.id.clone()).collect();
            Some(self.ctx.social.user_upvotes(&auth.user_id, &ids).await?)
        } else {
            None
        };

        for f in full.iter_mut() {
            f.creator_info = infos.get(&f.item.creator).cloned();
            f.owner_info = infos.get(&f.item.owner).cloned();
            f.user_upvoted = upvoted.as_ref().map(|set| set.contains(&f.item.id));
        }
        Ok(())
    }

    /// Embed the approved targets of one link type into each view
    async fn expand_links(
        &self,
        auth: &AuthInfo,
        views: &mut [ItemView],
        spec: &LinkSpec,
        link_type: &str,
    ) -> Result<(), ItemError> {
        let origins: Vec<String> = views.iter().map(|v| v.id().to_string()).collect();
        let lt = link_type.to_string();
        let (by_origin, targets) = self
            .ctx
            .db(move |conn| {
                let by_origin = links::targets_by_origin(conn, &origins, &lt)?;
                let mut all: Vec<String> = by_origin.values().flatten().cloned().collect();
                all.sort();
                all.dedup();
                let targets = items::listed_by_ids(conn, &all)?;
                Ok((by_origin, targets))
            })
            .await?;

        let visible = |id: &String| {
            targets
                .get(id)
                .filter(|l| l.item.approval == Approval::Approved)
        };

        let mut full_targets: HashMap<String, FullItem> = HashMap::new();
        if spec.depth == LinkDepth::Full {
            let mut decorated: Vec<FullItem> = by_origin
                .values()
                .flatten()
                .filter_map(visible)
                .map(|l| FullItem::from(l.clone()))
                .collect();
            decorated.sort_by(|a, b| a.item.id.cmp(&b.item.id));
            decorated.dedup_by(|a, b| a.item.id == b.item.id);
            self.decorate(auth, &mut decorated).await?;
            full_targets = decorated.into_iter().map(|f| (f.item.id.clone(), f)).collect();
        }

        for view in views.iter_mut() {
            let ids = by_origin.get(view.id()).cloned().unwrap_or_default();
            let linked = match spec.depth {
                LinkDepth::Ids => LinkedItems::Ids(ids.iter().filter(|id| visible(id).is_some()).cloned().collect()),
                LinkDepth::Summary => {
                    LinkedItems::Summary(ids.iter().filter_map(visible).map(SummaryItem::from).collect())
                }
                LinkDepth::Full => {
                    LinkedItems::Full(ids.iter().filter_map(|id| full_targets.get(id).cloned()).collect())
                }
            };
            view.links_mut().insert(spec.link_type.clone(), linked);
        }
        Ok(())
    }
}

fn empty_page<T>(pagination: Pagination) -> Page<T> {
    Page {
        items: Vec::new(),
        total: 0,
        page: pagination.page,
        per_page: pagination.per_page,
    }
}
