//! Filtered, paginated item listings
//!
//! Up to three id lists can restrict a listing: ids from the search index,
//! ids from collections and ids given explicitly. Their ordered
//! intersection (ordered by the first list present) limits the SQL query.
//! Without an explicit sort the result keeps that order, which is how
//! relevance from the search index and manual collection order surface.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use diesel::prelude::*;
use diesel::sqlite::Sqlite;

use crate::db::models::ItemRow;
use crate::db::schema::{item_statistics, item_tags, items};
use crate::error::ItemError;
use crate::model::{Approval, Item, ItemType, ListedItem, Page};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Rank,
    Upvotes,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub dir: SortDir,
}

impl FromStr for Sort {
    type Err = String;

    /// `field[:asc|desc]`, descending by default
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, dir) = s.split_once(':').unwrap_or((s, "desc"));
        let field = match field {
            "rank" => SortField::Rank,
            "upvotes" => SortField::Upvotes,
            "created_at" => SortField::CreatedAt,
            other => return Err(format!("cannot sort by '{}'", other)),
        };
        let dir = match dir {
            "asc" => SortDir::Asc,
            "desc" => SortDir::Desc,
            other => return Err(format!("unknown sort direction '{}'", other)),
        };
        Ok(Sort { field, dir })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub item_types: Vec<ItemType>,
    pub approval: Vec<Approval>,
    /// `None` lists every owner
    pub owners: Option<Vec<String>>,
    pub tag: Option<String>,
    pub ids: Option<Vec<String>>,
    pub sort: Option<Sort>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based
    pub page: i64,
    pub per_page: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/// Ids present in every list, in the order of the first
pub fn ordered_intersection(lists: &[&[String]]) -> Vec<String> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    let others: Vec<HashSet<&str>> = rest
        .iter()
        .map(|list| list.iter().map(String::as_str).collect())
        .collect();

    let mut seen = HashSet::new();
    first
        .iter()
        .filter(|id| others.iter().all(|set| set.contains(id.as_str())))
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

type JoinedQuery<'a> =
    diesel::dsl::IntoBoxed<'a, diesel::dsl::InnerJoin<items::table, item_statistics::table>, Sqlite>;

fn filtered<'a>(params: &'a ListParams, combined: Option<&'a [String]>) -> JoinedQuery<'a> {
    let mut query = items::table.inner_join(item_statistics::table).into_boxed();

    if !params.item_types.is_empty() {
        let types: Vec<&'static str> = params.item_types.iter().map(ItemType::as_str).collect();
        query = query.filter(items::item_type.eq_any(types));
    }
    if !params.approval.is_empty() {
        let approval: Vec<&'static str> = params.approval.iter().map(Approval::as_str).collect();
        query = query.filter(items::approval.eq_any(approval));
    }
    if let Some(owners) = &params.owners {
        query = query.filter(items::owner.eq_any(owners));
    }
    if let Some(tag) = &params.tag {
        query = query.filter(
            items::id.eq_any(
                item_tags::table
                    .filter(item_tags::tag.eq(tag))
                    .select(item_tags::item_id),
            ),
        );
    }
    if let Some(ids) = combined {
        query = query.filter(items::id.eq_any(ids));
    }
    query
}

fn to_listed(rows: Vec<(ItemRow, f64, i64)>) -> Result<Vec<ListedItem>, ItemError> {
    rows.into_iter()
        .map(|(row, rank, upvotes)| {
            Ok(ListedItem {
                item: Item::from_row(row)?,
                rank,
                upvotes,
            })
        })
        .collect()
}

/// List items matching `params` and the id restrictions
pub fn list_items(
    conn: &mut SqliteConnection,
    params: &ListParams,
    filter_ids: Option<&[String]>,
    coll_ids: Option<&[String]>,
    pagination: Pagination,
) -> Result<Page<ListedItem>, ItemError> {
    let lists: Vec<&[String]> = [filter_ids, coll_ids, params.ids.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    let combined = if lists.is_empty() {
        None
    } else {
        Some(ordered_intersection(&lists))
    };

    let empty = |pagination: Pagination| Page {
        items: Vec::new(),
        total: 0,
        page: pagination.page,
        per_page: pagination.per_page,
    };
    if combined.as_ref().is_some_and(Vec::is_empty) {
        return Ok(empty(pagination));
    }

    let total: i64 = filtered(params, combined.as_deref()).count().get_result(conn)?;
    if total == 0 {
        return Ok(empty(pagination));
    }
    if pagination.offset() >= total {
        return Ok(Page {
            items: Vec::new(),
            total,
            page: pagination.page,
            per_page: pagination.per_page,
        });
    }

    let select = (ItemRow::as_select(), item_statistics::rank, item_statistics::upvotes);

    let items = match (params.sort, &combined) {
        (None, Some(order)) => {
            let rows: Vec<(ItemRow, f64, i64)> = filtered(params, Some(order.as_slice()))
                .select(select)
                .load(conn)?;
            let position: HashMap<&str, usize> =
                order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
            let mut listed = to_listed(rows)?;
            listed.sort_by_key(|l| position.get(l.item.id.as_str()).copied().unwrap_or(usize::MAX));
            listed
                .into_iter()
                .skip(pagination.offset() as usize)
                .take(pagination.per_page as usize)
                .collect()
        }
        (sort, _) => {
            let sort = sort.unwrap_or(Sort {
                field: SortField::CreatedAt,
                dir: SortDir::Desc,
            });
            let query = filtered(params, combined.as_deref());
            let query = match (sort.field, sort.dir) {
                (SortField::Rank, SortDir::Asc) => query.order((item_statistics::rank.asc(), items::id.asc())),
                (SortField::Rank, SortDir::Desc) => query.order((item_statistics::rank.desc(), items::id.asc())),
                (SortField::Upvotes, SortDir::Asc) => {
                    query.order((item_statistics::upvotes.asc(), items::id.asc()))
                }
                (SortField::Upvotes, SortDir::Desc) => {
                    query.order((item_statistics::upvotes.desc(), items::id.asc()))
                }
                (SortField::CreatedAt, SortDir::Asc) => query.order((items::created_at.asc(), items::id.asc())),
                (SortField::CreatedAt, SortDir::Desc) => {
                    query.order((items::created_at.desc(), items::id.asc()))
                }
            };
            let rows = query
                .select(select)
                .limit(pagination.per_page)
                .offset(pagination.offset())
                .load(conn)?;
            to_listed(rows)?
        }
    };

    Ok(Page {
        items,
        total,
        page: pagination.page,
        per_page: pagination.per_page,
    })
}
