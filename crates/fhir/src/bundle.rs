//! Searchset Bundle envelope for list responses.
//!
//! An empty page produces a Bundle with no `entry` key at all, and a Bundle without
//! paging links has no `link` key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Bundle {
    pub resource_type: String,

    #[serde(rename = "type")]
    pub type_: String,

    pub total: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<BundleLink>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    pub resource: Value,
}

/// Wraps translated documents into a `searchset` Bundle.
///
/// `total` is the size of the whole result set, not of this page.
pub fn wrap(documents: Vec<Value>, total: u64, links: Vec<BundleLink>) -> Bundle {
    Bundle {
        resource_type: "Bundle".to_owned(),
        type_: "searchset".to_owned(),
        total,
        link: links,
        entry: documents
            .into_iter()
            .map(|resource| BundleEntry {
                full_url: None,
                resource,
            })
            .collect(),
    }
}

impl Bundle {
    /// Sets `fullUrl` on every entry whose resource carries a `resourceType` and an `id`.
    pub fn with_full_urls(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        for entry in &mut self.entry {
            let kind = entry.resource.get("resourceType").and_then(Value::as_str);
            let id = entry.resource.get("id").and_then(Value::as_str);
            if let (Some(kind), Some(id)) = (kind, id) {
                entry.full_url = Some(format!("{base}/{kind}/{id}"));
            }
        }
        self
    }
}

/// One page of a list request. Pages are numbered from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub count: u32,
}

impl Pagination {
    /// Index of the first record on this page.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.count as usize)
    }

    /// Number of the last page; an empty result set still has one (empty) page.
    pub fn last_page(&self, total: u64) -> u32 {
        if self.count == 0 {
            return 1;
        }
        let pages = total.div_ceil(u64::from(self.count)).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Builds `self`, `first`, `previous`, `next` and `last` links against `url`.
    ///
    /// `previous` and `next` are only present when such a page exists.
    pub fn links(&self, url: &str, total: u64) -> Vec<BundleLink> {
        let last = self.last_page(total);
        let link = |relation: &str, page: u32| BundleLink {
            relation: relation.to_owned(),
            url: format!("{url}?_page={page}&_count={}", self.count),
        };

        let mut links = vec![link("self", self.page), link("first", 1)];
        if self.page > 1 {
            links.push(link("previous", (self.page - 1).min(last)));
        }
        if self.page < last {
            links.push(link("next", self.page + 1));
        }
        links.push(link("last", last));
        links
    }
}
