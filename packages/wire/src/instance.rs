//! Instance metadata documents.
//!
//! | Path | Type |
//! |------|------|
//! | `GET /api/v1/instance` | [`ApiV1Instance`] |
//! | `GET /.well-known/nodeinfo` | [`NodeInfoLinks`] |
//! | linked nodeinfo 2.x document | [`NodeInfo`] |
//!
//! Every field is optional: servers disagree about what they publish.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ApiV1Instance {
    /// Usually the bare domain, sometimes a full URL.
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub registrations: Option<bool>,
    #[serde(default)]
    pub stats: Option<InstanceStats>,
    #[serde(default)]
    pub contact_account: Option<ContactAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InstanceStats {
    #[serde(default)]
    pub user_count: Option<u64>,
    #[serde(default)]
    pub status_count: Option<u64>,
    #[serde(default)]
    pub domain_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ContactAccount {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub acct: Option<String>,
}

/// `/.well-known/nodeinfo`: links to schema-versioned documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeInfoLinks {
    #[serde(default)]
    pub links: Vec<NodeInfoLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeInfoLink {
    #[serde(default)]
    pub rel: String,
    #[serde(default)]
    pub href: String,
}

const NODEINFO_SCHEMAS: [&str; 2] = [
    "http://nodeinfo.diaspora.software/ns/schema/2.1",
    "http://nodeinfo.diaspora.software/ns/schema/2.0",
];

impl NodeInfoLinks {
    /// The href of a supported schema, newest first.
    pub fn document_href(&self) -> Option<&str> {
        NODEINFO_SCHEMAS.iter().find_map(|schema| {
            self.links
                .iter()
                .find(|l| l.rel == *schema && !l.href.is_empty())
                .map(|l| l.href.as_str())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub software: Option<NodeInfoSoftware>,
    #[serde(default)]
    pub open_registrations: Option<bool>,
    #[serde(default)]
    pub usage: Option<NodeInfoUsage>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NodeInfo {
    /// `metadata.nodeName`, which several servers use for the title.
    pub fn node_name(&self) -> Option<&str> {
        self.metadata.as_ref()?.get("nodeName")?.as_str()
    }

    pub fn node_description(&self) -> Option<&str> {
        self.metadata.as_ref()?.get("nodeDescription")?.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeInfoSoftware {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfoUsage {
    #[serde(default)]
    pub users: Option<NodeInfoUsers>,
    #[serde(default)]
    pub local_posts: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeInfoUsers {
    #[serde(default)]
    pub total: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_newest_schema() {
        let links: NodeInfoLinks = serde_json::from_value(json!({
            "links": [
                { "rel": "http://nodeinfo.diaspora.software/ns/schema/2.0", "href": "https://a.example/nodeinfo/2.0" },
                { "rel": "http://nodeinfo.diaspora.software/ns/schema/2.1", "href": "https://a.example/nodeinfo/2.1" }
            ]
        }))
        .unwrap();
        assert_eq!(links.document_href(), Some("https://a.example/nodeinfo/2.1"));
    }

    #[test]
    fn unknown_schema_yields_none() {
        let links: NodeInfoLinks = serde_json::from_value(json!({
            "links": [{ "rel": "http://example.com/other", "href": "https://a.example/x" }]
        }))
        .unwrap();
        assert_eq!(links.document_href(), None);
    }

    #[test]
    fn nodeinfo_document() {
        let ni: NodeInfo = serde_json::from_value(json!({
            "version": "2.0",
            "software": { "name": "mastodon", "version": "4.2.0" },
            "openRegistrations": true,
            "usage": { "users": { "total": 12 }, "localPosts": 345 },
            "metadata": { "nodeName": "A Example" }
        }))
        .unwrap();
        assert_eq!(ni.node_name(), Some("A Example"));
        assert_eq!(ni.open_registrations, Some(true));
        assert_eq!(ni.software.unwrap().name.as_deref(), Some("mastodon"));
        assert_eq!(ni.usage.unwrap().local_posts, Some(345));
    }

    #[test]
    fn api_v1_instance() {
        let inst: ApiV1Instance = serde_json::from_value(json!({
            "uri": "a.example",
            "title": "A",
            "version": "4.2.0",
            "registrations": false,
            "stats": { "user_count": 3, "status_count": 9 },
            "contact_account": { "username": "admin" }
        }))
        .unwrap();
        assert_eq!(inst.title.as_deref(), Some("A"));
        assert_eq!(inst.stats.unwrap().user_count, Some(3));
        assert_eq!(inst.contact_account.unwrap().username.as_deref(), Some("admin"));
    }
}
