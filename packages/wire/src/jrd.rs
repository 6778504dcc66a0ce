//! Webfinger JRD documents, `GET /.well-known/webfinger?resource=acct:user@host`.

use serde::{Deserialize, Serialize};

/// `rel` of the link pointing at the ActivityPub actor.
pub const REL_SELF: &str = "self";

/// A JSON Resource Descriptor (RFC 7033).
///
/// # Example
///
/// ```json
/// {
///   "subject": "acct:alice@social.example",
///   "links": [
///     { "rel": "self", "type": "application/activity+json",
///       "href": "https://social.example/users/alice" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Jrd {
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub links: Vec<JrdLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct JrdLink {
    #[serde(default)]
    pub rel: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl Jrd {
    /// Username and domain from an `acct:user@domain` subject.
    ///
    /// Returns `None` when the subject is not in that form.
    pub fn subject_parts(&self) -> Option<(&str, &str)> {
        let acct = self.subject.strip_prefix("acct:").unwrap_or(&self.subject);
        let acct = acct.strip_prefix('@').unwrap_or(acct);
        let (user, domain) = acct.rsplit_once('@')?;
        if user.is_empty() || domain.is_empty() || user.contains(['/', ':']) {
            return None;
        }
        Some((user, domain))
    }
}

/// Whether a media type names an ActivityPub document.
///
/// Accepts `application/activity+json`, and `application/ld+json` carrying
/// the ActivityStreams profile.
pub fn is_activitypub_content_type(content_type: &str) -> bool {
    let mut parts = content_type.split(';');
    let media = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    match media.as_str() {
        "application/activity+json" => true,
        "application/ld+json" => parts.any(|p| {
            let Some((k, v)) = p.split_once('=') else {
                return false;
            };
            k.trim().eq_ignore_ascii_case("profile")
                && v.trim().trim_matches('"').contains("https://www.w3.org/ns/activitystreams")
        }),
        _ => false,
    }
}
