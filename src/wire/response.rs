use serde::Deserialize;
use std::collections::HashMap;

/// Body of a segmentation hit response. Every field is optional; decode is
/// partial-failure tolerant at the entry level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HitResponse {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub stuff: Vec<StuffEntry>,
    #[serde(default)]
    pub dests: Vec<DestEntry>,
    #[serde(default)]
    pub dcs_region: Option<i64>,
    #[serde(default)]
    pub tid: Option<String>,
}

/// A cookie-name/cookie-value pair to fold into the visitor profile.
/// `ttl` and `dmn` arrive on the wire but profile folding ignores them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StuffEntry {
    #[serde(default)]
    pub cn: Option<String>,
    #[serde(default)]
    pub cv: Option<String>,
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub dmn: Option<String>,
}

/// A secondary destination URL to fire-and-forget.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestEntry {
    #[serde(default)]
    pub c: Option<String>,
}

impl HitResponse {
    /// Decodes a raw response body. `None` when the body is not a JSON
    /// object at all; individually broken entries are tolerated and skipped
    /// by the accessors below.
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.is_empty() {
            return None;
        }
        match serde_json::from_slice(body) {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::debug!("hit response failed to decode: {e}");
                None
            }
        }
    }

    /// The profile pairs carried by `stuff`. Entries missing either `cn` or
    /// `cv` are ignored individually.
    pub fn profile_pairs(&self) -> HashMap<String, String> {
        self.stuff
            .iter()
            .filter_map(|entry| match (&entry.cn, &entry.cv) {
                (Some(cn), Some(cv)) if !cn.is_empty() => Some((cn.clone(), cv.clone())),
                _ => None,
            })
            .collect()
    }

    /// Destination URLs to forward. Entries with an empty `c` are ignored.
    pub fn destinations(&self) -> Vec<String> {
        self.dests
            .iter()
            .filter_map(|entry| entry.c.as_ref())
            .filter(|c| !c.is_empty())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_response_decodes() {
        let body = br#"{
            "uuid": "12345",
            "stuff": [{"cn": "cn1", "cv": "cv1", "ttl": 30, "dmn": "x.com"}],
            "dests": [{"c": "https://x"}],
            "dcs_region": 9,
            "tid": "tid1"
        }"#;
        let response = HitResponse::parse(body).unwrap();

        assert_eq!(response.uuid.as_deref(), Some("12345"));
        assert_eq!(response.dcs_region, Some(9));
        assert_eq!(response.profile_pairs()["cn1"], "cv1");
        assert_eq!(response.destinations(), vec!["https://x".to_string()]);
    }

    #[test]
    fn stuff_entries_missing_cn_or_cv_are_skipped() {
        let body = br#"{"stuff": [
            {"cn": "cn1", "cv": "cv1"},
            {"cn": "only-name"},
            {"cv": "only-value"},
            {}
        ]}"#;
        let response = HitResponse::parse(body).unwrap();
        let pairs = response.profile_pairs();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs["cn1"], "cv1");
    }

    #[test]
    fn dests_with_empty_url_are_skipped() {
        let body = br#"{"dests": [{"c": ""}, {}, {"c": "https://x"}]}"#;
        let response = HitResponse::parse(body).unwrap();
        assert_eq!(response.destinations(), vec!["https://x".to_string()]);
    }

    #[test]
    fn empty_and_malformed_bodies_yield_none() {
        assert!(HitResponse::parse(b"").is_none());
        assert!(HitResponse::parse(b"not json").is_none());
    }
}
