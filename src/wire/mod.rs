mod response;

pub use response::{DestEntry, HitResponse, StuffEntry};

use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

const HIT_PATH: &str = "event";
const OPT_OUT_PATH: &str = "demoptout.jpg";

const CUSTOMER_DATA_PREFIX: &str = "c_";
const PARAM_VISITOR_ID: &str = "d_mid";
const PARAM_BLOB: &str = "d_blob";
const PARAM_LOCATION_HINT: &str = "dcs_region";
const PARAM_SYNCED_ID: &str = "d_cid_ic";
const PARAM_ORG_ID: &str = "d_orgid";
const PARAM_USER_ID: &str = "d_uuid";
const PARAM_PLATFORM: &str = "d_ptfm=ios";
const PARAM_DESTINATIONS: &str = "d_dst=1";
const PARAM_RESPONSE_FORMAT: &str = "d_rtbd=json";

/// Pre-encoded sub-delimiter separating the pieces of a `d_cid_ic`
/// composite. Appended verbatim; it must not be re-encoded.
const SYNCED_ID_DELIMITER: &str = "%01";

/// Numeric auth-state code used when a synced identifier carries none.
const AUTH_STATE_UNKNOWN: u32 = 0;

/// Reserved set for customer-data parameters. `=` and the prefix separator
/// `_` stay unencoded so the key/value structure survives double-encoding
/// by the receiving service's trait parser.
const CUSTOMER_DATA_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'=')
    .remove(b'_')
    .remove(b'-')
    .remove(b'.')
    .remove(b'~');

/// Reserved set for non-customer parameter values: only the characters that
/// would break the query structure itself. Opaque server tokens keep `@`
/// (org ids) and `%` (pre-encoded blobs) untouched.
const QUERY_VALUE_SET: &AsciiSet = &CONTROLS.add(b' ').add(b'&').add(b'#');

// ── Related-system identity ───────────────────────────────────────

/// An external identifier synced by the related identity system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncedId {
    pub id_type: String,
    pub id: String,
    pub auth_state: Option<u32>,
}

/// Snapshot of the related identity system's state, consulted when a hit
/// URL is built. All fields optional; empty values are simply omitted from
/// the URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub visitor_id: String,
    pub blob: String,
    pub location_hint: String,
    pub synced_ids: Vec<SyncedId>,
}

// ── Hit URL builder ────────────────────────────────────────────────

/// Builds the fully resolved hit URL. Pure and deterministic: the same
/// inputs always produce a byte-identical URL.
///
/// Returns `None` only when `server` is empty — every other missing input
/// is omitted from the URL rather than failing the build.
pub fn build_hit_url(
    server: &str,
    org_id: &str,
    user_id: &str,
    traits: &BTreeMap<String, String>,
    identity: &IdentitySnapshot,
) -> Option<Url> {
    if server.is_empty() {
        return None;
    }

    let mut query = String::new();

    for (key, value) in traits {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        let piece = format!("{CUSTOMER_DATA_PREFIX}{key}={value}");
        push_param(&mut query, &utf8_percent_encode(&piece, CUSTOMER_DATA_SET).to_string());
    }

    push_if_non_empty(&mut query, PARAM_VISITOR_ID, &identity.visitor_id);
    push_if_non_empty(&mut query, PARAM_BLOB, &identity.blob);
    push_if_non_empty(&mut query, PARAM_LOCATION_HINT, &identity.location_hint);

    for synced in &identity.synced_ids {
        if synced.id_type.is_empty() {
            continue;
        }
        push_param(&mut query, &synced_id_param(synced));
    }

    push_if_non_empty(&mut query, PARAM_ORG_ID, org_id);
    push_if_non_empty(&mut query, PARAM_USER_ID, user_id);

    push_param(&mut query, PARAM_PLATFORM);
    push_param(&mut query, PARAM_DESTINATIONS);
    push_param(&mut query, PARAM_RESPONSE_FORMAT);

    parse_logged(&format!("https://{server}/{HIT_PATH}?{query}"))
}

/// Builds the advisory opt-out URL: `None` when either the server or the
/// user id is missing, since the ping is meaningless without both.
pub fn build_opt_out_url(server: &str, user_id: &str) -> Option<Url> {
    if server.is_empty() || user_id.is_empty() {
        return None;
    }
    let user_id = utf8_percent_encode(user_id, QUERY_VALUE_SET);
    parse_logged(&format!(
        "https://{server}/{OPT_OUT_PATH}?{PARAM_USER_ID}={user_id}"
    ))
}

fn synced_id_param(synced: &SyncedId) -> String {
    let auth = synced.auth_state.unwrap_or(AUTH_STATE_UNKNOWN);
    let mut composite = format!("{PARAM_SYNCED_ID}={}", synced.id_type);
    if !synced.id.is_empty() {
        composite.push_str(SYNCED_ID_DELIMITER);
        composite.push_str(&synced.id);
    }
    composite.push_str(SYNCED_ID_DELIMITER);
    composite.push_str(&auth.to_string());
    composite
}

fn push_param(query: &mut String, piece: &str) {
    if !query.is_empty() {
        query.push('&');
    }
    query.push_str(piece);
}

fn push_if_non_empty(query: &mut String, key: &str, value: &str) {
    if !value.is_empty() {
        let value = utf8_percent_encode(value, QUERY_VALUE_SET);
        push_param(query, &format!("{key}={value}"));
    }
}

fn parse_logged(raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::debug!("hit url failed to parse, dropping: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traits(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn empty_server_fails_the_build() {
        assert!(
            build_hit_url("", "org", "uuid", &BTreeMap::new(), &IdentitySnapshot::default())
                .is_none()
        );
    }

    #[test]
    fn minimal_hit_carries_fixed_suffix() {
        let url = build_hit_url(
            "testServer.com",
            "testOrg@AdobeOrg",
            "",
            &traits(&[("trait", "b")]),
            &IdentitySnapshot::default(),
        )
        .unwrap();

        let raw = url.as_str();
        assert!(raw.starts_with("https://testserver.com/event?"));
        assert!(raw.contains("c_trait=b"));
        assert!(raw.contains("d_orgid=testOrg@AdobeOrg"));
        assert!(raw.contains("d_ptfm=ios"));
        assert!(raw.contains("d_dst=1"));
        assert!(raw.contains("d_rtbd=json"));
        assert!(!raw.contains("d_mid"));
    }

    #[test]
    fn build_is_deterministic() {
        let t = traits(&[("b", "2"), ("a", "1")]);
        let identity = IdentitySnapshot {
            visitor_id: "mid1".into(),
            blob: "blob1".into(),
            location_hint: "9".into(),
            synced_ids: vec![],
        };
        let first = build_hit_url("s.com", "org", "u1", &t, &identity).unwrap();
        let second = build_hit_url("s.com", "org", "u1", &t, &identity).unwrap();
        assert_eq!(first.as_str(), second.as_str());

        // BTreeMap iteration fixes trait order.
        assert!(first.as_str().contains("c_a=1&c_b=2"));
    }

    #[test]
    fn identity_fields_emit_in_fixed_order() {
        let identity = IdentitySnapshot {
            visitor_id: "mid1".into(),
            blob: "blob1".into(),
            location_hint: "9".into(),
            synced_ids: vec![],
        };
        let url = build_hit_url("s.com", "", "", &BTreeMap::new(), &identity).unwrap();
        assert!(url.as_str().contains("d_mid=mid1&d_blob=blob1&dcs_region=9"));
    }

    #[test]
    fn synced_id_builds_composite() {
        let identity = IdentitySnapshot {
            synced_ids: vec![SyncedId {
                id_type: "email".into(),
                id: "user-1".into(),
                auth_state: Some(1),
            }],
            ..IdentitySnapshot::default()
        };
        let url = build_hit_url("s.com", "", "", &BTreeMap::new(), &identity).unwrap();
        assert!(url.as_str().contains("d_cid_ic=email%01user-1%011"));
    }

    #[test]
    fn synced_id_without_value_keeps_delimiter_and_auth_state() {
        let identity = IdentitySnapshot {
            synced_ids: vec![SyncedId {
                id_type: "email".into(),
                id: String::new(),
                auth_state: None,
            }],
            ..IdentitySnapshot::default()
        };
        let url = build_hit_url("s.com", "", "", &BTreeMap::new(), &identity).unwrap();
        assert!(url.as_str().contains("d_cid_ic=email%010"));
    }

    #[test]
    fn synced_id_without_type_is_skipped() {
        let identity = IdentitySnapshot {
            synced_ids: vec![SyncedId::default()],
            ..IdentitySnapshot::default()
        };
        let url = build_hit_url("s.com", "", "", &BTreeMap::new(), &identity).unwrap();
        assert!(!url.as_str().contains("d_cid_ic"));
    }

    #[test]
    fn customer_data_reencodes_reserved_characters() {
        let url = build_hit_url(
            "s.com",
            "",
            "",
            &traits(&[("key with space", "a&b")]),
            &IdentitySnapshot::default(),
        )
        .unwrap();

        // `=` and `_` survive; space and `&` do not.
        assert!(url.as_str().contains("c_key%20with%20space=a%26b"));
    }

    #[test]
    fn empty_trait_values_are_omitted() {
        let url = build_hit_url(
            "s.com",
            "",
            "",
            &traits(&[("a", ""), ("b", "2")]),
            &IdentitySnapshot::default(),
        )
        .unwrap();
        assert!(!url.as_str().contains("c_a"));
        assert!(url.as_str().contains("c_b=2"));
    }

    #[test]
    fn structural_characters_in_identity_values_do_not_split_the_query() {
        let identity = IdentitySnapshot {
            blob: "b&lob#1".into(),
            ..IdentitySnapshot::default()
        };
        let url = build_hit_url("s.com", "org&2", "", &BTreeMap::new(), &identity).unwrap();

        assert!(url.as_str().contains("d_blob=b%26lob%231"));
        assert!(url.as_str().contains("d_orgid=org%262"));
        assert!(url.fragment().is_none());
        // `@` and pre-encoded `%xx` sequences pass through untouched.
        let url = build_hit_url(
            "s.com",
            "testOrg@AdobeOrg",
            "",
            &BTreeMap::new(),
            &IdentitySnapshot {
                blob: "a%2Fb".into(),
                ..IdentitySnapshot::default()
            },
        )
        .unwrap();
        assert!(url.as_str().contains("d_orgid=testOrg@AdobeOrg"));
        assert!(url.as_str().contains("d_blob=a%2Fb"));
    }

    #[test]
    fn opt_out_url_requires_server_and_user_id() {
        assert!(build_opt_out_url("", "u1").is_none());
        assert!(build_opt_out_url("s.com", "").is_none());

        let url = build_opt_out_url("s.com", "u1").unwrap();
        assert_eq!(url.as_str(), "https://s.com/demoptout.jpg?d_uuid=u1");
    }
}
