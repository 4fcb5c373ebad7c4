//! Facility entry token
//!
//! The string decoded from a gate QR code. Two encodings are accepted:
//!
//! - JSON: `{"lotId": "3", "name": "Airport Lot", "nonce": "…"}` (`lotId`
//!   may also be a number)
//! - query string: `https://host/scan?lotId=3&nonce=…` or bare `lotId=3`

use serde::Serialize;
use serde_json::Value;

use crate::domain::facility::Facility;
use crate::domain::{DomainError, DomainResult};

pub const MAX_TOKEN_LEN: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacilityToken {
    #[serde(rename = "lotId")]
    pub facility_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Short-lived value making a scan idempotent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl FacilityToken {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DomainError::InvalidToken("empty token".into()));
        }
        if raw.len() > MAX_TOKEN_LEN {
            return Err(DomainError::InvalidToken("token too long".into()));
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_json(&value),
            Err(_) => Self::from_query(raw),
        }
    }

    /// Fresh token for a facility's gate code.
    pub fn issue(facility: &Facility) -> Self {
        Self {
            facility_id: facility.id.clone(),
            name: Some(facility.name.clone()),
            nonce: Some(uuid::Uuid::new_v4().simple().to_string()),
        }
    }

    pub fn encode(&self) -> String {
        // A struct of strings always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    fn from_json(value: &Value) -> DomainResult<Self> {
        let Value::Object(map) = value else {
            return Err(DomainError::InvalidToken("expected a JSON object".into()));
        };

        let facility_id = match map.get("lotId") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) if n.is_u64() || n.is_i64() => n.to_string(),
            _ => return Err(DomainError::InvalidToken("missing lotId".into())),
        };

        Ok(Self {
            facility_id,
            name: map.get("name").and_then(Value::as_str).map(str::to_string),
            nonce: map
                .get("nonce")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        })
    }

    fn from_query(raw: &str) -> DomainResult<Self> {
        let query = raw.split_once('?').map_or(raw, |(_, q)| q);
        let query = query.split('#').next().unwrap_or_default();

        let mut facility_id = None;
        let mut nonce = None;
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = percent_decode(value);
            match key {
                "lotId" if !value.trim().is_empty() => facility_id = Some(value.trim().to_string()),
                "nonce" if !value.trim().is_empty() => nonce = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let facility_id =
            facility_id.ok_or_else(|| DomainError::InvalidToken("missing lotId".into()))?;
        Ok(Self {
            facility_id,
            name: None,
            nonce,
        })
    }
}

/// `application/x-www-form-urlencoded` value decoding. Invalid escapes are
/// kept literally.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => match (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_with_numeric_lot_id() {
        let t = FacilityToken::parse(r#"{"lotId": 1, "name": "City Center Lot"}"#).unwrap();
        assert_eq!(t.facility_id, "1");
        assert_eq!(t.name.as_deref(), Some("City Center Lot"));
        assert!(t.nonce.is_none());
    }

    #[test]
    fn parses_json_with_nonce() {
        let t = FacilityToken::parse(r#"{"lotId":"lot-a","nonce":"abc123"}"#).unwrap();
        assert_eq!(t.facility_id, "lot-a");
        assert_eq!(t.nonce.as_deref(), Some("abc123"));
    }

    #[test]
    fn parses_url_query() {
        let t = FacilityToken::parse("https://smartparking.app/scan?lotId=3&nonce=n%201").unwrap();
        assert_eq!(t.facility_id, "3");
        assert_eq!(t.nonce.as_deref(), Some("n 1"));
    }

    #[test]
    fn parses_bare_query() {
        let t = FacilityToken::parse("lotId=Airport+Lot").unwrap();
        assert_eq!(t.facility_id, "Airport Lot");
    }

    #[test]
    fn rejects_malformed_tokens() {
        for raw in [
            "",
            "   ",
            "hello world",
            "https://smartparking.app/scan?other=1",
            r#"{"name": "no lot"}"#,
            r#"{"lotId": ""}"#,
            r#"{"lotId": 1.5}"#,
            "[1,2,3]",
            "42",
        ] {
            assert!(
                matches!(FacilityToken::parse(raw), Err(DomainError::InvalidToken(_))),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn issued_tokens_parse_back_with_nonce() {
        let facility = Facility::new("2", "Green Park Lot", 3000, 10, None);
        let issued = FacilityToken::issue(&facility);
        let parsed = FacilityToken::parse(&issued.encode()).unwrap();
        assert_eq!(parsed, issued);
        assert!(parsed.nonce.is_some());
    }

    #[test]
    fn percent_decode_keeps_invalid_escapes() {
        assert_eq!(percent_decode("a%2Fb"), "a/b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }
}
