//! Normalized provider status and record shapes.
//!
//! Providers disagree on field names and status vocabulary, and both drift
//! across API versions. Every response is normalized here, at the boundary;
//! everything past this module only sees [`ProviderStatus`] and [`RemotePin`].

use crate::cid::ContentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

const CID_FIELDS: &[&str] = &["cid", "ipfs_pin_hash", "hash", "Hash", "IpfsHash", "Key", "pin.cid"];
const STATUS_FIELDS: &[&str] = &["status", "state", "pin_status"];
const SIZE_FIELDS: &[&str] = &["size", "pin_size", "PinSize"];
const NAME_FIELDS: &[&str] = &["name", "metadata.name", "pin.name"];
const PAGE_FIELDS: &[&str] = &["results", "rows", "pins", "items"];
const TOTAL_FIELDS: &[&str] = &["count", "total"];

/// Provider-reported pin status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderStatus {
    /// Durably stored.
    Pinned,
    /// Accepted and queued, not yet stored.
    Pending,
    /// Provider is looking for the content on the network.
    Searching,
    /// Provider gave up.
    Failed,
    /// Anything the provider reported that we do not recognize.
    Unknown,
}

impl ProviderStatus {
    /// Map a raw status string onto the normalized vocabulary.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pinned" | "pin_success" | "complete" | "completed" => ProviderStatus::Pinned,
            "queued" | "pending" | "pin_queued" | "pinning" | "prechecking" | "retrieving" => {
                ProviderStatus::Pending
            }
            "searching" => ProviderStatus::Searching,
            "failed" | "pin_failed" | "expired" => ProviderStatus::Failed,
            _ => ProviderStatus::Unknown,
        }
    }

    /// Query-string value used when filtering a listing by this status.
    pub fn as_filter(&self) -> &'static str {
        match self {
            ProviderStatus::Pinned => "pinned",
            ProviderStatus::Pending => "queued",
            ProviderStatus::Searching => "searching",
            ProviderStatus::Failed => "failed",
            ProviderStatus::Unknown => "unknown",
        }
    }

    /// Statuses that describe work still in progress on the provider.
    pub fn is_pending_like(&self) -> bool {
        matches!(self, ProviderStatus::Pending | ProviderStatus::Searching)
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderStatus::Pinned => "pinned",
            ProviderStatus::Pending => "pending",
            ProviderStatus::Searching => "searching",
            ProviderStatus::Failed => "failed",
            ProviderStatus::Unknown => "unknown",
        })
    }
}

/// One pin as reported by a provider, after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePin {
    pub cid: ContentId,
    pub status: ProviderStatus,
    pub name: Option<String>,
    pub size: Option<u64>,
}

/// One page of a provider listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub pins: Vec<RemotePin>,
    /// Total matching records, when the provider reports it.
    pub total: Option<u64>,
}

/// Look up a field by any of its aliases. Dotted aliases descend into objects.
pub fn field<'a>(value: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| {
        alias
            .split('.')
            .try_fold(value, |current, part| current.get(part))
            .filter(|found| !found.is_null())
    })
}

fn field_str<'a>(value: &'a Value, aliases: &[&str]) -> Option<&'a str> {
    field(value, aliases).and_then(Value::as_str)
}

fn field_u64(value: &Value, aliases: &[&str]) -> Option<u64> {
    field(value, aliases).and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    })
}

/// Extract the identifier a provider returned, under any known alias.
pub fn identifier_field(value: &Value) -> Option<&str> {
    field_str(value, CID_FIELDS)
}

/// Normalize one raw record. Records without a parseable identifier are
/// dropped.
///
/// A record with no status field at all is taken as `Pinned`: providers that
/// omit status only list completed pins.
pub fn normalize_record(value: &Value) -> Option<RemotePin> {
    let raw_cid = identifier_field(value)?;
    let cid = match ContentId::parse(raw_cid) {
        Ok(cid) => cid,
        Err(e) => {
            debug!(raw = raw_cid, error = %e, "dropping record with unparseable identifier");
            return None;
        }
    };

    let status = field_str(value, STATUS_FIELDS)
        .map(ProviderStatus::normalize)
        .unwrap_or(ProviderStatus::Pinned);

    Some(RemotePin {
        cid,
        status,
        name: field_str(value, NAME_FIELDS).map(str::to_string),
        size: field_u64(value, SIZE_FIELDS),
    })
}

/// Normalize a listing response: either a bare array or an object holding the
/// records under one of the known page aliases.
pub fn normalize_page(value: &Value) -> Option<ListPage> {
    let (records, total) = match value {
        Value::Array(records) => (records, None),
        Value::Object(_) => (
            field(value, PAGE_FIELDS)?.as_array()?,
            field_u64(value, TOTAL_FIELDS),
        ),
        _ => return None,
    };

    Some(ListPage {
        pins: records.iter().filter_map(normalize_record).collect(),
        total,
    })
}
