//! The node model: [`NodeId`], [`NodeTag`], [`SelectedNode`], and the
//! attribute/value extractor wrappers [`NodeAttribute`] and [`NodeValue`].
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::PlacementError;

/// Width, in bytes, of an opaque storage-node identifier.
pub const NODE_ID_LEN: usize = 32;

/// An opaque, fixed-width storage-node identifier.
///
/// Renders as lowercase hex. Parses from either a 64-character hex string
/// or a base58-encoded string, matching the two encodings a `nodelist`
/// allow-list file may use (one ID per line).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; NODE_ID_LEN]);

/// Errors produced when parsing a [`NodeId`] from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeIdParseError {
    /// The string was neither valid hex nor valid base58 of the right
    /// decoded length.
    Malformed {
        /// The text that failed to parse.
        input: String,
    },
    /// The string decoded to the wrong number of bytes.
    WrongLength {
        /// The number of bytes actually decoded.
        got: usize,
    },
}

impl fmt::Display for NodeIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { input } => write!(f, "not a valid hex or base58 node id: {input:?}"),
            Self::WrongLength { got } => {
                write!(f, "node id must decode to {NODE_ID_LEN} bytes, got {got}")
            }
        }
    }
}

impl std::error::Error for NodeIdParseError {}

impl NodeId {
    /// Wraps a raw byte array as a [`NodeId`].
    pub fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Renders this id as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Renders this id as base58.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl FromStr for NodeId {
    type Err = NodeIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() == NODE_ID_LEN * 2 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            let mut out = [0u8; NODE_ID_LEN];
            hex::decode_to_slice(trimmed, &mut out)
                .map_err(|_| NodeIdParseError::Malformed { input: s.into() })?;
            return Ok(Self(out));
        }
        let decoded = bs58::decode(trimmed)
            .into_vec()
            .map_err(|_| NodeIdParseError::Malformed { input: s.into() })?;
        if decoded.len() != NODE_ID_LEN {
            return Err(NodeIdParseError::WrongLength { got: decoded.len() });
        }
        let mut out = [0u8; NODE_ID_LEN];
        out.copy_from_slice(&decoded);
        Ok(Self(out))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A signed assertion: "`signer` says node `node_id` has `name` = `value`".
///
/// Two tags with an identical `(signer_id, name, node_id)` triple are
/// considered the same tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeTag {
    /// The node this tag is about.
    pub node_id: NodeId,
    /// The node that signed this assertion.
    pub signer_id: NodeId,
    /// The tag name.
    pub name: String,
    /// The tag's raw value bytes.
    pub value: Vec<u8>,
    /// Unix timestamp (seconds) at which the tag was signed.
    pub signed_at: i64,
}

impl NodeTag {
    /// Returns `true` if `self` and `other` are the same tag per the
    /// `(signer, name, node)` identity rule.
    pub fn same_assertion_as(&self, other: &NodeTag) -> bool {
        self.signer_id == other.signer_id && self.name == other.name && self.node_id == other.node_id
    }
}

/// A storage node as seen by the selection engine.
///
/// Populated from the overlay cache snapshot; the engine never mutates a
/// `SelectedNode` in place — a new snapshot is a new set of values.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectedNode {
    /// Opaque node identifier.
    pub id: NodeId,
    /// Dial address, e.g. `"1.2.3.4:7777"`.
    pub address: String,
    /// Subnet key, e.g. the first three octets of an IPv4 address.
    pub last_net: String,
    /// `ip:port` this node was last seen contacting the satellite from.
    pub last_ip_port: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country_code: String,
    /// Continent name (e.g. `"Europe"`).
    pub continent: String,
    /// Whether the satellite considers this node established.
    pub vetted: bool,
    /// Whether this node is in the exit process.
    pub exiting: bool,
    /// Whether this node is currently reachable.
    pub online: bool,
    /// Whether this node is currently suspended.
    pub suspended: bool,
    /// Free disk space, in bytes.
    pub free_disk: u64,
    /// Number of pieces currently stored on this node.
    pub piece_count: i64,
    /// Operator payout wallet address.
    pub wallet: String,
    /// Operator contact email.
    pub email: String,
    /// Signed tags attached to this node.
    pub tags: Vec<NodeTag>,
}

impl SelectedNode {
    /// Returns the value bytes of the first tag matching `key`, optionally
    /// restricted to a specific `signer`. When `signer` is `None`, any
    /// signer matches (`tag:<key>` form in the attribute grammar).
    pub fn tag_value(&self, signer: Option<&NodeId>, key: &str) -> Option<&[u8]> {
        self.tags
            .iter()
            .find(|t| t.name == key && signer.is_none_or(|s| *s == t.signer_id))
            .map(|t| t.value.as_slice())
    }

    /// Computes the `subnet(bits)` attribute: the first `bits` bits of
    /// [`last_net`][Self::last_net] treated as a dotted-quad, rendered back
    /// as a dotted string. Falls back to the full `last_net` when it does
    /// not parse as a dotted-quad prefix.
    pub fn subnet(&self, bits: u8) -> String {
        let octets: Vec<&str> = self.last_net.split('.').collect();
        let keep = ((bits as usize) / 8).min(octets.len());
        if keep == 0 {
            return self.last_net.clone();
        }
        octets[..keep].join(".")
    }
}

/// A pure function `SelectedNode -> String`, named for display and DSL
/// round-tripping.
///
/// Wraps a closure rather than being a trait object directly so that
/// `Clone` and a human-readable `name()` come for free.
#[derive(Clone)]
pub struct NodeAttribute {
    name: String,
    f: Arc<dyn Fn(&SelectedNode) -> String + Send + Sync>,
}

impl fmt::Debug for NodeAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAttribute({})", self.name)
    }
}

impl NodeAttribute {
    /// Builds a named attribute from an arbitrary extractor closure.
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&SelectedNode) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// The attribute's name, as it would appear in the DSL.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates this attribute against `node`.
    pub fn apply(&self, node: &SelectedNode) -> String {
        (self.f)(node)
    }

    /// `last_net` — the node's subnet key.
    pub fn last_net() -> Self {
        Self::new("last_net", |n| n.last_net.clone())
    }

    /// `last_ip` — the IP portion of `last_ip_port`.
    pub fn last_ip() -> Self {
        Self::new("last_ip", |n| {
            n.last_ip_port
                .rsplit_once(':')
                .map_or_else(|| n.last_ip_port.clone(), |(ip, _)| ip.to_string())
        })
    }

    /// `country` — the node's ISO 3166-1 alpha-2 country code.
    pub fn country() -> Self {
        Self::new("country", |n| n.country_code.clone())
    }

    /// `id` — the node's id, rendered as hex.
    pub fn id() -> Self {
        Self::new("id", |n| n.id.to_hex())
    }

    /// `vetted` — `"true"`/`"false"`.
    pub fn vetted() -> Self {
        Self::new("vetted", |n| n.vetted.to_string())
    }

    /// `subnet(bits)` — the first `bits` bits of `last_net`.
    pub fn subnet(bits: u8) -> Self {
        Self::new(format!("subnet({bits})"), move |n| n.subnet(bits))
    }

    /// `tag:<signer>/<key>` (or `tag:<key>` when `signer` is `None`) — the
    /// tag value rendered as a lossy UTF-8 string, or the empty string when
    /// absent.
    pub fn tag(signer: Option<NodeId>, key: impl Into<String>) -> Self {
        let key = key.into();
        let label = match &signer {
            Some(s) => format!("tag:{}/{}", s.to_hex(), key),
            None => format!("tag:{key}"),
        };
        Self::new(label, move |n| {
            n.tag_value(signer.as_ref(), &key)
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .unwrap_or_default()
        })
    }

    /// Parses an attribute name as it appears in the DSL grammar:
    /// `last_net`, `last_ip`, `country`, `id`, `vetted`,
    /// `subnet(bits)`, `tag:<signer>/<key>`, or `tag:<key>` (any signer).
    pub fn parse(spec: &str) -> Result<Self, PlacementError> {
        if let Some(rest) = spec.strip_prefix("tag:") {
            return Ok(parse_tag_path(rest).map(|(signer, key)| Self::tag(signer, key))?);
        }
        if let Some(rest) = spec.strip_prefix("subnet(").and_then(|s| s.strip_suffix(')')) {
            let bits: u8 = rest
                .trim()
                .parse()
                .map_err(|_| PlacementError::InvalidAttribute(format!("subnet bits: {rest:?}")))?;
            return Ok(Self::subnet(bits));
        }
        match spec {
            "last_net" => Ok(Self::last_net()),
            "last_ip" => Ok(Self::last_ip()),
            "country" => Ok(Self::country()),
            "id" => Ok(Self::id()),
            "vetted" => Ok(Self::vetted()),
            other => Err(PlacementError::InvalidAttribute(format!(
                "unknown node attribute {other:?}"
            ))),
        }
    }
}

/// Parses a `<signer>/<key>` or bare `<key>` tag path (the part of
/// `tag:<signer>/<key>` after the `tag:` prefix), used by both
/// [`NodeAttribute::parse`] and [`NodeValue::parse`].
fn parse_tag_path(rest: &str) -> Result<(Option<NodeId>, String), PlacementError> {
    match rest.split_once('/') {
        Some((signer, key)) => {
            let signer: NodeId = signer
                .parse()
                .map_err(|e| PlacementError::InvalidAttribute(format!("tag signer {signer:?}: {e}")))?;
            Ok((Some(signer), key.to_string()))
        }
        None => {
            if rest.is_empty() {
                return Err(PlacementError::InvalidAttribute("empty tag key".to_string()));
            }
            Ok((None, rest.to_string()))
        }
    }
}

/// A pure function `SelectedNode -> f64`, named for display purposes.
#[derive(Clone)]
pub struct NodeValue {
    name: String,
    f: Arc<dyn Fn(&SelectedNode) -> f64 + Send + Sync>,
}

impl fmt::Debug for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeValue({})", self.name)
    }
}

impl NodeValue {
    /// Builds a named value extractor from an arbitrary closure.
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&SelectedNode) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// The extractor's name, as it would appear in the DSL.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates this value against `node`.
    pub fn apply(&self, node: &SelectedNode) -> f64 {
        (self.f)(node)
    }

    /// A value that ignores the node and always returns `v`.
    pub fn constant(v: f64) -> Self {
        Self::new(format!("{v}"), move |_| v)
    }

    /// `free_disk` — free disk space in bytes, as a float.
    pub fn free_disk() -> Self {
        Self::new("free_disk", |n| n.free_disk as f64)
    }

    /// `piece_count` — number of pieces stored, as a float.
    pub fn piece_count() -> Self {
        Self::new("piece_count", |n| n.piece_count as f64)
    }

    /// `tag:<signer>/<key>?<default>` — parses the tag's value bytes as a
    /// float, falling back to `default` when the tag is absent or does not
    /// parse.
    pub fn tag_float(signer: Option<NodeId>, key: impl Into<String>, default: f64) -> Self {
        let key = key.into();
        let label = match &signer {
            Some(s) => format!("tag:{}/{}?{}", s.to_hex(), key, default),
            None => format!("tag:{key}?{default}"),
        };
        Self::new(label, move |n| {
            n.tag_value(signer.as_ref(), &key)
                .and_then(|v| std::str::from_utf8(v).ok())
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(default)
        })
    }

    /// Parses a value name as it appears in the DSL grammar:
    /// `free_disk`, `piece_count`, `tag:<signer>/<key>?<default>`,
    /// or `tag:<key>?<default>` (any signer).
    pub fn parse(spec: &str) -> Result<Self, PlacementError> {
        if let Some(rest) = spec.strip_prefix("tag:") {
            let (path, default) = match rest.split_once('?') {
                Some((path, default)) => (
                    path,
                    default
                        .parse::<f64>()
                        .map_err(|_| PlacementError::InvalidAttribute(format!("tag default: {default:?}")))?,
                ),
                None => (rest, 0.0),
            };
            let (signer, key) = parse_tag_path(path)?;
            return Ok(Self::tag_float(signer, key, default));
        }
        match spec {
            "free_disk" => Ok(Self::free_disk()),
            "piece_count" => Ok(Self::piece_count()),
            other => Err(PlacementError::InvalidAttribute(format!(
                "unknown node value {other:?}"
            ))),
        }
    }
}
