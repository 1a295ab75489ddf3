//! Decoding of upgrade manifests.
//!
//! A manifest is a YAML stream whose documents hold sequences of mappings, one
//! mapping per file change:
//!
//! ```yaml
//! - relative_path: conf/app.conf
//!   action: modify
//!   chmod: "644"
//! - relative_path: lib/old.so
//!   waf_base: /opt/waf/
//!   action: delete
//! ```
//!
//! Records keep document order. Keys other than the four known ones are
//! ignored, a missing key leaves its field unset, and a repeated key takes
//! its last value.

use serde::Serialize;
use serde::de::{
    self, Deserialize, Deserializer, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor,
};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Malformed manifest: {0}")]
    Structure(String),
    #[error("Manifest holds more than {max} records")]
    TooManyRecords { max: usize },
}

/// What an upgrade does with a file.
///
/// `Modify` is both an `Add` and a `Delete`: the live file is backed up and
/// then replaced by the staged one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Delete,
    Modify,
}

impl Action {
    /// Only the exact lowercase literals are recognized.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "add" => Some(Action::Add),
            "delete" => Some(Action::Delete),
            "modify" => Some(Action::Modify),
            _ => None,
        }
    }

    pub fn includes_add(self) -> bool {
        matches!(self, Action::Add | Action::Modify)
    }

    pub fn includes_delete(self) -> bool {
        matches!(self, Action::Delete | Action::Modify)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Delete => "delete",
            Action::Modify => "modify",
        }
    }
}

/// One file change read from a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub relative_path: String,
    /// Replaces the configured live root for this record only.
    #[serde(rename = "waf_base", skip_serializing_if = "Option::is_none")]
    pub live_base: Option<String>,
    /// Parsed for completeness; nothing applies it.
    #[serde(
        rename = "chmod",
        skip_serializing_if = "is_zero",
        serialize_with = "serialize_mode"
    )]
    pub permission_mode: u32,
    /// `None` when the manifest named no action or an unknown one. Such a
    /// record is carried through but never touches the filesystem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

fn is_zero(mode: &u32) -> bool {
    *mode == 0
}

fn serialize_mode<S: serde::Serializer>(mode: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&mode.to_string())
}

/// What to do with records past the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Fail the decode.
    #[default]
    Reject,
    /// Keep the first `max` records and warn about the rest.
    Truncate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub records: Vec<ChangeRecord>,
}

impl Manifest {
    /// Decode a YAML stream into records, preserving document order.
    pub fn from_yaml(
        bytes: &[u8],
        max_records: usize,
        overflow: OverflowPolicy,
    ) -> Result<Self, ManifestError> {
        let mut records = Vec::new();
        let mut dropped = 0usize;

        for document in serde_yaml::Deserializer::from_slice(bytes) {
            let node = Node::deserialize(document)?;
            for entries in document_mappings(node)? {
                if records.len() >= max_records {
                    match overflow {
                        OverflowPolicy::Reject => {
                            return Err(ManifestError::TooManyRecords { max: max_records });
                        }
                        OverflowPolicy::Truncate => {
                            dropped += 1;
                            continue;
                        }
                    }
                }
                records.push(record_from_entries(&entries)?);
            }
        }

        if dropped > 0 {
            warn!(
                "Manifest exceeds the limit of {} records; ignoring {} trailing record(s)",
                max_records, dropped
            );
        }

        Ok(Manifest { records })
    }

    /// Read and decode a manifest file.
    pub fn load(
        path: &Path,
        max_records: usize,
        overflow: OverflowPolicy,
    ) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ManifestError::PermissionDenied(path.to_path_buf())
            } else {
                ManifestError::Io(e)
            }
        })?;

        Self::from_yaml(&bytes, max_records, overflow)
    }

    /// Serialize the records as a single YAML sequence.
    ///
    /// Unset fields are left out, so decoding the output yields the same
    /// records again.
    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(&self.records)?)
    }
}

/// A YAML value as far as the decoder cares about it.
///
/// Mappings keep every entry in document order, duplicates included, so a
/// repeated key is resolved by [`record_from_entries`] rather than rejected
/// by the parser.
#[derive(Debug)]
enum Node {
    Null,
    Scalar(String),
    Sequence(Vec<Node>),
    Mapping(Vec<(Node, Node)>),
}

impl Node {
    fn kind_name(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Scalar(_) => "scalar",
            Node::Sequence(_) => "sequence",
            Node::Mapping(_) => "mapping",
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any YAML value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::Scalar(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Node, D::Error> {
        Node::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Node::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut entries = Vec::new();
        while let Some(entry) = map.next_entry()? {
            entries.push(entry);
        }
        Ok(Node::Mapping(entries))
    }

    // A tagged value (`!tag value`) decodes as its untagged value.
    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<Node, A::Error> {
        let (_tag, value): (String, _) = data.variant()?;
        value.newtype_variant()
    }
}

type Entries = Vec<(Node, Node)>;

fn document_mappings(document: Node) -> Result<Vec<Entries>, ManifestError> {
    match document {
        Node::Null => Ok(Vec::new()),
        Node::Mapping(entries) => Ok(vec![entries]),
        Node::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Node::Mapping(entries) => Ok(entries),
                other => Err(ManifestError::Structure(format!(
                    "entry {} is a {}, expected a mapping",
                    index,
                    other.kind_name()
                ))),
            })
            .collect(),
        other => Err(ManifestError::Structure(format!(
            "document is a {}, expected a sequence of mappings",
            other.kind_name()
        ))),
    }
}

/// Build a record from one mapping. When a key repeats, the last occurrence
/// wins, and a null value resets the field.
fn record_from_entries(entries: &[(Node, Node)]) -> Result<ChangeRecord, ManifestError> {
    let mut record = ChangeRecord::default();

    for (key, value) in entries {
        let Node::Scalar(key) = key else {
            continue;
        };

        match key.as_str() {
            "relative_path" => {
                record.relative_path = scalar_text(key, value)?.unwrap_or_default();
            }
            "waf_base" => {
                record.live_base = scalar_text(key, value)?;
            }
            "chmod" => {
                record.permission_mode = match scalar_text(key, value)? {
                    Some(text) => text.trim().parse().unwrap_or_else(|_| {
                        warn!("Ignoring unparsable chmod value {:?}", text);
                        0
                    }),
                    None => 0,
                };
            }
            "action" => {
                record.action = match scalar_text(key, value)? {
                    Some(text) => {
                        let action = Action::parse(&text);
                        if action.is_none() {
                            warn!(
                                "Unknown action {:?}; the record will not be applied",
                                text
                            );
                        }
                        action
                    }
                    None => None,
                };
            }
            _ => {}
        }
    }

    Ok(record)
}

/// Textual form of a scalar value, `None` for null.
fn scalar_text(key: &str, value: &Node) -> Result<Option<String>, ManifestError> {
    match value {
        Node::Null => Ok(None),
        Node::Scalar(text) => Ok(Some(text.clone())),
        other => Err(ManifestError::Structure(format!(
            "value of {:?} is a {}, expected a scalar",
            key,
            other.kind_name()
        ))),
    }
}
