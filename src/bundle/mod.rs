//! Bindings extracted from a downloaded configuration bundle.
//!
//! The bundle schema shifts between controller firmware and app versions, so
//! the tree is walked generically: any map carrying a `jsonId`,
//! `genericJsonId`, `readBinding` or `writeBinding` becomes a [`Binding`],
//! everything else is descended into and otherwise ignored.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    error::ConfigurationError,
    id::{EncodedId, Layout},
};

pub mod search;
pub mod translate;
mod walk;

pub use search::{Search, search};
pub use translate::Translator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ValueKind {
    #[default]
    Analog,
    Digital,
    Enumerated,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EnumOption {
    pub label: String,
    pub value: f64,
}

/// IDs of one `readBinding` / `writeBinding` sub-object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IdPair {
    pub direct: Option<EncodedId>,
    pub generic: Option<EncodedId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Binding {
    pub name: String,
    /// labels of the enclosing device/widget nodes, outermost first
    pub context: Vec<String>,
    pub uid: Option<String>,
    pub direct_id: Option<EncodedId>,
    pub generic_id: Option<EncodedId>,
    pub read: Option<IdPair>,
    pub write: Option<IdPair>,
    pub value_kind: ValueKind,
    pub range: Option<Range>,
    pub step: Option<f64>,
    pub options: Vec<EnumOption>,
    pub unit: Option<String>,
    pub readonly: Option<bool>,
}

pub struct Bundle {
    tree: Value,
    bindings: Vec<Binding>,
}

impl IdPair {
    pub fn get(&self, layout: Layout) -> Option<&EncodedId> {
        match layout {
            Layout::Direct => self.direct.as_ref(),
            Layout::Generic => self.generic.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_none() && self.generic.is_none()
    }
}

impl Binding {
    pub fn context_path(&self) -> String {
        self.context.join(" / ")
    }

    pub fn shared_id(&self, layout: Layout) -> Option<&EncodedId> {
        match layout {
            Layout::Direct => self.direct_id.as_ref(),
            Layout::Generic => self.generic_id.as_ref(),
        }
    }

    pub fn is_usable(&self, layout: Layout) -> bool {
        resolve_read_write(self, layout).is_ok()
    }
}

/// `(read, write)` for `layout`. Distinct when the sub-bindings differ,
/// otherwise the one available ID twice.
pub fn resolve_read_write(
    binding: &Binding,
    layout: Layout,
) -> Result<(EncodedId, EncodedId), ConfigurationError> {
    let shared = binding.shared_id(layout);
    let read = binding.read.as_ref().and_then(|p| p.get(layout)).or(shared);
    let write = binding.write.as_ref().and_then(|p| p.get(layout)).or(shared);

    match (read, write) {
        (Some(r), Some(w)) => Ok((r.clone(), w.clone())),
        (Some(id), None) | (None, Some(id)) => Ok((id.clone(), id.clone())),
        (None, None) => Err(ConfigurationError::NoPointId(binding.name.clone(), layout)),
    }
}

/// Unwraps the shapes the bundle arrives in: a storage wrapper
/// `{version, key, data: {<one entry>}}` and `cloudConfig.data` holding the
/// real document as a JSON string.
pub fn normalize_root(tree: &Value) -> Cow<'_, Value> {
    let mut root = tree;

    if let Some(obj) = root.as_object() {
        if obj.contains_key("version") && obj.contains_key("key") {
            if let Some(data) = obj.get("data").and_then(Value::as_object) {
                if let (1, Some(only)) = (data.len(), data.values().next()) {
                    if only.is_object() {
                        root = only;
                    }
                }
            }
        }
    }

    if let Some(data) = root.pointer("/cloudConfig/data").and_then(Value::as_str) {
        let trimmed = data.trim();
        let looks_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
            || (trimmed.starts_with('[') && trimmed.ends_with(']'));
        if looks_json {
            match serde_json::from_str(trimmed) {
                Ok(inner) => return Cow::Owned(inner),
                Err(e) => debug!("cloudConfig.data is not JSON ({e}), walking outer bundle"),
            }
        }
    }

    Cow::Borrowed(root)
}

/// Flattens `tree` into bindings in discovery order. Never fails: malformed
/// subtrees are skipped.
pub fn build(tree: &Value, language: Option<&str>) -> Vec<Binding> {
    let root = normalize_root(tree);

    let mut tr = Translator::from_tree(&root, language);
    if root.get("translation").is_none() {
        tr = Translator::from_tree(tree, language);
    }

    let mut walker = walk::Walker::new(&tr);
    walker.walk(&root, 0);
    walker.out
}

impl Bundle {
    pub fn build(tree: Value) -> Self {
        Self::build_localized(tree, None)
    }

    pub fn build_localized(tree: Value, language: Option<&str>) -> Self {
        let bindings = build(&tree, language);
        info!("indexed {} bindings", bindings.len());
        Self { tree, bindings }
    }

    pub fn from_json(s: &str, language: Option<&str>) -> Result<Self, serde_json::Error> {
        Ok(Self::build_localized(serde_json::from_str(s)?, language))
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn search<'a>(&'a self, name: Option<&str>, context: Option<&str>) -> Search<'a> {
        search(&self.bindings, name, context)
    }
}
