use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::id::{EncodedId, Layout, PointId};

use super::{Binding, EnumOption, IdPair, Range, ValueKind, translate::Translator};

const NAME: &str = "name";
const LABEL: &str = "label";
const DIRECT_ID: &str = "jsonId";
const GENERIC_ID: &str = "genericJsonId";
const READ_BINDING: &str = "readBinding";
const WRITE_BINDING: &str = "writeBinding";

const MAX_DEPTH: usize = 128;

const MIN_KEYS: [&str; 5] = ["min", "minimum", "minValue", "lowerLimit", "rangeMin"];
const MAX_KEYS: [&str; 5] = ["max", "maximum", "maxValue", "upperLimit", "rangeMax"];

// layout widgets that carry a `#name` but never a setting
const PLACEHOLDER_NAMES: [&str; 7] = ["empty", "left", "right", "line", "group", "weather", "shower"];

type DedupKey = (Option<String>, Vec<String>, Vec<String>, String);

pub(super) struct Walker<'a> {
    tr: &'a Translator,
    context: Vec<String>,
    seen: HashSet<DedupKey>,
    pub out: Vec<Binding>,
}

impl<'a> Walker<'a> {
    pub fn new(tr: &'a Translator) -> Self {
        Self {
            tr,
            context: Vec::new(),
            seen: HashSet::new(),
            out: Vec::new(),
        }
    }

    pub fn walk(&mut self, node: &Value, depth: usize) {
        if depth > MAX_DEPTH {
            debug!("bundle nesting deeper than {MAX_DEPTH}, skipping subtree");
            return;
        }

        match node {
            Value::Object(map) => self.visit_map(map, depth),
            Value::Array(items) => {
                for item in items {
                    self.walk(item, depth + 1);
                }
            }
            _ => {}
        }
    }

    fn visit_map(&mut self, map: &Map<String, Value>, depth: usize) {
        let raw_name = node_name(map);
        let placeholder = is_placeholder_name(raw_name);

        // layout nodes never bind themselves, but their children may
        if placeholder {
            debug!("skipping placeholder node `{raw_name}`");
        } else if let Some(binding) = self.binding_from_node(map, raw_name) {
            self.push(binding);
        }

        let pushed = match context_label(map).filter(|_| !placeholder) {
            Some(label) => {
                self.context.push(self.tr.tr(label));
                true
            }
            None => false,
        };

        for (key, child) in map {
            // sub-bindings only ever describe their parent
            if key == READ_BINDING || key == WRITE_BINDING {
                continue;
            }
            self.walk(child, depth + 1);
        }

        if pushed {
            self.context.pop();
        }
    }

    fn push(&mut self, binding: Binding) {
        let key = dedup_key(&binding);
        if self.seen.insert(key) {
            self.out.push(binding);
        }
    }

    fn binding_from_node(&self, map: &Map<String, Value>, raw_name: &str) -> Option<Binding> {
        let read = sub_binding(map, READ_BINDING);
        let write = sub_binding(map, WRITE_BINDING);
        let direct_id = node_id(map, DIRECT_ID, Layout::Direct);
        let generic_id = node_id(map, GENERIC_ID, Layout::Generic);

        if read.is_none() && write.is_none() && direct_id.is_none() && generic_id.is_none() {
            return None;
        }

        let class = str_field(map, "class").unwrap_or("").to_lowercase();
        let options = options_from_states(map, self.tr);
        let value_kind = if ["digital", "binary", "bool"].iter().any(|k| class.contains(k)) {
            ValueKind::Digital
        } else if !options.is_empty() || class.ends_with("enumdeviceinfo") {
            ValueKind::Enumerated
        } else {
            ValueKind::Analog
        };

        let readonly = map
            .get("isReadonly")
            .and_then(Value::as_bool)
            .or_else(|| sub_object(map, READ_BINDING).and_then(|rb| rb.get("isReadonly")).and_then(Value::as_bool));

        Some(Binding {
            name: self.tr.tr(raw_name),
            context: self.context.clone(),
            uid: map.get("uid").and_then(scalar_string),
            direct_id,
            generic_id,
            read,
            write,
            value_kind,
            range: extract_range(map),
            step: extract_step(map),
            options,
            unit: str_field(map, "unit").map(str::to_string),
            readonly,
        })
    }
}

fn node_name(map: &Map<String, Value>) -> &str {
    str_field(map, NAME)
        .or_else(|| str_field(map, LABEL))
        .or_else(|| sub_object(map, READ_BINDING).and_then(|rb| str_field(rb, LABEL)))
        .unwrap_or("")
}

fn context_label(map: &Map<String, Value>) -> Option<&str> {
    let is_context = (map.contains_key("class") && map.contains_key("uid"))
        || (map.contains_key("controllerId") && map.contains_key(NAME));
    if !is_context {
        return None;
    }
    str_field(map, NAME).filter(|n| !n.trim().is_empty())
}

fn is_placeholder_name(name: &str) -> bool {
    let name = name.trim();
    if name.starts_with("value_key_") || (name.contains("[[") && name.contains("]]")) {
        return true;
    }
    let Some(core) = name.strip_prefix('#') else {
        return false;
    };
    let core = core.trim().to_lowercase();
    if PLACEHOLDER_NAMES.contains(&core.as_str()) {
        return true;
    }
    // ratio layouts like `#50:50`
    match core.split_once(':') {
        Some((a, b)) => {
            let (a, b) = (a.trim(), b.trim());
            !a.is_empty() && !b.is_empty() && a.chars().all(|c| c.is_ascii_digit()) && b.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn dedup_key(b: &Binding) -> DedupKey {
    let ids = |pair: &Option<IdPair>| -> Vec<String> {
        pair.iter()
            .flat_map(|p| [p.direct.as_ref(), p.generic.as_ref()])
            .flatten()
            .map(|id| id.as_str().to_string())
            .collect()
    };
    (b.uid.clone(), ids(&b.read), ids(&b.write), b.name.clone())
}

fn sub_object<'m>(map: &'m Map<String, Value>, key: &str) -> Option<&'m Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

fn sub_binding(map: &Map<String, Value>, key: &str) -> Option<IdPair> {
    let sub = sub_object(map, key)?;
    let pair = IdPair {
        direct: node_id(sub, DIRECT_ID, Layout::Direct),
        generic: node_id(sub, GENERIC_ID, Layout::Generic),
    };
    if pair.is_empty() { None } else { Some(pair) }
}

/// Validates an ID text found in the tree. Never builds one from the triple.
fn node_id(map: &Map<String, Value>, key: &str, layout: Layout) -> Option<EncodedId> {
    let text = str_field(map, key)?.trim();
    if text.is_empty() {
        return None;
    }

    let id = match EncodedId::parse(layout, text) {
        Ok(id) => id,
        Err(e) => {
            debug!("dropping `{key}`: {e}");
            return None;
        }
    };

    let triple = (
        map.get("objectType").and_then(Value::as_u64),
        map.get("objectId").and_then(Value::as_u64),
        map.get("memberId").and_then(Value::as_u64),
    );
    if let (Some(ot), Some(oid), Some(mid)) = triple {
        if PointId::new(ot, oid, mid).ok() != Some(id.point()) {
            debug!("dropping `{key}` {text}: decodes to {}, node says ({ot}, {oid}, {mid})", id.point());
            return None;
        }
    }

    Some(id)
}

fn str_field<'m>(map: &'m Map<String, Value>, key: &str) -> Option<&'m str> {
    map.get(key).and_then(Value::as_str)
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers, numeric strings (decimal comma allowed) and `{"value": ..}` wrappers.
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim().replace(',', ".");
            if s.is_empty() { None } else { s.parse().ok() }
        }
        Value::Object(inner) => ["value", "val", "current", "default"]
            .iter()
            .find_map(|k| inner.get(*k))
            .and_then(|v| match v {
                Value::Object(_) => None,
                v => as_number(v),
            }),
        _ => None,
    }
}

fn first_number(scope: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| scope.get(*k).and_then(as_number))
}

fn extract_range(map: &Map<String, Value>) -> Option<Range> {
    let scopes = [Some(map), sub_object(map, READ_BINDING), sub_object(map, WRITE_BINDING)];

    for scope in scopes.into_iter().flatten() {
        let mut min = first_number(scope, &MIN_KEYS);
        let mut max = first_number(scope, &MAX_KEYS);

        for nested in ["range", "limits", "limit", "valueRange"] {
            if let Some(nested) = sub_object(scope, nested) {
                min = min.or_else(|| first_number(nested, &MIN_KEYS));
                max = max.or_else(|| first_number(nested, &MAX_KEYS));
            }
        }

        match (min, max) {
            (Some(min), Some(max)) if min <= max => return Some(Range { min, max }),
            (None, None) => continue,
            // one-sided or inverted hints are not a usable range
            _ => return None,
        }
    }
    None
}

fn extract_step(map: &Map<String, Value>) -> Option<f64> {
    if let Some(step) = map.get("step").and_then(as_number).filter(|s| *s > 0.0) {
        return Some(step);
    }
    let precision = map.get("writePrecision").and_then(as_number)?;
    if precision.fract() != 0.0 || !(0.0..=6.0).contains(&precision) {
        return None;
    }
    Some(1.0 / 10f64.powi(precision as i32))
}

fn options_from_states(map: &Map<String, Value>, tr: &Translator) -> Vec<EnumOption> {
    let Some(states) = map.get("states").and_then(Value::as_array) else {
        return Vec::new();
    };

    let codes: Vec<Option<f64>> = states
        .iter()
        .map(|st| st.get("readId").and_then(as_number))
        .collect();
    let mut distinct = codes.iter().flatten().map(|c| c.to_bits()).collect::<Vec<_>>();
    distinct.sort_unstable();
    distinct.dedup();
    // missing or repeated codes -> the position is the value
    let indexed = codes.iter().any(Option::is_none) || distinct.len() != codes.len();

    let mut options: Vec<EnumOption> = Vec::with_capacity(states.len());
    for (idx, (state, code)) in states.iter().zip(&codes).enumerate() {
        let Some(state) = state.as_object() else {
            continue;
        };
        let value = match (indexed, code) {
            (false, Some(code)) => *code,
            _ => idx as f64,
        };

        let mut label = str_field(state, LABEL)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| tr.tr(l))
            .filter(|l| !l.is_empty() && l != "-")
            .unwrap_or_else(|| format!("{value}"));
        if options.iter().any(|o| o.label == label) {
            label = format!("{label} ({value})");
        }

        options.push(EnumOption { label, value });
    }
    options
}
