use serde_json::{Map, Value};

/// Label lookup against a bundle's `translation` table.
///
/// Without a language, labels pass through with any leading `#` removed.
#[derive(Debug, Clone, Default)]
pub struct Translator {
    table: Map<String, Value>,
    lang: Option<String>,
    fallback: String,
}

impl Translator {
    pub fn from_tree(tree: &Value, language: Option<&str>) -> Self {
        let section = tree.get("translation").and_then(Value::as_object);

        let table = section
            .and_then(|t| t.get("translations"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let fallback = section
            .and_then(|t| t.get("fallback"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "EN".to_string());

        let enabled: Vec<String> = section
            .and_then(|t| t.get("enabled"))
            .and_then(Value::as_array)
            .map(|langs| {
                langs
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let lang = language
            .map(|l| l.trim().to_uppercase())
            .filter(|l| !l.is_empty() && l != "AUTO")
            .map(|l| {
                if !enabled.is_empty() && !enabled.contains(&l) {
                    fallback.clone()
                } else {
                    l
                }
            });

        Self {
            table,
            lang,
            fallback,
        }
    }

    pub fn tr(&self, label: &str) -> String {
        let label = label.trim();
        let Some(lang) = &self.lang else {
            return label.trim_start_matches('#').to_string();
        };

        let alt = match label.strip_prefix('#') {
            Some(bare) => bare.to_string(),
            None => format!("#{label}"),
        };

        for key in [label, alt.as_str()] {
            if let Some(found) = self.table.get(key).and_then(|e| self.pick(e, lang)) {
                return found;
            }
        }

        label.trim_start_matches('#').to_string()
    }

    fn pick(&self, entry: &Value, lang: &str) -> Option<String> {
        match entry {
            Value::String(s) => usable(s),
            Value::Object(per_lang) => per_lang
                .get(lang)
                .and_then(Value::as_str)
                .and_then(usable)
                .or_else(|| per_lang.get(&self.fallback).and_then(Value::as_str).and_then(usable))
                .or_else(|| per_lang.values().filter_map(Value::as_str).find_map(usable)),
            _ => None,
        }
    }
}

fn usable(s: &str) -> Option<String> {
    let s = s.trim();
    match s {
        "" | "-" | "—" => None,
        s => Some(s.to_string()),
    }
}
