use super::Binding;

/// Filtered view over a binding list. Iterating does not consume it, so the
/// same query can be walked any number of times.
#[derive(Debug, Clone)]
pub struct Search<'a> {
    bindings: &'a [Binding],
    name: Option<String>,
    context: Option<String>,
}

pub struct SearchIter<'a, 's> {
    search: &'s Search<'a>,
    inner: std::slice::Iter<'a, Binding>,
}

pub fn search<'a>(bindings: &'a [Binding], name: Option<&str>, context: Option<&str>) -> Search<'a> {
    Search {
        bindings,
        name: name.map(str::to_lowercase),
        context: context.map(str::to_lowercase),
    }
}

impl<'a> Search<'a> {
    pub fn iter<'s>(&'s self) -> SearchIter<'a, 's> {
        SearchIter {
            search: self,
            inner: self.bindings.iter(),
        }
    }

    pub fn matches(&self, binding: &Binding) -> bool {
        if let Some(needle) = &self.name {
            if !binding.name.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.context {
            if !binding.context_path().to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

impl<'a> Iterator for SearchIter<'a, '_> {
    type Item = &'a Binding;

    fn next(&mut self) -> Option<Self::Item> {
        let search = self.search;
        self.inner.find(|b| search.matches(b))
    }
}

impl<'a, 's> IntoIterator for &'s Search<'a> {
    type Item = &'a Binding;
    type IntoIter = SearchIter<'a, 's>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(name: &str, context: &[&str]) -> Binding {
        Binding {
            name: name.to_string(),
            context: context.iter().map(|s| s.to_string()).collect(),
            ..Binding::default()
        }
    }

    fn names<'a>(it: impl IntoIterator<Item = &'a Binding>) -> Vec<&'a str> {
        it.into_iter().map(|b| b.name.as_str()).collect()
    }

    fn sample() -> Vec<Binding> {
        vec![
            binding("Vorlauftemperatur", &["Anlage", "Heizkreis 1"]),
            binding("Raumsollwert", &["Anlage", "Heizkreis 1"]),
            binding("Vorlauftemperatur", &["Anlage", "Heizkreis 2"]),
            binding("Warmwasser Soll", &["Anlage", "Warmwasser"]),
        ]
    }

    #[test]
    fn test_name_case_insensitive() {
        let list = sample();
        assert_eq!(names(&search(&list, Some("VORLAUF"), None)), vec!["Vorlauftemperatur", "Vorlauftemperatur"]);
    }

    #[test]
    fn test_context_matches_joined_path() {
        let list = sample();
        let hk2 = search(&list, None, Some("anlage / heizkreis 2"));
        assert_eq!(hk2.iter().count(), 1);
    }

    #[test]
    fn test_intersection_and_order() {
        let list = sample();
        let both = search(&list, Some("vorlauf"), Some("heizkreis"));
        assert_eq!(both.iter().count(), 2);

        // filters are independent, so swapping which one runs first changes nothing
        let by_name: Vec<_> = search(&list, Some("vorlauf"), None).iter().cloned().collect();
        let narrowed: Vec<_> = search(&by_name, None, Some("heizkreis")).iter().cloned().collect();
        let by_ctx: Vec<_> = search(&list, None, Some("heizkreis")).iter().cloned().collect();
        let narrowed_rev: Vec<_> = search(&by_ctx, Some("vorlauf"), None).iter().cloned().collect();
        assert_eq!(narrowed, narrowed_rev);
        assert_eq!(narrowed, both.iter().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn test_restartable() {
        let list = sample();
        let s = search(&list, None, None);
        assert_eq!(s.iter().count(), 4);
        assert_eq!(s.iter().count(), 4);
        assert_eq!(names(&s)[3], "Warmwasser Soll");
        assert_eq!(list.len(), 4);
    }
}
