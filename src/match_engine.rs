use crate::http::Request;
use indexmap::IndexMap;

/// A per-task rule: a mapping from request attribute name (`url`, `host`,
/// `port`, or any header name) to the set of acceptable values. A missing
/// attribute matches everything; an attribute present with an empty value
/// list matches nothing.
#[derive(Debug, Clone, Default)]
pub struct MatchCriteria(pub IndexMap<String, Vec<String>>);

impl MatchCriteria {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn with(mut self, attribute: impl Into<String>, values: Vec<String>) -> Self {
        self.0.insert(attribute.into(), values);
        self
    }

    /// `url` matches by prefix (the request-target starts with any listed
    /// value); every other attribute matches by exact equality.
    pub fn matches(&self, request: &Request) -> bool {
        for (attribute, values) in &self.0 {
            let actual = request.attribute(attribute).unwrap_or("");
            let matched = if attribute == "url" {
                values.iter().any(|prefix| actual.starts_with(prefix.as_str()))
            } else {
                values.iter().any(|value| value == actual)
            };
            if !matched {
                return false;
            }
        }
        true
    }
}

/// The ordered rule table: the first entry whose criteria all evaluate true
/// wins. Built once from configuration; the config layer is responsible for
/// supplying more-specific rules before less-specific ones.
pub struct MatchEngine<H> {
    rules: Vec<(MatchCriteria, H)>,
}

impl<H> MatchEngine<H> {
    pub fn new(rules: Vec<(MatchCriteria, H)>) -> Self {
        Self { rules }
    }

    pub fn dispatch(&self, request: &Request) -> Option<&H> {
        self.rules
            .iter()
            .find(|(criteria, _)| criteria.matches(request))
            .map(|(_, handler)| handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Headers, Method};

    fn req(url: &str, host: &str, port: &str) -> Request {
        Request {
            method: Method::Get,
            url: url.to_string(),
            headers: Headers::new(),
            host: host.to_string(),
            port: port.to_string(),
            body: Vec::new(),
            raw: Vec::new(),
        }
    }

    #[test]
    fn empty_criteria_matches_everything() {
        let criteria = MatchCriteria::new();
        assert!(criteria.matches(&req("/anything", "h", "1")));
    }

    #[test]
    fn url_criterion_is_prefix_match() {
        let criteria = MatchCriteria::new().with("url", vec!["/static/".to_string()]);
        assert!(criteria.matches(&req("/static/a.css", "h", "1")));
        assert!(!criteria.matches(&req("/other", "h", "1")));
    }

    #[test]
    fn empty_url_list_matches_nothing() {
        let criteria = MatchCriteria::new().with("url", vec![]);
        assert!(!criteria.matches(&req("/anything", "h", "1")));
    }

    #[test]
    fn non_url_criterion_is_exact_match() {
        let criteria = MatchCriteria::new().with("host", vec!["example.com".to_string()]);
        assert!(criteria.matches(&req("/", "example.com", "1")));
        assert!(!criteria.matches(&req("/", "other.com", "1")));
    }

    #[test]
    fn header_criterion_matches_request_header() {
        let mut r = req("/", "h", "1");
        r.headers.insert("X-Flag".to_string(), "on".to_string());
        let criteria = MatchCriteria::new().with("X-Flag", vec!["on".to_string()]);
        assert!(criteria.matches(&r));
    }

    #[test]
    fn first_matching_rule_wins_in_order() {
        let specific = MatchCriteria::new().with("url", vec!["/static/".to_string()]);
        let catch_all = MatchCriteria::new();
        let engine = MatchEngine::new(vec![
            (specific, "static"),
            (catch_all, "fallback"),
        ]);
        assert_eq!(engine.dispatch(&req("/static/a.css", "h", "1")), Some(&"static"));
        assert_eq!(engine.dispatch(&req("/other", "h", "1")), Some(&"fallback"));
    }

    #[test]
    fn reordering_changes_which_rule_wins_among_matches() {
        let a = MatchCriteria::new();
        let b = MatchCriteria::new();
        let engine_ab = MatchEngine::new(vec![(a.clone(), "a"), (b.clone(), "b")]);
        let engine_ba = MatchEngine::new(vec![(b, "b"), (a, "a")]);
        assert_eq!(engine_ab.dispatch(&req("/", "h", "1")), Some(&"a"));
        assert_eq!(engine_ba.dispatch(&req("/", "h", "1")), Some(&"b"));
    }

    #[test]
    fn no_rule_matches_returns_none() {
        let criteria = MatchCriteria::new().with("url", vec!["/static/".to_string()]);
        let engine = MatchEngine::new(vec![(criteria, "static")]);
        assert_eq!(engine.dispatch(&req("/other", "h", "1")), None);
    }
}
