//! URL classification into per-site queues.

use std::collections::HashSet;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;

/// Reserved key for URLs no specific site rule recognises.
pub const OTHER_SITE: &str = "other";

/// Key of the fanfiction.net rule, disabled by `ffnet_disable`.
pub const FFNET_SITE: &str = "ffnet";

lazy_static! {
    static ref DEFAULT_RULES: Vec<SiteRule> = [
        (FFNET_SITE, r"(fanfiction.net/s/\d*/?).*", "www."),
        ("ao3", r"(archiveofourown.org/works/\d*)/?.*", ""),
        ("fictionpress", r"(fictionpress.com/s/\d*)/?.*", ""),
        ("royalroad", r"(royalroad.com/fiction/\d*)/?.*", ""),
        ("sv", r"(forums.sufficientvelocity.com/threads/.*\.\d*)/?.*", ""),
        ("sb", r"(forums.spacebattles.com/threads/.*\.\d*)/?.*", ""),
        ("qq", r"(forum.questionablequesting.com/threads/.*\.\d*)/?.*", ""),
        (OTHER_SITE, r"https?://(.*)", ""),
    ]
    .into_iter()
    .map(|(key, pattern, prefix)| {
        SiteRule::new(key, pattern, prefix).expect("Failed to compile site rule")
    })
    .collect();
}

/// One row of the routing table.
#[derive(Debug, Clone)]
pub struct SiteRule {
    pub site_key: String,
    /// Pattern with one capture group holding the canonical part of the URL
    pub pattern: Regex,
    /// Prepended to the captured part
    pub prefix: String,
}

impl SiteRule {
    pub fn new(site_key: &str, pattern: &str, prefix: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .with_context(|| format!("Invalid pattern for site '{}'", site_key))?;
        Ok(Self {
            site_key: site_key.to_string(),
            pattern,
            prefix: prefix.to_string(),
        })
    }
}

/// Routing result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Normalised URL
    pub url: String,
    pub site_key: String,
    /// The site is switched off; the URL must not be enqueued
    pub disabled: bool,
}

#[derive(Debug, Clone)]
pub struct SiteRouter {
    rules: Vec<SiteRule>,
    disabled: HashSet<String>,
}

impl SiteRouter {
    pub fn new(rules: Vec<SiteRule>) -> Self {
        Self {
            rules,
            disabled: HashSet::new(),
        }
    }

    /// The built-in table: ffnet, ao3, fictionpress, royalroad, sv, sb, qq, other.
    pub fn default_rules() -> Vec<SiteRule> {
        DEFAULT_RULES.clone()
    }

    pub fn with_disabled_sites<I, S>(mut self, sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled.extend(sites.into_iter().map(Into::into));
        self
    }

    pub fn is_disabled(&self, site_key: &str) -> bool {
        self.disabled.contains(site_key)
    }

    /// Classify and normalise a URL. The first matching rule wins; a URL no
    /// rule matches is returned unchanged under the `other` key.
    pub fn route(&self, url: &str) -> Route {
        for rule in &self.rules {
            let Some(captures) = rule.pattern.captures(url) else {
                continue;
            };
            let captured = captures.get(1).map_or("", |m| m.as_str());
            return Route {
                url: format!("{}{}", rule.prefix, captured),
                site_key: rule.site_key.clone(),
                disabled: self.is_disabled(&rule.site_key),
            };
        }

        Route {
            url: url.to_string(),
            site_key: OTHER_SITE.to_string(),
            disabled: self.is_disabled(OTHER_SITE),
        }
    }
}

impl Default for SiteRouter {
    fn default() -> Self {
        Self::new(Self::default_rules())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(url: &str) -> Route {
        SiteRouter::default().route(url)
    }

    #[test]
    fn test_ffnet_gets_www_prefix() {
        let r = route("https://m.fanfiction.net/s/12345/3/Some-Story");
        assert_eq!(r.site_key, "ffnet");
        assert_eq!(r.url, "www.fanfiction.net/s/12345/");
        assert!(!r.disabled);
    }

    #[test]
    fn test_ao3_strips_chapter_suffix() {
        let r = route("https://archiveofourown.org/works/987/chapters/111");
        assert_eq!(r.site_key, "ao3");
        assert_eq!(r.url, "archiveofourown.org/works/987");
    }

    #[test]
    fn test_known_sites() {
        let cases = [
            ("https://www.fictionpress.com/s/42/1/", "fictionpress", "fictionpress.com/s/42"),
            (
                "https://www.royalroad.com/fiction/555/a-title",
                "royalroad",
                "royalroad.com/fiction/555",
            ),
            (
                "https://forums.sufficientvelocity.com/threads/a-quest.1234/page-2",
                "sv",
                "forums.sufficientvelocity.com/threads/a-quest.1234",
            ),
            (
                "https://forums.spacebattles.com/threads/story.77/",
                "sb",
                "forums.spacebattles.com/threads/story.77",
            ),
            (
                "https://forum.questionablequesting.com/threads/qq-story.9",
                "qq",
                "forum.questionablequesting.com/threads/qq-story.9",
            ),
        ];
        for (input, key, url) in cases {
            let r = route(input);
            assert_eq!(r.site_key, key, "key for {}", input);
            assert_eq!(r.url, url, "url for {}", input);
        }
    }

    #[test]
    fn test_unknown_http_url_goes_to_other() {
        let r = route("https://example.com/story/1");
        assert_eq!(r.site_key, OTHER_SITE);
        assert_eq!(r.url, "example.com/story/1");
    }

    #[test]
    fn test_unmatched_string_is_returned_unchanged() {
        let r = route("not a url at all");
        assert_eq!(r.site_key, OTHER_SITE);
        assert_eq!(r.url, "not a url at all");
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            SiteRule::new("first", r"example\.com/(\d+)", "a/").unwrap(),
            SiteRule::new("second", r"example\.com/(.*)", "b/").unwrap(),
        ];
        let r = SiteRouter::new(rules).route("https://example.com/12");
        assert_eq!(r.site_key, "first");
        assert_eq!(r.url, "a/12");
    }

    #[test]
    fn test_disabled_site_is_flagged() {
        let router = SiteRouter::default().with_disabled_sites([FFNET_SITE]);
        let r = router.route("https://www.fanfiction.net/s/1/1/");
        assert!(r.disabled);
        assert!(!router.route("https://archiveofourown.org/works/1").disabled);
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        assert!(SiteRule::new("broken", r"(unclosed", "").is_err());
    }

    #[test]
    fn test_default_rule_order() {
        let keys: Vec<_> = SiteRouter::default_rules()
            .into_iter()
            .map(|r| r.site_key)
            .collect();
        assert_eq!(
            keys,
            ["ffnet", "ao3", "fictionpress", "royalroad", "sv", "sb", "qq", "other"]
        );
    }
}
