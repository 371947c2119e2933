//! Theme buckets and the bilingual trigger dictionary.
//!
//! The dictionary below is the only copy; batch reports, the dashboard
//! filters and ad-hoc analysis all read it through this module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Bumped whenever a trigger list changes.
pub const DICTIONARY_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Theme {
    Pricing,
    Safety,
    Usability,
    Service,
    Reliability,
}

static THEME_TRIGGERS: [(Theme, &[&str]); 5] = [
    (
        Theme::Pricing,
        &["price", "cost", "expensive", "cheap", "fare", "costly", "affordable", "ዋጋ", "ወጪ", "ውድ", "ርካሽ"],
    ),
    (
        Theme::Safety,
        &["safe", "safety", "dangerous", "secure", "risk", "unsafe", "ደህንነት", "አደገኛ", "አስተማማኝ"],
    ),
    (
        Theme::Usability,
        &["app", "interface", "easy", "user", "navigate", "friendly", "bug", "መተግበሪያ", "ቀላል", "ተጠቃሚ"],
    ),
    (
        Theme::Service,
        &["driver", "service", "customer", "support", "staff", "ride", "ነዳይ", "አገልግሎት", "ደንበኛ", "ድጋፍ"],
    ),
    (
        Theme::Reliability,
        &["reliable", "delay", "wait", "time", "late", "prompt", "ታማኝ", "መዘግየት", "ጠብቅ", "ጊዜ"],
    ),
];

impl Theme {
    pub const ALL: [Theme; 5] = [
        Theme::Pricing,
        Theme::Safety,
        Theme::Usability,
        Theme::Service,
        Theme::Reliability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Pricing => "Pricing",
            Theme::Safety => "Safety",
            Theme::Usability => "Usability",
            Theme::Service => "Service",
            Theme::Reliability => "Reliability",
        }
    }

    pub fn triggers(&self) -> &'static [&'static str] {
        THEME_TRIGGERS
            .iter()
            .find(|(theme, _)| theme == self)
            .map(|(_, words)| *words)
            .unwrap_or(&[])
    }

    /// Case-insensitive substring match against any trigger.
    pub fn matches(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.triggers().iter().any(|t| lowered.contains(t))
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Theme::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown theme: {}", s))
    }
}

/// Every theme mapped to the keywords that hit one of its triggers.
/// A keyword may land in several themes or in none.
pub fn group_themes<S: AsRef<str>>(keywords: &[S]) -> BTreeMap<Theme, Vec<String>> {
    Theme::ALL
        .iter()
        .map(|theme| {
            let hits = keywords
                .iter()
                .map(|k| k.as_ref())
                .filter(|k| theme.matches(k))
                .map(|k| k.to_string())
                .collect();
            (*theme, hits)
        })
        .collect()
}

/// Only the themes that received at least one keyword.
pub fn non_empty(grouped: BTreeMap<Theme, Vec<String>>) -> BTreeMap<Theme, Vec<String>> {
    grouped.into_iter().filter(|(_, kws)| !kws.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_pricing_only() {
        let grouped = group_themes(&["cheap fare", "unrelated"]);
        assert_eq!(grouped[&Theme::Pricing], vec!["cheap fare".to_string()]);
        assert!(grouped[&Theme::Service].is_empty());
        assert!(!grouped[&Theme::Safety].contains(&"cheap fare".to_string()));
        assert_eq!(grouped.len(), 5);
    }

    #[test]
    fn test_keyword_in_two_themes() {
        let grouped = group_themes(&["unsafe price"]);
        assert_eq!(grouped[&Theme::Pricing], vec!["unsafe price".to_string()]);
        assert_eq!(grouped[&Theme::Safety], vec!["unsafe price".to_string()]);
    }

    #[test]
    fn test_case_insensitive_and_amharic() {
        let grouped = group_themes(&["Driver", "ዋጋ ውድ"]);
        assert_eq!(grouped[&Theme::Service], vec!["Driver".to_string()]);
        assert_eq!(grouped[&Theme::Pricing], vec!["ዋጋ ውድ".to_string()]);
    }

    #[test]
    fn test_non_empty_filter() {
        let grouped = non_empty(group_themes(&["late driver"]));
        let themes: Vec<Theme> = grouped.keys().copied().collect();
        assert_eq!(themes, vec![Theme::Service, Theme::Reliability]);
    }

    #[test]
    fn test_every_theme_has_triggers() {
        for theme in Theme::ALL {
            assert!(!theme.triggers().is_empty(), "{} has no triggers", theme);
        }
        assert_eq!("safety".parse::<Theme>().unwrap(), Theme::Safety);
        assert!("Speed".parse::<Theme>().is_err());
    }
}
