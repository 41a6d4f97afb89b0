//! Public suffix list matching.
//!
//! Implements the publicsuffix.org algorithm over normal, wildcard (`*.`),
//! and exception (`!`) rules. A built-in rule set covers the common public
//! suffixes; deployments serving names under exotic suffixes load the full
//! `public_suffix_list.dat` at startup.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Rule kinds from the public suffix list format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    /// Plain suffix rule.
    Normal,
    /// `*.suffix`: one arbitrary label below the suffix.
    Wildcard,
    /// `!suffix`: cancels a wildcard rule.
    Exception,
}

/// A compiled public suffix list.
#[derive(Debug)]
pub struct PublicSuffixList {
    /// Rules keyed by their suffix text (wildcard rules keyed by the parent,
    /// exception rules by the full name without `!`).
    rules: HashMap<String, RuleKind>,
}

/// The parts of a name relative to its registrable domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    /// The public suffix, e.g. `co.uk`.
    pub etld: String,
    /// The registrable domain, e.g. `example.co.uk`.
    pub apex: String,
    /// Labels left of the apex, left-to-right.
    pub labels: Vec<String>,
}

/// Built-in suffix rules: the ICANN TLDs and multi-label suffixes that show
/// up in practice, plus the classic `*.ck` wildcard pair as rule-format
/// coverage. Unlisted TLDs fall back to the last label, which is also the
/// correct behavior for private namespaces like `.internal`.
const DEFAULT_RULES: &[&str] = &[
    "com", "net", "org", "edu", "gov", "mil", "int", "info", "biz", "name", "dev", "app", "io",
    "co", "me", "tv", "cc", "us", "ca", "mx", "br", "ar", "cl", "de", "fr", "nl", "be", "ch",
    "at", "it", "es", "pt", "se", "no", "dk", "fi", "pl", "cz", "ru", "ua", "jp", "cn", "kr",
    "in", "sg", "hk", "tw", "au", "nz", "za", "eu", "uk", "ie", "xyz", "cloud", "online", "site",
    "co.uk", "org.uk", "ac.uk", "gov.uk", "net.uk", "me.uk",
    "com.au", "net.au", "org.au", "edu.au", "gov.au",
    "co.jp", "ne.jp", "or.jp", "ac.jp", "go.jp",
    "com.br", "net.br", "org.br",
    "co.nz", "net.nz", "org.nz",
    "co.za", "org.za",
    "co.in", "net.in", "org.in",
    "com.cn", "net.cn", "org.cn",
    "com.mx", "com.ar", "com.sg", "com.hk", "com.tw",
    "github.io", "gitlab.io", "herokuapp.com", "netlify.app", "vercel.app", "pages.dev",
    "s3.amazonaws.com", "cloudfront.net", "azurewebsites.net", "appspot.com", "web.app",
    "firebaseapp.com", "workers.dev", "fly.dev", "onrender.com",
    "ck", "*.ck", "!www.ck",
];

impl PublicSuffixList {
    /// Compiles the built-in rule set.
    pub fn builtin() -> Self {
        Self::from_rules(DEFAULT_RULES.iter().copied())
    }

    /// Loads rules in `public_suffix_list.dat` format from a file.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::from_reader(file))
    }

    /// Loads rules in `public_suffix_list.dat` format from a reader.
    /// Comment lines (`//`) and blanks are skipped.
    pub fn from_reader(reader: impl Read) -> Self {
        let lines = BufReader::new(reader)
            .lines()
            .map_while(|l| l.ok())
            .collect::<Vec<_>>();
        Self::from_rules(lines.iter().map(|s| s.as_str()))
    }

    fn from_rules<'a>(rules: impl Iterator<Item = &'a str>) -> Self {
        let mut map = HashMap::new();
        for line in rules {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let line = line.to_ascii_lowercase();
            if let Some(rest) = line.strip_prefix('!') {
                map.insert(rest.to_string(), RuleKind::Exception);
            } else if let Some(rest) = line.strip_prefix("*.") {
                // Keyed by the parent; wildcard extends it by one label.
                map.entry(rest.to_string())
                    .and_modify(|k| {
                        if *k == RuleKind::Normal {
                            *k = RuleKind::Wildcard;
                        }
                    })
                    .or_insert(RuleKind::Wildcard);
            } else {
                map.entry(line).or_insert(RuleKind::Normal);
            }
        }
        Self { rules: map }
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if no rules are loaded.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the number of labels in the public suffix of `labels`
    /// (left-to-right label order).
    fn suffix_label_count(&self, labels: &[&str]) -> usize {
        let n = labels.len();
        let mut best = 1;

        for start in 0..n {
            let candidate = labels[start..].join(".");
            match self.rules.get(&candidate) {
                Some(RuleKind::Exception) => {
                    // Exception truncates the wildcard it cancels.
                    return n - start - 1;
                }
                Some(RuleKind::Normal) => {
                    best = best.max(n - start);
                }
                Some(RuleKind::Wildcard) => {
                    // "*.candidate": one extra label left of the candidate.
                    best = best.max(n - start);
                    if start > 0 {
                        best = best.max(n - start + 1);
                    }
                }
                None => {}
            }
        }

        best.min(n)
    }

    /// Splits a normalized name into (etld, apex, subdomain labels).
    ///
    /// Returns `None` when the name has no registrable domain (it is itself
    /// a public suffix or shorter).
    pub fn split(&self, name: &str) -> Option<NameParts> {
        let name = loam_model::normalize_name(name);
        if name.is_empty() {
            return None;
        }
        let labels: Vec<&str> = name.split('.').collect();
        let suffix_len = self.suffix_label_count(&labels);
        if labels.len() <= suffix_len {
            // The name is the suffix itself; nothing registrable.
            return None;
        }

        let etld = labels[labels.len() - suffix_len..].join(".");
        let apex = labels[labels.len() - suffix_len - 1..].join(".");
        let sub = labels[..labels.len() - suffix_len - 1]
            .iter()
            .map(|s| s.to_string())
            .collect();

        Some(NameParts {
            etld,
            apex,
            labels: sub,
        })
    }
}

impl Default for PublicSuffixList {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tld() {
        let psl = PublicSuffixList::builtin();
        let parts = psl.split("api.service.example.com").unwrap();
        assert_eq!(parts.etld, "com");
        assert_eq!(parts.apex, "example.com");
        assert_eq!(parts.labels, vec!["api", "service"]);
    }

    #[test]
    fn test_multi_label_suffix() {
        let psl = PublicSuffixList::builtin();
        let parts = psl.split("api.prod.example.co.uk").unwrap();
        assert_eq!(parts.etld, "co.uk");
        assert_eq!(parts.apex, "example.co.uk");
        assert_eq!(parts.labels, vec!["api", "prod"]);
    }

    #[test]
    fn test_private_suffix() {
        let psl = PublicSuffixList::builtin();
        let parts = psl.split("v1.user.github.io").unwrap();
        assert_eq!(parts.etld, "github.io");
        assert_eq!(parts.apex, "user.github.io");
        assert_eq!(parts.labels, vec!["v1"]);
    }

    #[test]
    fn test_unlisted_tld_falls_back() {
        let psl = PublicSuffixList::builtin();
        let parts = psl.split("www.test.internal").unwrap();
        assert_eq!(parts.etld, "internal");
        assert_eq!(parts.apex, "test.internal");
        assert_eq!(parts.labels, vec!["www"]);
    }

    #[test]
    fn test_apex_has_no_labels() {
        let psl = PublicSuffixList::builtin();
        let parts = psl.split("example.com").unwrap();
        assert_eq!(parts.apex, "example.com");
        assert!(parts.labels.is_empty());
    }

    #[test]
    fn test_bare_suffix_not_registrable() {
        let psl = PublicSuffixList::builtin();
        assert!(psl.split("com").is_none());
        assert!(psl.split("co.uk").is_none());
    }

    #[test]
    fn test_wildcard_and_exception_rules() {
        let psl = PublicSuffixList::builtin();
        // *.ck: "anything.ck" is a public suffix.
        let parts = psl.split("shop.foo.ck").unwrap();
        assert_eq!(parts.etld, "foo.ck");
        assert_eq!(parts.apex, "shop.foo.ck");
        // !www.ck: www.ck is registrable.
        let parts = psl.split("www.ck").unwrap();
        assert_eq!(parts.apex, "www.ck");
        assert_eq!(parts.etld, "ck");
    }

    #[test]
    fn test_case_and_trailing_dot() {
        let psl = PublicSuffixList::builtin();
        let parts = psl.split("API.Service.Example.COM.").unwrap();
        assert_eq!(parts.labels, vec!["api", "service"]);
    }

    #[test]
    fn test_from_reader() {
        let data = "// comment\ncom\nexample.test\n";
        let psl = PublicSuffixList::from_reader(data.as_bytes());
        let parts = psl.split("www.foo.example.test").unwrap();
        assert_eq!(parts.etld, "example.test");
        assert_eq!(parts.apex, "foo.example.test");
        assert_eq!(parts.labels, vec!["www"]);
    }
}
