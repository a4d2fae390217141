use regex::{Regex, RegexBuilder};
use url::Url;

/// Compiled blacklist, built once per document before any scanning runs.
/// Each pattern is either a literal matched as a substring of the page URL
/// or, when written `/body/flags`, a regular expression. Patterns are
/// tested against the full URL and against the bare host, so an anchored
/// regex like `/^x\.com/` still hits `https://x.com/...`. A pattern that
/// fails to compile never matches; one bad line must not disable the rest.
pub struct LocationMatcher {
    patterns: Vec<CompiledPattern>,
}

enum CompiledPattern {
    Literal(String),
    Regex(Regex),
}

impl LocationMatcher {
    pub fn new(patterns: &[String]) -> Self {
        let mut compiled = Vec::new();
        for raw in patterns {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('/') {
                match compile_regex_pattern(trimmed) {
                    Some(regex) => compiled.push(CompiledPattern::Regex(regex)),
                    None => log::warn!("Skipping malformed blacklist pattern {:?}", trimmed),
                }
            } else {
                compiled.push(CompiledPattern::Literal(trimmed.to_string()));
            }
        }
        LocationMatcher { patterns: compiled }
    }

    /// OR across patterns, first match wins.
    pub fn matches(&self, url: &str) -> bool {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        let host = host.as_deref();
        self.patterns.iter().any(|pattern| match pattern {
            CompiledPattern::Literal(needle) => {
                url.contains(needle.as_str()) || host.is_some_and(|h| h.contains(needle.as_str()))
            }
            CompiledPattern::Regex(regex) => {
                regex.is_match(url) || host.is_some_and(|h| regex.is_match(h))
            }
        })
    }
}

pub fn is_excluded(url: &str, patterns: &[String]) -> bool {
    LocationMatcher::new(patterns).matches(url)
}

/// Parses `/body/flags`. Flags `i`, `m`, `s` are honored; `g`, `u`, `y`
/// exist in other regex dialects but have no meaning here and are
/// accepted silently. Anything else marks the pattern malformed.
fn compile_regex_pattern(raw: &str) -> Option<Regex> {
    let rest = &raw[1..];
    let close = rest.rfind('/')?;
    let body = &rest[..close];
    let flags = &rest[close + 1..];
    if body.is_empty() {
        return None;
    }

    let mut builder = RegexBuilder::new(body);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'g' | 'u' | 'y' => {}
            _ => return None,
        }
    }
    builder.build().ok()
}
