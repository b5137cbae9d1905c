//! robots.txt parsing and matching
//!
//! Implements the de-facto specification: user-agent groups, Allow and
//! Disallow rules with `*` wildcards and `$` end anchors, longest-match
//! precedence with Allow winning ties. Unknown directives (Crawl-delay,
//! Sitemap, ...) are ignored. A missing or unfetchable robots.txt is
//! treated as allow-all by the caller.

/// One Allow/Disallow rule
#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    pattern: String,
}

/// One user-agent group
#[derive(Debug, Clone)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// Parsed robots.txt rules for one host
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    groups: Vec<Group>,
}

impl RobotsTxt {
    /// Rules that allow everything (used when robots.txt is absent)
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse a robots.txt body; never fails - unparseable lines are
    /// skipped
    pub fn parse(body: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<Group> = None;
        // Consecutive User-agent lines share the following rule block
        let mut agents_open = false;

        for raw_line in body.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if agents_open {
                        if let Some(group) = current.as_mut() {
                            group.agents.push(value.to_ascii_lowercase());
                        }
                    } else {
                        if let Some(group) = current.take() {
                            groups.push(group);
                        }
                        current = Some(Group {
                            agents: vec![value.to_ascii_lowercase()],
                            rules: Vec::new(),
                        });
                        agents_open = true;
                    }
                }
                "allow" | "disallow" => {
                    agents_open = false;
                    if let Some(group) = current.as_mut() {
                        group.rules.push(Rule {
                            allow: directive == "allow",
                            pattern: value.to_string(),
                        });
                    }
                }
                _ => {
                    agents_open = false;
                }
            }
        }
        if let Some(group) = current.take() {
            groups.push(group);
        }

        Self { groups }
    }

    /// Whether the given user agent may fetch the given path
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        // Longest matching pattern wins; Allow wins ties
        let mut best: Option<(usize, bool)> = None;
        for rule in &group.rules {
            if rule.pattern.is_empty() {
                // "Disallow:" with no value allows everything
                continue;
            }
            if pattern_matches(&rule.pattern, path) {
                let specificity = rule.pattern.len();
                let better = match best {
                    None => true,
                    Some((best_len, best_allow)) => {
                        specificity > best_len || (specificity == best_len && rule.allow && !best_allow)
                    }
                };
                if better {
                    best = Some((specificity, rule.allow));
                }
            }
        }
        best.is_none_or(|(_, allow)| allow)
    }

    /// Most specific group for a user agent: the longest agent token
    /// contained in the UA string, with `*` as the fallback
    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let ua = user_agent.to_ascii_lowercase();
        let mut best: Option<(usize, &Group)> = None;
        for group in &self.groups {
            for agent in &group.agents {
                let specificity = if agent == "*" {
                    Some(0)
                } else if ua.contains(agent.as_str()) {
                    Some(agent.len())
                } else {
                    None
                };
                if let Some(specificity) = specificity {
                    let better = best.is_none_or(|(best_len, _)| specificity > best_len);
                    if better {
                        best = Some((specificity, group));
                    }
                }
            }
        }
        best.map(|(_, group)| group)
    }
}

/// Match a robots pattern against a path: anchored at the start, `*`
/// matches any run, `$` anchors the end
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = pattern
        .strip_suffix('$')
        .map_or((pattern, false), |stripped| (stripped, true));

    fn helper(pattern: &[u8], path: &[u8], anchored: bool) -> bool {
        match pattern.split_first() {
            None => !anchored || path.is_empty(),
            Some((b'*', rest)) => {
                (0..=path.len()).any(|skip| helper(rest, path.get(skip..).unwrap_or_default(), anchored))
            }
            Some((ch, rest)) => path
                .split_first()
                .is_some_and(|(first, tail)| first == ch && helper(rest, tail, anchored)),
        }
    }

    helper(pattern.as_bytes(), path.as_bytes(), anchored)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r"
# sample policy
User-agent: *
Disallow: /admin
Disallow: /private/
Allow: /private/public-report

User-agent: docflow-ingest
Disallow: /beta

User-agent: badbot
Disallow: /
";

    #[test]
    fn wildcard_group_applies_to_unknown_agents() {
        let robots = RobotsTxt::parse(BODY);
        assert!(!robots.is_allowed("somebot/1.0", "/admin"));
        assert!(!robots.is_allowed("somebot/1.0", "/admin/settings"));
        assert!(robots.is_allowed("somebot/1.0", "/blog/post"));
    }

    #[test]
    fn allow_overrides_broader_disallow() {
        let robots = RobotsTxt::parse(BODY);
        assert!(!robots.is_allowed("somebot/1.0", "/private/else"));
        assert!(robots.is_allowed("somebot/1.0", "/private/public-report"));
    }

    #[test]
    fn specific_agent_group_wins_over_wildcard() {
        let robots = RobotsTxt::parse(BODY);
        // The specific group has no /admin rule, so /admin is allowed
        assert!(robots.is_allowed("docflow-ingest/0.3 (+https://example)", "/admin"));
        assert!(!robots.is_allowed("docflow-ingest/0.3 (+https://example)", "/beta"));
    }

    #[test]
    fn disallow_everything() {
        let robots = RobotsTxt::parse(BODY);
        assert!(!robots.is_allowed("badbot", "/"));
        assert!(!robots.is_allowed("badbot", "/anything"));
    }

    #[test]
    fn empty_disallow_allows_all() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow:\n");
        assert!(robots.is_allowed("anybot", "/anything"));
    }

    #[test]
    fn wildcards_and_anchors() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /*.pdf$\nDisallow: /tmp*/");
        assert!(!robots.is_allowed("bot", "/files/report.pdf"));
        assert!(robots.is_allowed("bot", "/files/report.pdf.html"));
        assert!(!robots.is_allowed("bot", "/tmp123/file"));
        assert!(robots.is_allowed("bot", "/temporary"));
    }

    #[test]
    fn missing_robots_allows_everything() {
        let robots = RobotsTxt::allow_all();
        assert!(robots.is_allowed("anybot", "/admin"));
    }

    #[test]
    fn shared_rule_block_for_consecutive_agents() {
        let robots = RobotsTxt::parse("User-agent: a\nUser-agent: b\nDisallow: /x\n");
        assert!(!robots.is_allowed("a", "/x"));
        assert!(!robots.is_allowed("b", "/x"));
        assert!(robots.is_allowed("c", "/x"));
    }
}
