//! Agent descriptors and trigger predicates.
//!
//! Descriptors are loaded once at startup from external configuration
//! and are immutable for the lifetime of the run. Predicate evaluation
//! is pure: the glob patterns are compiled up front and `PredicateMatcher`
//! holds no mutable state.

use crate::error::{Result, VigilError};
use crate::event::{EventKind, TriggerEvent};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Priority tier for an agent. Static per descriptor.
///
/// Ordering is a total order used for slot arbitration:
/// manual/user-initiated work outranks structural validation, which
/// outranks routine background analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    #[default]
    Routine,
    Structural,
    Manual,
}

/// Matching rules deciding whether an event triggers an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerPredicate {
    /// Glob-style include patterns for the resource key.
    /// Empty means "match everything".
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob-style exclude patterns. Exclusion wins over inclusion.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Maximum payload size in bytes.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Debounce window for edit events, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Project-type markers this agent applies to. Empty means "any".
    #[serde(default)]
    pub project_types: Vec<String>,

    /// Only user-initiated requests trigger this agent; edit events
    /// never do, regardless of patterns.
    #[serde(default)]
    pub manual_only: bool,
}

fn default_max_payload_bytes() -> usize {
    50 * 1024
}

fn default_debounce_ms() -> u64 {
    2000
}

impl Default for TriggerPredicate {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            max_payload_bytes: default_max_payload_bytes(),
            debounce_ms: default_debounce_ms(),
            project_types: Vec::new(),
            manual_only: false,
        }
    }
}

impl TriggerPredicate {
    /// Compile the glob patterns. Fails with `ConfigurationInvalid` if a
    /// pattern cannot be compiled.
    pub fn compile(&self, agent_id: &str) -> Result<PredicateMatcher> {
        let compile_all = |patterns: &[String]| -> Result<Vec<Glob>> {
            patterns
                .iter()
                .map(|p| {
                    Glob::new(p).map_err(|e| {
                        VigilError::ConfigurationInvalid(format!(
                            "agent '{}': bad pattern '{}': {}",
                            agent_id, p, e
                        ))
                    })
                })
                .collect()
        };

        Ok(PredicateMatcher {
            include: compile_all(&self.include)?,
            exclude: compile_all(&self.exclude)?,
            max_payload_bytes: self.max_payload_bytes,
            project_types: self.project_types.clone(),
            manual_only: self.manual_only,
        })
    }
}

/// A configured agent. The runtime invokes its capability on the shared
/// server; the analysis itself is opaque to Vigil.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,

    #[serde(default)]
    pub priority: PriorityTier,

    /// Capability name invoked on the remote server.
    pub capability: String,

    #[serde(default)]
    pub trigger: TriggerPredicate,

    /// Whether other agents may hold a slot for the same resource while
    /// this agent is running.
    #[serde(default)]
    pub allow_concurrent: bool,

    /// Static text returned to the host when the server is unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// Compiled, immutable form of a [`TriggerPredicate`].
#[derive(Debug)]
pub struct PredicateMatcher {
    include: Vec<Glob>,
    exclude: Vec<Glob>,
    max_payload_bytes: usize,
    project_types: Vec<String>,
    manual_only: bool,
}

impl PredicateMatcher {
    /// Decide whether `event` should trigger the agent.
    ///
    /// Manual events bypass pattern and project-type checks but still
    /// respect the payload size limit.
    pub fn admits(&self, event: &TriggerEvent) -> bool {
        if event.payload_size() > self.max_payload_bytes {
            return false;
        }

        if event.kind == EventKind::Manual {
            return true;
        }

        if self.manual_only {
            return false;
        }

        if !self.project_types.is_empty() {
            match event.project.project_type.as_deref() {
                Some(marker) if self.project_types.iter().any(|t| t == marker) => {}
                _ => return false,
            }
        }

        if self.exclude.iter().any(|g| g.matches(&event.resource)) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|g| g.matches(&event.resource))
    }
}

/// A single compiled glob pattern.
///
/// Patterns containing a `/` match against the full resource key;
/// bare patterns like `*.rs` match against the final path component.
#[derive(Debug)]
struct Glob {
    regex: Regex,
    full_path: bool,
}

impl Glob {
    fn new(pattern: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(&glob_to_regex(pattern))?,
            full_path: pattern.contains('/'),
        })
    }

    fn matches(&self, resource: &str) -> bool {
        let candidate = if self.full_path {
            resource
        } else {
            resource.rsplit('/').next().unwrap_or(resource)
        };
        self.regex.is_match(candidate)
    }
}

/// Translate a glob pattern into an anchored regex.
///
/// `**/` matches zero or more leading directories, `*` stops at `/`,
/// `?` matches a single non-separator character.
fn glob_to_regex(glob: &str) -> String {
    let mut re = String::with_capacity(glob.len() * 2 + 2);
    re.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(?:.*/)?");
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            '.' | '+' | '(' | ')' | '|' | '^' | '$' | '{' | '}' | '[' | ']' | '\\' => {
                re.push('\\');
                re.push(c);
            }
            _ => re.push(c),
        }
    }
    re.push('$');
    re
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(predicate: TriggerPredicate) -> PredicateMatcher {
        predicate.compile("test-agent").unwrap()
    }

    #[test]
    fn priority_tiers_are_totally_ordered() {
        assert!(PriorityTier::Manual > PriorityTier::Structural);
        assert!(PriorityTier::Structural > PriorityTier::Routine);
        assert_eq!(PriorityTier::default(), PriorityTier::Routine);
    }

    #[test]
    fn bare_pattern_matches_basename() {
        let m = matcher(TriggerPredicate {
            include: vec!["*.rs".into()],
            ..Default::default()
        });
        assert!(m.admits(&TriggerEvent::edit("src/parser.rs", "x")));
        assert!(m.admits(&TriggerEvent::edit("main.rs", "x")));
        assert!(!m.admits(&TriggerEvent::edit("README.md", "x")));
    }

    #[test]
    fn recursive_pattern_matches_nested_paths() {
        let m = matcher(TriggerPredicate {
            include: vec!["src/**/*.rs".into()],
            ..Default::default()
        });
        assert!(m.admits(&TriggerEvent::edit("src/a/b/mod.rs", "x")));
        assert!(m.admits(&TriggerEvent::edit("src/lib.rs", "x")));
        assert!(!m.admits(&TriggerEvent::edit("tests/lib.rs", "x")));
    }

    #[test]
    fn exclude_wins_over_include() {
        let m = matcher(TriggerPredicate {
            include: vec!["*.rs".into()],
            exclude: vec!["target/**".into()],
            ..Default::default()
        });
        assert!(!m.admits(&TriggerEvent::edit("target/debug/build.rs", "x")));
        assert!(m.admits(&TriggerEvent::edit("src/build.rs", "x")));
    }

    #[test]
    fn size_limit_applies_to_all_events() {
        let m = matcher(TriggerPredicate {
            max_payload_bytes: 8,
            ..Default::default()
        });
        assert!(!m.admits(&TriggerEvent::edit("a.rs", "123456789")));
        assert!(!m.admits(&TriggerEvent::manual("a.rs", "123456789")));
        assert!(m.admits(&TriggerEvent::manual("a.rs", "1234")));
    }

    #[test]
    fn manual_bypasses_patterns_and_project_type() {
        let m = matcher(TriggerPredicate {
            include: vec!["*.rs".into()],
            exclude: vec!["docs/**".into()],
            project_types: vec!["adk".into()],
            ..Default::default()
        });
        // Fails every non-size check, but is manual.
        assert!(m.admits(&TriggerEvent::manual("docs/guide.md", "x")));
        // Same resource as an edit is filtered out.
        assert!(!m.admits(&TriggerEvent::edit("docs/guide.md", "x")));
    }

    #[test]
    fn project_type_marker_is_required_when_configured() {
        let m = matcher(TriggerPredicate {
            project_types: vec!["adk".into()],
            ..Default::default()
        });
        assert!(!m.admits(&TriggerEvent::edit("a.rs", "x")));
        assert!(m.admits(&TriggerEvent::edit("a.rs", "x").with_project_type("adk")));
        assert!(!m.admits(&TriggerEvent::edit("a.rs", "x").with_project_type("other")));
    }

    #[test]
    fn manual_only_agents_ignore_edits() {
        let m = matcher(TriggerPredicate {
            manual_only: true,
            ..Default::default()
        });
        assert!(!m.admits(&TriggerEvent::edit("a.rs", "x")));
        assert!(m.admits(&TriggerEvent::manual("a.rs", "x")));
    }

    #[test]
    fn question_mark_matches_one_character() {
        let m = matcher(TriggerPredicate {
            include: vec!["mod?.rs".into()],
            ..Default::default()
        });
        assert!(m.admits(&TriggerEvent::edit("mod1.rs", "x")));
        assert!(!m.admits(&TriggerEvent::edit("mod.rs", "x")));
        assert!(!m.admits(&TriggerEvent::edit("mod12.rs", "x")));
    }

    #[test]
    fn literal_dots_are_not_wildcards() {
        let m = matcher(TriggerPredicate {
            include: vec!["*.rs".into()],
            ..Default::default()
        });
        assert!(!m.admits(&TriggerEvent::edit("parserXrs", "x")));
    }
}
