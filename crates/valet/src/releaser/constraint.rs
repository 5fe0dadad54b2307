//! Version range constraints read from `filter.valet.io/chart` annotations.
//!
//! The accepted grammar is the one chart authors already write in Helm
//! values: comparators separated by spaces or commas are AND-ed, `||`
//! separates alternatives, `a - b` is an inclusive range, a bare version is
//! an exact match, and `!=` excludes a single version.

use semver::{Comparator, Op, Prerelease, Version, VersionReq};
use thiserror::Error;

/// Errors produced while parsing a constraint expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("Invalid version constraint '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
}

/// A parsed version range predicate.
#[derive(Debug, Clone)]
pub struct Constraint {
    expression: String,
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone)]
struct Alternative {
    requirement: VersionReq,
    excluded: Vec<Version>,
}

impl Alternative {
    fn matches(&self, version: &Version) -> bool {
        self.requirement.matches(version) && !self.excluded.contains(version)
    }
}

impl Default for Constraint {
    /// Accepts every release version, `>=0.0.0`.
    fn default() -> Self {
        Self {
            expression: ">=0.0.0".to_string(),
            alternatives: vec![Alternative {
                requirement: VersionReq {
                    comparators: vec![Comparator {
                        op: Op::GreaterEq,
                        major: 0,
                        minor: Some(0),
                        patch: Some(0),
                        pre: Prerelease::EMPTY,
                    }],
                },
                excluded: Vec::new(),
            }],
        }
    }
}

impl Constraint {
    /// Parses a constraint expression such as `>=1.2.0 <2.0.0`.
    pub fn parse(expression: &str) -> Result<Self, ConstraintError> {
        let invalid = |reason: String| ConstraintError::InvalidExpression {
            expression: expression.to_string(),
            reason,
        };

        if expression.trim().is_empty() {
            return Err(invalid("empty expression".to_string()));
        }

        let mut alternatives = Vec::new();
        for part in expression.split("||") {
            alternatives.push(parse_alternative(part).map_err(invalid)?);
        }

        Ok(Self {
            expression: expression.trim().to_string(),
            alternatives,
        })
    }

    /// Returns true when `version` satisfies the constraint.
    pub fn check(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|alt| alt.matches(version))
    }

    /// The expression this constraint was parsed from.
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}

fn parse_alternative(part: &str) -> Result<Alternative, String> {
    let tokens: Vec<&str> = part
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err("empty alternative".to_string());
    }

    let mut comparators = Vec::new();
    let mut excluded = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        // Hyphen range: `1.2 - 1.4`
        if tokens.get(i + 1) == Some(&"-") {
            let upper = tokens
                .get(i + 2)
                .ok_or_else(|| format!("range '{} -' has no upper bound", tokens[i]))?;
            comparators.push(format!(">={}", strip_v(tokens[i])));
            comparators.push(format!("<={}", strip_v(upper)));
            i += 3;
            continue;
        }

        let (op, version) = if is_operator(tokens[i]) {
            let version = tokens
                .get(i + 1)
                .ok_or_else(|| format!("operator '{}' has no version", tokens[i]))?;
            i += 2;
            (tokens[i - 2], *version)
        } else {
            let token = tokens[i];
            i += 1;
            split_operator(token)
        };

        let version = strip_v(version);
        match normalize_operator(op)? {
            Some("!=") => {
                let v = parse_version(version).map_err(|e| format!("'{}': {}", version, e))?;
                excluded.push(v);
            }
            Some(op) => comparators.push(format!("{}{}", op, version)),
            None if is_wildcard(version) => comparators.push(version.to_string()),
            None => comparators.push(format!("={}", version)),
        }
    }

    let requirement = if comparators.is_empty() {
        VersionReq::STAR
    } else {
        VersionReq::parse(&comparators.join(", ")).map_err(|e| e.to_string())?
    };

    Ok(Alternative {
        requirement,
        excluded,
    })
}

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '!', '~', '^'];

fn is_operator(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| OPERATOR_CHARS.contains(&c))
}

fn split_operator(token: &str) -> (&str, &str) {
    let at = token
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .unwrap_or(token.len());
    token.split_at(at)
}

/// Maps operator spellings onto the `semver` crate's set. `None` means bare.
fn normalize_operator(op: &str) -> Result<Option<&'static str>, String> {
    Ok(match op {
        "" => None,
        "=" | "==" => Some("="),
        "!=" => Some("!="),
        ">" => Some(">"),
        "<" => Some("<"),
        ">=" | "=>" => Some(">="),
        "<=" | "=<" => Some("<="),
        "~" | "~>" => Some("~"),
        "^" => Some("^"),
        other => return Err(format!("unknown operator '{}'", other)),
    })
}

fn is_wildcard(version: &str) -> bool {
    version
        .split('.')
        .any(|part| matches!(part, "*" | "x" | "X"))
}

fn strip_v(version: &str) -> &str {
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}

/// Parses a version leniently: a leading `v` is ignored and missing minor or
/// patch components default to zero, so `v1.2` reads as `1.2.0`.
pub fn parse_version(input: &str) -> Result<Version, semver::Error> {
    let input = strip_v(input.trim());
    let split_at = input.find(['-', '+']).unwrap_or(input.len());
    let (core, suffix) = input.split_at(split_at);

    let parts = core.split('.').count();
    let all_numeric = core
        .split('.')
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if all_numeric && parts < 3 {
        let padding = ".0".repeat(3 - parts);
        return Version::parse(&format!("{}{}{}", core, padding, suffix));
    }
    Version::parse(input)
}
