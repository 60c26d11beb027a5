//! Evaluator verdict parsing.
//!
//! Every rule fails closed: empty, garbled or ambiguous evaluator output is a
//! `false` verdict, never an error and never a pass.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How raw evaluator text maps to a pass/fail verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictRule {
    /// `true` anywhere in the response, case-insensitive.
    #[default]
    Substring,
    /// The first non-empty line is `true`, ignoring trailing `.` or `!`.
    FirstLine,
    /// The whole trimmed response is `true`.
    Strict,
}

impl VerdictRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictRule::Substring => "substring",
            VerdictRule::FirstLine => "first_line",
            VerdictRule::Strict => "strict",
        }
    }

    pub fn parse_verdict(&self, raw: &str) -> bool {
        let normalized = raw.trim();
        match self {
            VerdictRule::Substring => normalized.to_ascii_lowercase().contains("true"),
            VerdictRule::FirstLine => normalized
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(|line| line.trim_end_matches(['.', '!']).trim())
                .is_some_and(|line| line.eq_ignore_ascii_case("true")),
            VerdictRule::Strict => normalized.eq_ignore_ascii_case("true"),
        }
    }
}

impl fmt::Display for VerdictRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerdictRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "substring" => Ok(VerdictRule::Substring),
            "first_line" => Ok(VerdictRule::FirstLine),
            "strict" => Ok(VerdictRule::Strict),
            other => Err(format!(
                "unknown verdict rule '{}' (expected substring, first_line or strict)",
                other
            )),
        }
    }
}
