use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How much of an answer the tutor is allowed to reveal in a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportMode {
    #[default]
    Hint,
    Guide,
    Solution,
    Check,
}

impl SupportMode {
    pub const ALL: [SupportMode; 4] = [
        SupportMode::Hint,
        SupportMode::Guide,
        SupportMode::Solution,
        SupportMode::Check,
    ];

    pub fn id(self) -> &'static str {
        match self {
            SupportMode::Hint => "hint",
            SupportMode::Guide => "guide",
            SupportMode::Solution => "solution",
            SupportMode::Check => "check",
        }
    }

    /// Machine-readable marker embedded in every outgoing turn.
    pub fn marker(self) -> String {
        self.id().to_ascii_uppercase()
    }

    pub fn label(self) -> &'static str {
        match self {
            SupportMode::Hint => "Hint only",
            SupportMode::Guide => "Step-by-step guidance",
            SupportMode::Solution => "Full explanation",
            SupportMode::Check => "Check my answer",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SupportMode::Hint => "A small nudge toward the next step, no final answer.",
            SupportMode::Guide => "Walks through the method one step at a time.",
            SupportMode::Solution => "Complete worked solution with reasoning.",
            SupportMode::Check => "Reviews the student's own answer and points out mistakes.",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let mode = match normalized.as_str() {
            "hint" | "h" | "hint_only" => SupportMode::Hint,
            "guide" | "g" | "step" | "steps" | "step_by_step" => SupportMode::Guide,
            "solution" | "s" | "full" | "explain" | "explanation" => SupportMode::Solution,
            "check" | "c" | "verify" | "review" => SupportMode::Check,
            _ => return None,
        };
        Some(mode)
    }
}

impl fmt::Display for SupportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for SupportMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| {
            let known = Self::ALL
                .iter()
                .map(|mode| mode.id())
                .collect::<Vec<&str>>()
                .join(", ");
            format!("Unknown support mode '{}'. Expected one of: {known}.", value.trim())
        })
    }
}
