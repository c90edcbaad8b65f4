// Identity types for sessions: the (year, event, session type) key and tyre compounds

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::BoxboxError;

/// Type of an F1 session within a race weekend
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum SessionKind {
    Practice1,
    Practice2,
    Practice3,
    SprintQualifying,
    Sprint,
    Qualifying,
    Race,
}

impl SessionKind {
    pub const ALL: [SessionKind; 7] = [
        SessionKind::Practice1,
        SessionKind::Practice2,
        SessionKind::Practice3,
        SessionKind::SprintQualifying,
        SessionKind::Sprint,
        SessionKind::Qualifying,
        SessionKind::Race,
    ];

    /// Short code used in the UI, the CLI and cache file names
    pub fn code(&self) -> &'static str {
        match self {
            SessionKind::Practice1 => "FP1",
            SessionKind::Practice2 => "FP2",
            SessionKind::Practice3 => "FP3",
            SessionKind::SprintQualifying => "SQ",
            SessionKind::Sprint => "Sprint",
            SessionKind::Qualifying => "Qualifying",
            SessionKind::Race => "Race",
        }
    }

    /// Session names as published by the timing provider. Sprint qualifying
    /// was called "Sprint Shootout" in 2023.
    pub fn provider_names(&self) -> &'static [&'static str] {
        match self {
            SessionKind::Practice1 => &["Practice 1"],
            SessionKind::Practice2 => &["Practice 2"],
            SessionKind::Practice3 => &["Practice 3"],
            SessionKind::SprintQualifying => &["Sprint Qualifying", "Sprint Shootout"],
            SessionKind::Sprint => &["Sprint"],
            SessionKind::Qualifying => &["Qualifying"],
            SessionKind::Race => &["Race"],
        }
    }

    pub fn is_race(&self) -> bool {
        matches!(self, SessionKind::Race | SessionKind::Sprint)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for SessionKind {
    type Err = BoxboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        let kind = match normalized.as_str() {
            "fp1" | "practice 1" | "p1" => SessionKind::Practice1,
            "fp2" | "practice 2" | "p2" => SessionKind::Practice2,
            "fp3" | "practice 3" | "p3" => SessionKind::Practice3,
            "sq" | "sprint qualifying" | "sprint shootout" | "ss" => {
                SessionKind::SprintQualifying
            }
            "s" | "sprint" | "sprint race" => SessionKind::Sprint,
            "q" | "quali" | "qualifying" => SessionKind::Qualifying,
            "r" | "race" | "grand prix" => SessionKind::Race,
            _ => {
                return Err(BoxboxError::InvalidUserInput {
                    field: "session".to_string(),
                    reason: format!("unknown session type '{}'", s),
                });
            }
        };
        Ok(kind)
    }
}

/// Identity of a loaded session
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionKey {
    pub year: i32,
    /// Event name as listed in the season calendar, e.g. "Bahrain Grand Prix"
    pub event: String,
    pub kind: SessionKind,
}

impl SessionKey {
    pub fn new(year: i32, event: impl Into<String>, kind: SessionKind) -> Self {
        Self {
            year,
            event: event.into(),
            kind,
        }
    }

    /// Event name reduced to lowercase alphanumerics and underscores so it
    /// can be used as a path component and compared loosely.
    pub fn normalized_event(&self) -> String {
        normalize_name(&self.event)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.year, self.event, self.kind)
    }
}

pub(crate) fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            normalized.push(c);
        } else if !normalized.ends_with('_') {
            normalized.push('_');
        }
    }
    normalized.trim_matches('_').to_string()
}

/// Tyre compound fitted for a lap
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Default)]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
    #[default]
    Unknown,
}

impl Compound {
    pub const ALL: [Compound; 6] = [
        Compound::Soft,
        Compound::Medium,
        Compound::Hard,
        Compound::Intermediate,
        Compound::Wet,
        Compound::Unknown,
    ];

    /// Parse the provider's compound label. Anything unrecognised (including
    /// "TEST_UNKNOWN" and the pre-2019 hypersoft family) maps to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "SOFT" | "S" => Compound::Soft,
            "MEDIUM" | "M" => Compound::Medium,
            "HARD" | "H" => Compound::Hard,
            "INTERMEDIATE" | "I" | "INTER" => Compound::Intermediate,
            "WET" | "W" => Compound::Wet,
            _ => Compound::Unknown,
        }
    }

    pub fn is_slick(&self) -> bool {
        matches!(self, Compound::Soft | Compound::Medium | Compound::Hard)
    }

    /// Conventional broadcast colour, as RGB
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Compound::Soft => (218, 41, 28),
            Compound::Medium => (255, 210, 0),
            Compound::Hard => (240, 240, 236),
            Compound::Intermediate => (67, 176, 42),
            Compound::Wet => (0, 103, 173),
            Compound::Unknown => (128, 128, 128),
        }
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compound::Soft => write!(f, "Soft"),
            Compound::Medium => write!(f, "Medium"),
            Compound::Hard => write!(f, "Hard"),
            Compound::Intermediate => write!(f, "Intermediate"),
            Compound::Wet => write!(f, "Wet"),
            Compound::Unknown => write!(f, "Unknown"),
        }
    }
}
