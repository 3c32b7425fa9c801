use std::fmt;

use serde::{Deserialize, Serialize};

/// Status is an observer's judgment about a subject.
/// Values match the DeepHealth protocol enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Status {
    Invalid = 0,
    Healthy = 1,
    MaybeUnhealthy = 2,
    Unhealthy = 3,
    Dying = 4,
}

impl Status {
    /// Returns the canonical label used in logs, metrics, and report files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Healthy => "healthy",
            Self::MaybeUnhealthy => "maybe_unhealthy",
            Self::Unhealthy => "unhealthy",
            Self::Dying => "dying",
        }
    }

    /// Convert from the raw protocol value.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Invalid),
            1 => Some(Self::Healthy),
            2 => Some(Self::MaybeUnhealthy),
            3 => Some(Self::Unhealthy),
            4 => Some(Self::Dying),
            _ => None,
        }
    }

    /// Convert from the canonical label.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "invalid" => Some(Self::Invalid),
            "healthy" => Some(Self::Healthy),
            "maybe_unhealthy" => Some(Self::MaybeUnhealthy),
            "unhealthy" => Some(Self::Unhealthy),
            "dying" => Some(Self::Dying),
            _ => None,
        }
    }

    /// Return all statuses in numeric order.
    pub fn all() -> &'static [Self] {
        &[
            Self::Invalid,
            Self::Healthy,
            Self::MaybeUnhealthy,
            Self::Unhealthy,
            Self::Dying,
        ]
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
