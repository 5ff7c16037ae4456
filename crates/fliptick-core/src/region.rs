use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream price API region. Each region serves an independent market and
/// has its own base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Americas,
    Asia,
    Europe,
}

impl Region {
    pub const ALL: [Self; 3] = [Self::Americas, Self::Asia, Self::Europe];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Americas => "americas",
            Self::Asia => "asia",
            Self::Europe => "europe",
        }
    }

    pub const fn base_url(self) -> &'static str {
        match self {
            Self::Americas => "https://west.albion-online-data.com",
            Self::Asia => "https://east.albion-online-data.com",
            Self::Europe => "https://europe.albion-online-data.com",
        }
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "americas" => Ok(Self::Americas),
            "asia" => Ok(Self::Asia),
            "europe" => Ok(Self::Europe),
            other => Err(ValidationError::InvalidRegion {
                value: other.to_owned(),
            }),
        }
    }
}
