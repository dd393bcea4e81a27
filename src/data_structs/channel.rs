use std::fmt::Display;
use std::str::FromStr;

use polars::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::CrosstalkError;

/// One of the four nucleotide detection channels.
///
/// The declaration order is the canonical channel order used for frame
/// columns and for the rows/columns of the mixing matrix.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    A,
    C,
    G,
    T,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::A, Channel::C, Channel::G, Channel::T];

    /// Returns the string representation of the column name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Channel::A => "A",
            Channel::C => "C",
            Channel::G => "G",
            Channel::T => "T",
        }
    }

    /// Position of the channel in the canonical order.
    pub const fn index(&self) -> usize {
        match self {
            Channel::A => 0,
            Channel::C => 1,
            Channel::G => 2,
            Channel::T => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Polars schema of a corrected intensity table.
    pub fn schema() -> Schema {
        Schema::from_iter(
            Self::ALL
                .iter()
                .map(|ch| (PlSmallStr::from(ch.as_str()), DataType::Float64)),
        )
    }

    /// Parses a channel order such as `"AGCT"`. Every channel must appear
    /// exactly once.
    pub fn parse_order(order: &str) -> Result<[Channel; 4], CrosstalkError> {
        let parsed = order
            .chars()
            .map(|c| c.to_string().parse::<Channel>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = [false; 4];
        for ch in parsed.iter() {
            seen[ch.index()] = true;
        }
        if parsed.len() != 4 || !seen.iter().all(|s| *s) {
            return Err(CrosstalkError::Schema(format!(
                "channel order '{}' must name each of A, C, G, T exactly once",
                order
            )));
        }

        Ok([parsed[0], parsed[1], parsed[2], parsed[3]])
    }
}

impl Display for Channel {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = CrosstalkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Channel::A),
            "C" => Ok(Channel::C),
            "G" => Ok(Channel::G),
            "T" => Ok(Channel::T),
            other => {
                Err(CrosstalkError::Schema(format!(
                    "unknown channel label '{}'",
                    other
                )))
            },
        }
    }
}
