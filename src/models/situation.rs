//! Conversation situations and the random-course selector.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A concrete role-play situation. Stored on every chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Situation {
    GoShopping,
    TalkWithFriends,
    Travel,
    LearnAlphabet,
    Airport,
}

impl Situation {
    pub const ALL: [Situation; 5] = [
        Situation::GoShopping,
        Situation::TalkWithFriends,
        Situation::Travel,
        Situation::LearnAlphabet,
        Situation::Airport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Situation::GoShopping => "go-shopping",
            Situation::TalkWithFriends => "talk-with-friends",
            Situation::Travel => "travel",
            Situation::LearnAlphabet => "learn-alphabet",
            Situation::Airport => "airport",
        }
    }

    /// Prompt template file for this situation.
    pub fn prompt_file(self) -> &'static str {
        match self {
            Situation::GoShopping => "shopping.txt",
            Situation::TalkWithFriends => "friend.txt",
            Situation::Travel => "travel.txt",
            Situation::LearnAlphabet => "alphabet.txt",
            Situation::Airport => "airport.txt",
        }
    }

    /// Uniform draw over all situations.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Situation {
        *Self::ALL.choose(rng).unwrap_or(&Situation::Travel)
    }
}

impl fmt::Display for Situation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown situation: {0:?}")]
pub struct UnknownSituation(pub String);

impl FromStr for Situation {
    type Err = UnknownSituation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|situation| situation.as_str() == s)
            .ok_or_else(|| UnknownSituation(s.to_string()))
    }
}

/// What the client asked for: a fixed situation or a random course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SituationChoice {
    Fixed(Situation),
    Random,
}

impl FromStr for SituationChoice {
    type Err = UnknownSituation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "random-course" | "random" => Ok(SituationChoice::Random),
            other => other.parse().map(SituationChoice::Fixed),
        }
    }
}
