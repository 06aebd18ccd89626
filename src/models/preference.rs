use crate::models::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CuratorPolarity {
    Positive,
    Negative,
}

impl CuratorPolarity {
    /// Negative curators contribute their inverted opinion
    pub fn apply(self, rank: Decimal) -> Decimal {
        match self {
            CuratorPolarity::Positive => rank,
            CuratorPolarity::Negative => -rank,
        }
    }
}

/// Curators and keywords captured under a profile name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    #[serde(default)]
    pub curators: BTreeMap<UserId, CuratorPolarity>,
    #[serde(default)]
    pub keywords: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceProfile {
    #[serde(default)]
    pub curators: BTreeMap<UserId, CuratorPolarity>,
    /// Keyword ratings in [-1, 1]; positive means liked
    #[serde(default)]
    pub keywords: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub saved_profiles: BTreeMap<String, ProfileSnapshot>,
}

impl PreferenceProfile {
    pub fn liked_keywords(&self) -> impl Iterator<Item = &String> {
        self.keywords
            .iter()
            .filter(|(_, rating)| rating.is_sign_positive() && !rating.is_zero())
            .map(|(keyword, _)| keyword)
    }

    pub fn disliked_keywords(&self) -> impl Iterator<Item = &String> {
        self.keywords
            .iter()
            .filter(|(_, rating)| rating.is_sign_negative() && !rating.is_zero())
            .map(|(keyword, _)| keyword)
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            curators: self.curators.clone(),
            keywords: self.keywords.clone(),
        }
    }
}
