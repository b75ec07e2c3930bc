//! Recommendation model produced by the recommendation engine.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Recommendation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Visibility,
    Collaboration,
    Trending,
    Profile,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Visibility => "visibility",
            Category::Collaboration => "collaboration",
            Category::Trending => "trending",
            Category::Profile => "profile",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "visibility" => Ok(Category::Visibility),
            "collaboration" => Ok(Category::Collaboration),
            "trending" => Ok(Category::Trending),
            "profile" => Ok(Category::Profile),
            other => Err(format!("unknown recommendation category: {}", other)),
        }
    }
}

/// Priority bucket; its weight dominates the ranking score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn weight(&self) -> f64 {
        match self {
            Priority::High => 3.0,
            Priority::Medium => 2.0,
            Priority::Low => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A derived, non-persistent suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: Category,
    pub priority: Priority,

    /// Heuristic impact score used for ranking (higher first)
    pub score: f64,

    pub title: String,

    /// Why this recommendation was made
    pub rationale: String,

    /// What to do about it
    pub action: String,

    /// Store id of the paper this is about, if any
    pub paper_id: Option<i64>,

    /// Title of that paper, kept for display and tie-breaking
    pub paper_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_str() {
        assert_eq!("Visibility".parse::<Category>(), Ok(Category::Visibility));
        assert_eq!(" trending ".parse::<Category>(), Ok(Category::Trending));
        assert!("impact".parse::<Category>().is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::High.weight() > Priority::Low.weight());
    }
}
