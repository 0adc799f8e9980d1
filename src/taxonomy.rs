//! Closed category taxonomy and level vocabulary

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Built-in certification categories
pub const BUILTIN_CATEGORIES: &[&str] = &[
    "AI & Machine Learning Engineering",
    "Agile & Scrum",
    "Blockchain & Web3",
    "Business & Entrepreneurship",
    "Cloud Computing",
    "Communication & Soft Skills",
    "Content Creation & Media",
    "Customer Service & Support",
    "Cybersecurity & Information Security",
    "Data Engineering",
    "Data Science & Analytics",
    "Database Administration",
    "Design & UX",
    "DevOps & Site Reliability",
    "Digital Marketing & Social Media",
    "E-commerce",
    "Education & Teaching",
    "Enterprise Software",
    "Finance & Accounting",
    "Game Development",
    "Healthcare & Life Sciences",
    "Human Resources",
    "IT Support & Help Desk",
    "Internet of Things",
    "Language Learning",
    "Leadership & Management",
    "Legal & Compliance",
    "Mobile Development",
    "Networking & Infrastructure",
    "Open Source",
    "Operating Systems & Linux",
    "Product Management",
    "Productivity & Office Tools",
    "Programming & Development",
    "Project Management",
    "Quantum Computing",
    "Robotics & Automation",
    "Sales & Customer Success",
    "Software Testing & QA",
    "Supply Chain & Logistics",
    "Sustainability & Environment",
    "Web Development",
];

/// The set of accepted categories
///
/// A category written with a parenthetical qualifier (`Cloud Computing (AWS)`)
/// is accepted when its base name is a member; the full string is kept as-is.
#[derive(Clone, Debug)]
pub struct Taxonomy {
    categories: BTreeSet<String>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::with_extra(std::iter::empty::<String>())
    }
}

impl Taxonomy {
    /// Built-in categories plus `extra`
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut categories: BTreeSet<String> =
            BUILTIN_CATEGORIES.iter().map(|c| c.to_string()).collect();
        categories.extend(extra.into_iter().map(Into::into));
        Self { categories }
    }

    /// Whether `category` belongs to the taxonomy
    pub fn contains(&self, category: &str) -> bool {
        let category = category.trim();
        self.categories.contains(category) || self.categories.contains(base_category(category))
    }

    /// Number of distinct categories
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Whether the taxonomy is empty
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Strip a trailing parenthetical qualifier: `"Cloud Computing (AWS)"` → `"Cloud Computing"`
pub fn base_category(category: &str) -> &str {
    match category.find(" (") {
        Some(idx) if category.ends_with(')') => category[..idx].trim_end(),
        _ => category,
    }
}

/// Certification difficulty level
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    /// Entry level
    Beginner,
    /// Some prior experience expected
    Intermediate,
    /// Specialist level
    Advanced,
    /// Anything else, stored with canonical capitalisation
    Other(String),
}

impl Level {
    /// Normalize a free-form level string
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        match lowered.as_str() {
            "beginner" => Level::Beginner,
            "intermediate" => Level::Intermediate,
            "advanced" => Level::Advanced,
            "" | "not specified" => Level::Other("Not Specified".to_string()),
            "beginner-intermediate" => Level::Other("Beginner-Intermediate".to_string()),
            "intermediate-advanced" => Level::Other("Intermediate-Advanced".to_string()),
            "associate" => Level::Other("Associate".to_string()),
            "professional" => Level::Other("Professional".to_string()),
            "expert" => Level::Other("Expert".to_string()),
            _ => Level::Other(title_case(raw.trim())),
        }
    }

    /// Canonical string form
    pub fn as_str(&self) -> &str {
        match self {
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
            Level::Other(s) => s,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Level {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Level::parse(&raw))
    }
}

/// Capitalise the first letter of every whitespace-separated word
pub(crate) fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_taxonomy_size() {
        let taxonomy = Taxonomy::default();
        assert!(taxonomy.len() >= 40);
        assert!(taxonomy.contains("Cloud Computing"));
        assert!(!taxonomy.contains("Underwater Basket Weaving"));
    }

    #[test]
    fn test_qualified_category_is_member() {
        let taxonomy = Taxonomy::default();
        assert!(taxonomy.contains("Cloud Computing (AWS)"));
        assert!(!taxonomy.contains("Cooking (Italian)"));
        assert_eq!(base_category("Cloud Computing (AWS)"), "Cloud Computing");
        assert_eq!(base_category("Cloud Computing"), "Cloud Computing");
    }

    #[test]
    fn test_taxonomy_is_extensible() {
        let taxonomy = Taxonomy::with_extra(["Underwater Basket Weaving"]);
        assert!(taxonomy.contains("Underwater Basket Weaving"));
    }

    #[test]
    fn test_level_normalization() {
        assert_eq!(Level::parse(" beginner "), Level::Beginner);
        assert_eq!(Level::parse("ADVANCED"), Level::Advanced);
        assert_eq!(Level::parse("").as_str(), "Not Specified");
        assert_eq!(Level::parse("expert").as_str(), "Expert");
        assert_eq!(Level::parse("all levels").as_str(), "All Levels");
    }

    #[test]
    fn test_level_parse_is_idempotent() {
        for raw in ["Beginner", "Not Specified", "Beginner-Intermediate", "All Levels"] {
            let once = Level::parse(raw);
            assert_eq!(Level::parse(once.as_str()), once);
        }
    }
}
