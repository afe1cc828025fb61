//! Code smell taxonomy.
//!
//! The closed vocabulary models must choose from: five categories from the
//! Refactoring Guru catalogue and the smell types that belong to each.
//! Values outside the vocabulary are kept as `Unclassified` so that model
//! creativity survives parsing without being mis-bucketed downstream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Smell category.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Bloaters,
    ObjectOrientationAbusers,
    ChangePreventers,
    Dispensables,
    Couplers,
    /// A category name the model invented.
    Unclassified(String),
}

impl Category {
    /// All known categories, in catalogue order.
    pub const CANONICAL: [Category; 5] = [
        Category::Bloaters,
        Category::ObjectOrientationAbusers,
        Category::ChangePreventers,
        Category::Dispensables,
        Category::Couplers,
    ];

    /// Display name of the category.
    pub fn name(&self) -> &str {
        match self {
            Category::Bloaters => "Bloaters",
            Category::ObjectOrientationAbusers => "Object-Orientation Abusers",
            Category::ChangePreventers => "Change Preventers",
            Category::Dispensables => "Dispensables",
            Category::Couplers => "Couplers",
            Category::Unclassified(raw) => raw,
        }
    }

    /// Match a raw value against the vocabulary, ignoring case and punctuation.
    pub fn parse(raw: &str) -> Self {
        let key = vocab_key(raw);
        Self::CANONICAL
            .into_iter()
            .find(|c| vocab_key(c.name()) == key)
            .unwrap_or_else(|| Category::Unclassified(raw.trim().to_string()))
    }

    pub fn is_classified(&self) -> bool {
        !matches!(self, Category::Unclassified(_))
    }

    /// Smell types belonging to this category.
    pub fn smell_types(&self) -> Vec<SmellType> {
        SmellType::CANONICAL
            .into_iter()
            .filter(|t| t.category().as_ref() == Some(self))
            .collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category::parse(&s)
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.name().to_string()
    }
}

/// Smell type.
///
/// Variant order is the canonical ranking order used to break ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SmellType {
    // Bloaters
    LongMethod,
    LargeClass,
    PrimitiveObsession,
    LongParameterList,
    DataClumps,
    // Object-Orientation Abusers
    SwitchStatements,
    TemporaryField,
    RefusedBequest,
    AlternativeClassesWithDifferentInterfaces,
    // Change Preventers
    DivergentChange,
    ShotgunSurgery,
    ParallelInheritanceHierarchies,
    // Dispensables
    Comments,
    DuplicateCode,
    LazyClass,
    DataClass,
    DeadCode,
    SpeculativeGenerality,
    // Couplers
    FeatureEnvy,
    InappropriateIntimacy,
    MessageChains,
    MiddleMan,
    /// A smell type the model invented.
    Unclassified(String),
}

impl SmellType {
    /// All known smell types, in canonical order.
    pub const CANONICAL: [SmellType; 22] = [
        SmellType::LongMethod,
        SmellType::LargeClass,
        SmellType::PrimitiveObsession,
        SmellType::LongParameterList,
        SmellType::DataClumps,
        SmellType::SwitchStatements,
        SmellType::TemporaryField,
        SmellType::RefusedBequest,
        SmellType::AlternativeClassesWithDifferentInterfaces,
        SmellType::DivergentChange,
        SmellType::ShotgunSurgery,
        SmellType::ParallelInheritanceHierarchies,
        SmellType::Comments,
        SmellType::DuplicateCode,
        SmellType::LazyClass,
        SmellType::DataClass,
        SmellType::DeadCode,
        SmellType::SpeculativeGenerality,
        SmellType::FeatureEnvy,
        SmellType::InappropriateIntimacy,
        SmellType::MessageChains,
        SmellType::MiddleMan,
    ];

    /// Display name of the smell type.
    pub fn name(&self) -> &str {
        match self {
            SmellType::LongMethod => "Long Method",
            SmellType::LargeClass => "Large Class",
            SmellType::PrimitiveObsession => "Primitive Obsession",
            SmellType::LongParameterList => "Long Parameter List",
            SmellType::DataClumps => "Data Clumps",
            SmellType::SwitchStatements => "Switch Statements",
            SmellType::TemporaryField => "Temporary Field",
            SmellType::RefusedBequest => "Refused Bequest",
            SmellType::AlternativeClassesWithDifferentInterfaces => {
                "Alternative Classes with Different Interfaces"
            }
            SmellType::DivergentChange => "Divergent Change",
            SmellType::ShotgunSurgery => "Shotgun Surgery",
            SmellType::ParallelInheritanceHierarchies => "Parallel Inheritance Hierarchies",
            SmellType::Comments => "Comments",
            SmellType::DuplicateCode => "Duplicate Code",
            SmellType::LazyClass => "Lazy Class",
            SmellType::DataClass => "Data Class",
            SmellType::DeadCode => "Dead Code",
            SmellType::SpeculativeGenerality => "Speculative Generality",
            SmellType::FeatureEnvy => "Feature Envy",
            SmellType::InappropriateIntimacy => "Inappropriate Intimacy",
            SmellType::MessageChains => "Message Chains",
            SmellType::MiddleMan => "Middle Man",
            SmellType::Unclassified(raw) => raw,
        }
    }

    /// The category a known smell type belongs to.
    pub fn category(&self) -> Option<Category> {
        use SmellType::*;
        let category = match self {
            LongMethod | LargeClass | PrimitiveObsession | LongParameterList | DataClumps => {
                Category::Bloaters
            }
            SwitchStatements
            | TemporaryField
            | RefusedBequest
            | AlternativeClassesWithDifferentInterfaces => Category::ObjectOrientationAbusers,
            DivergentChange | ShotgunSurgery | ParallelInheritanceHierarchies => {
                Category::ChangePreventers
            }
            Comments | DuplicateCode | LazyClass | DataClass | DeadCode
            | SpeculativeGenerality => Category::Dispensables,
            FeatureEnvy | InappropriateIntimacy | MessageChains | MiddleMan => Category::Couplers,
            Unclassified(_) => return None,
        };
        Some(category)
    }

    /// Match a raw value against the vocabulary, ignoring case and punctuation.
    pub fn parse(raw: &str) -> Self {
        let key = vocab_key(raw);
        Self::CANONICAL
            .into_iter()
            .find(|t| vocab_key(t.name()) == key)
            .unwrap_or_else(|| SmellType::Unclassified(raw.trim().to_string()))
    }

    pub fn is_classified(&self) -> bool {
        !matches!(self, SmellType::Unclassified(_))
    }
}

impl fmt::Display for SmellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<String> for SmellType {
    fn from(s: String) -> Self {
        SmellType::parse(&s)
    }
}

impl From<SmellType> for String {
    fn from(t: SmellType) -> Self {
        t.name().to_string()
    }
}

/// Lower-cased alphanumerics only, so "long_method" and "Long-Method" agree.
fn vocab_key(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
