use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::EnterpriseError;

// ============================================================================
// Enterprise Value Objects
// ============================================================================
//
// Closed vocabularies stored as lowercase text, both in JSON and in the
// admin table.
//
// ============================================================================

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = EnterpriseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(EnterpriseError::UnknownValue {
                        field: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Industry sector
    Industry {
        Technology => "technology",
        Healthcare => "healthcare",
        Finance => "finance",
        Retail => "retail",
        Manufacturing => "manufacturing",
        Education => "education",
        Consulting => "consulting",
        Other => "other",
    }
);

text_enum!(
    /// Company size bracket
    CompanySize {
        Startup => "startup",
        Small => "small",
        Medium => "medium",
        Large => "large",
        Enterprise => "enterprise",
    }
);

text_enum!(
    EnterpriseStatus {
        Active => "active",
        Inactive => "inactive",
        Trial => "trial",
        Suspended => "suspended",
    }
);

text_enum!(
    SubscriptionTier {
        Basic => "basic",
        Private => "private",
    }
);

impl Default for EnterpriseStatus {
    fn default() -> Self {
        EnterpriseStatus::Active
    }
}

impl Default for SubscriptionTier {
    fn default() -> Self {
        SubscriptionTier::Basic
    }
}

/// Direction of the contract-end-date listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortOrder {
    pub fn is_ascending(&self) -> bool {
        matches!(self, SortOrder::Ascending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_serde() {
        assert_eq!(serde_json::to_string(&Industry::Healthcare).unwrap(), "\"healthcare\"");
        let size: CompanySize = serde_json::from_str("\"enterprise\"").unwrap();
        assert_eq!(size, CompanySize::Enterprise);
        assert!(serde_json::from_str::<EnterpriseStatus>("\"Active\"").is_err());
    }

    #[test]
    fn test_parse_from_column_text() {
        assert_eq!("trial".parse::<EnterpriseStatus>().unwrap(), EnterpriseStatus::Trial);
        assert_eq!("private".parse::<SubscriptionTier>().unwrap(), SubscriptionTier::Private);
        assert!("gold".parse::<SubscriptionTier>().is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(EnterpriseStatus::default(), EnterpriseStatus::Active);
        assert_eq!(SubscriptionTier::default(), SubscriptionTier::Basic);
        assert_eq!(SortOrder::default(), SortOrder::Ascending);
    }

    #[test]
    fn test_sort_order_query_param() {
        let order: SortOrder = serde_json::from_str("\"desc\"").unwrap();
        assert_eq!(order, SortOrder::Descending);
        assert!(!order.is_ascending());
    }
}
