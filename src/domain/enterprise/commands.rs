use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::{CompanySize, EnterpriseStatus, Industry, SubscriptionTier};

// ============================================================================
// Enterprise Commands - typed payloads accepted by the command handler
// ============================================================================

/// Payload for creating an enterprise. Field names are camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnterprise {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub industry: Option<Industry>,
    #[serde(default)]
    pub size: Option<CompanySize>,
    pub contact_email: String,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub status: EnterpriseStatus,
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
    pub max_licenses: i32,
    #[serde(default)]
    pub used_licenses: i32,
    pub contract_start_date: DateTime<Utc>,
    #[serde(default)]
    pub contract_end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub monthly_revenue: f64,
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEnterprise {
    pub name: Option<String>,
    pub industry: Option<Industry>,
    pub size: Option<CompanySize>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub status: Option<EnterpriseStatus>,
    pub subscription_tier: Option<SubscriptionTier>,
    pub max_licenses: Option<i32>,
    pub used_licenses: Option<i32>,
    pub contract_start_date: Option<DateTime<Utc>>,
    pub contract_end_date: Option<DateTime<Utc>>,
    pub monthly_revenue: Option<f64>,
    /// Version the caller last read. When absent the current stored version
    /// is used, which still rejects writers racing between read and write.
    pub expected_version: Option<i64>,
}
