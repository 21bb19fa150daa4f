use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::commands::{CreateEnterprise, UpdateEnterprise};
use super::errors::EnterpriseError;
use super::value_objects::{CompanySize, EnterpriseStatus, Industry, SubscriptionTier};

// ============================================================================
// Enterprise - tenant record and its business rules
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enterprise {
    pub id: String,
    pub name: String,
    pub industry: Option<Industry>,
    pub size: Option<CompanySize>,
    pub status: EnterpriseStatus,
    pub subscription_tier: SubscriptionTier,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub max_licenses: i32,
    pub used_licenses: i32,
    pub contract_start_date: DateTime<Utc>,
    pub contract_end_date: Option<DateTime<Utc>>,
    pub monthly_revenue: f64,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
    pub group_name: String,
    pub version: i64,
}

/// Listing projection: no contact or address detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseSummary {
    pub id: String,
    pub name: String,
    pub industry: Option<Industry>,
    pub website: Option<String>,
    pub status: EnterpriseStatus,
    pub subscription_tier: SubscriptionTier,
    pub max_licenses: i32,
    pub used_licenses: i32,
    pub contract_end_date: Option<DateTime<Utc>>,
    pub monthly_revenue: f64,
}

/// Field changes handed to the store's conditional update.
#[derive(Debug, Clone, PartialEq)]
pub struct EnterpriseChanges {
    pub name: Option<String>,
    pub group_name: Option<String>,
    pub industry: Option<Industry>,
    pub size: Option<CompanySize>,
    pub status: Option<EnterpriseStatus>,
    pub subscription_tier: Option<SubscriptionTier>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub max_licenses: Option<i32>,
    pub used_licenses: Option<i32>,
    pub contract_start_date: Option<DateTime<Utc>>,
    pub contract_end_date: Option<DateTime<Utc>>,
    pub monthly_revenue: Option<f64>,
    pub updated_by: String,
    pub updated_date: DateTime<Utc>,
}

/// Label of the identity-provider group for an enterprise name.
pub fn group_name_for(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

#[derive(Validate)]
struct ContactEmail {
    #[validate(email)]
    address: String,
}

pub fn validate_email(email: &str) -> Result<(), EnterpriseError> {
    ContactEmail {
        address: email.to_string(),
    }
    .validate()
    .map_err(|_| EnterpriseError::InvalidEmail(email.to_string()))
}

pub fn validate_website(website: &str) -> Result<(), EnterpriseError> {
    if website.starts_with("http://") || website.starts_with("https://") {
        Ok(())
    } else {
        Err(EnterpriseError::InvalidWebsite(website.to_string()))
    }
}

impl Enterprise {
    /// Build a new record from a create payload. Timestamps are taken from
    /// `now` (millisecond precision) and created == updated.
    pub fn create(
        cmd: CreateEnterprise,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, EnterpriseError> {
        if cmd.id.trim().is_empty() {
            return Err(EnterpriseError::EmptyId);
        }
        if cmd.id.contains('#') {
            return Err(EnterpriseError::ReservedCharacterInId(cmd.id));
        }

        let now = now.trunc_subsecs(3);
        let enterprise = Self {
            group_name: group_name_for(&cmd.name),
            id: cmd.id,
            name: cmd.name,
            industry: cmd.industry,
            size: cmd.size,
            status: cmd.status,
            subscription_tier: cmd.subscription_tier,
            contact_email: cmd.contact_email,
            contact_phone: cmd.contact_phone,
            address: cmd.address,
            website: cmd.website,
            max_licenses: cmd.max_licenses,
            used_licenses: cmd.used_licenses,
            contract_start_date: cmd.contract_start_date.trunc_subsecs(3),
            contract_end_date: cmd.contract_end_date.map(|d| d.trunc_subsecs(3)),
            monthly_revenue: cmd.monthly_revenue,
            created_date: now,
            updated_date: now,
            created_by: user_id.to_string(),
            updated_by: user_id.to_string(),
            version: 1,
        };

        enterprise.validate()?;
        Ok(enterprise)
    }

    /// Check every field-level and cross-field rule.
    pub fn validate(&self) -> Result<(), EnterpriseError> {
        if self.name.trim().is_empty() {
            return Err(EnterpriseError::EmptyName);
        }
        validate_email(&self.contact_email)?;
        if let Some(ref website) = self.website {
            validate_website(website)?;
        }
        if self.max_licenses < 1 {
            return Err(EnterpriseError::InvalidMaxLicenses(self.max_licenses));
        }
        if self.used_licenses < 0 {
            return Err(EnterpriseError::NegativeUsedLicenses(self.used_licenses));
        }
        if self.used_licenses > self.max_licenses {
            return Err(EnterpriseError::LicensesExceeded {
                used: self.used_licenses,
                max: self.max_licenses,
            });
        }
        if let Some(end) = self.contract_end_date {
            if end <= self.contract_start_date {
                return Err(EnterpriseError::ContractEndBeforeStart);
            }
        }
        if !(self.monthly_revenue >= 0.0) {
            return Err(EnterpriseError::InvalidRevenue(self.monthly_revenue));
        }
        Ok(())
    }

    /// Record as it would look after `changes`, version bumped.
    pub fn with_changes(&self, changes: &EnterpriseChanges) -> Self {
        let mut next = self.clone();
        if let Some(ref name) = changes.name {
            next.name = name.clone();
            next.group_name = changes
                .group_name
                .clone()
                .unwrap_or_else(|| group_name_for(name));
        }
        if let Some(industry) = changes.industry {
            next.industry = Some(industry);
        }
        if let Some(size) = changes.size {
            next.size = Some(size);
        }
        if let Some(status) = changes.status {
            next.status = status;
        }
        if let Some(tier) = changes.subscription_tier {
            next.subscription_tier = tier;
        }
        if let Some(ref email) = changes.contact_email {
            next.contact_email = email.clone();
        }
        if let Some(ref phone) = changes.contact_phone {
            next.contact_phone = Some(phone.clone());
        }
        if let Some(ref address) = changes.address {
            next.address = Some(address.clone());
        }
        if let Some(ref website) = changes.website {
            next.website = Some(website.clone());
        }
        if let Some(max) = changes.max_licenses {
            next.max_licenses = max;
        }
        if let Some(used) = changes.used_licenses {
            next.used_licenses = used;
        }
        if let Some(start) = changes.contract_start_date {
            next.contract_start_date = start;
        }
        if let Some(end) = changes.contract_end_date {
            next.contract_end_date = Some(end);
        }
        if let Some(revenue) = changes.monthly_revenue {
            next.monthly_revenue = revenue;
        }
        next.updated_by = changes.updated_by.clone();
        next.updated_date = changes.updated_date;
        next.version = self.version + 1;
        next
    }

    pub fn summary(&self) -> EnterpriseSummary {
        EnterpriseSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            industry: self.industry,
            website: self.website.clone(),
            status: self.status,
            subscription_tier: self.subscription_tier,
            max_licenses: self.max_licenses,
            used_licenses: self.used_licenses,
            contract_end_date: self.contract_end_date,
            monthly_revenue: self.monthly_revenue,
        }
    }
}

impl EnterpriseChanges {
    pub fn from_command(cmd: UpdateEnterprise, user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            group_name: cmd.name.as_deref().map(group_name_for),
            name: cmd.name,
            industry: cmd.industry,
            size: cmd.size,
            status: cmd.status,
            subscription_tier: cmd.subscription_tier,
            contact_email: cmd.contact_email,
            contact_phone: cmd.contact_phone,
            address: cmd.address,
            website: cmd.website,
            max_licenses: cmd.max_licenses,
            used_licenses: cmd.used_licenses,
            contract_start_date: cmd.contract_start_date.map(|d| d.trunc_subsecs(3)),
            contract_end_date: cmd.contract_end_date.map(|d| d.trunc_subsecs(3)),
            monthly_revenue: cmd.monthly_revenue,
            updated_by: user_id.to_string(),
            updated_date: now.trunc_subsecs(3),
        }
    }

    /// Only metadata is touched.
    pub fn is_metadata_only(&self) -> bool {
        self.name.is_none()
            && self.industry.is_none()
            && self.size.is_none()
            && self.status.is_none()
            && self.subscription_tier.is_none()
            && self.contact_email.is_none()
            && self.contact_phone.is_none()
            && self.address.is_none()
            && self.website.is_none()
            && self.max_licenses.is_none()
            && self.used_licenses.is_none()
            && self.contract_start_date.is_none()
            && self.contract_end_date.is_none()
            && self.monthly_revenue.is_none()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn create_command(id: &str) -> CreateEnterprise {
        CreateEnterprise {
            id: id.to_string(),
            name: "Acme Corp".to_string(),
            industry: Some(Industry::Technology),
            size: Some(CompanySize::Medium),
            contact_email: "ops@acme.io".to_string(),
            contact_phone: Some("+1 555 0100".to_string()),
            address: Some("1 Main St".to_string()),
            website: Some("https://acme.io".to_string()),
            status: EnterpriseStatus::Active,
            subscription_tier: SubscriptionTier::Private,
            max_licenses: 10,
            used_licenses: 3,
            contract_start_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            contract_end_date: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            monthly_revenue: 1250.5,
        }
    }

    pub fn enterprise(id: &str) -> Enterprise {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap();
        Enterprise::create(create_command(id), "u-admin", now).unwrap()
    }
}
