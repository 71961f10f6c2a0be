//! Membership tier benefits loaded from config.toml
//!
//! Each `[[tiers]]` table describes what an active membership of that tier receives
//! every quarter and how many companion slots it carries.

use serde::Deserialize;

const fn default_expiration_months() -> u32 {
    12
}

/// Benefits attached to one membership tier
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TierConfig {
    /// Tier name as stored on memberships
    pub name: String,
    /// Ticket credits granted each quarter
    pub quarterly_credits: i64,
    /// Months until an allocated credit or voucher expires
    #[serde(default = "default_expiration_months")]
    pub credit_expiration_months: u32,
    /// Guest slots on the tier's companion pass
    #[serde(default)]
    pub companion_slots: i32,
    /// VIP upgrade vouchers granted each quarter
    #[serde(default)]
    pub vip_vouchers_per_quarter: i32,
}

/// Finds the tier with the given name.
#[must_use]
pub fn find_tier<'a>(tiers: &'a [TierConfig], name: &str) -> Option<&'a TierConfig> {
    tiers.iter().find(|tier| tier.name == name)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[derive(Deserialize)]
    struct TiersOnly {
        tiers: Vec<TierConfig>,
    }

    #[test]
    fn test_parse_tier_config_with_defaults() {
        let toml_str = r#"
            [[tiers]]
            name = "insider"
            quarterly_credits = 1

            [[tiers]]
            name = "legend"
            quarterly_credits = 4
            credit_expiration_months = 6
            companion_slots = 2
            vip_vouchers_per_quarter = 1
        "#;

        let parsed: TiersOnly = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.tiers.len(), 2);
        assert_eq!(parsed.tiers[0].credit_expiration_months, 12);
        assert_eq!(parsed.tiers[0].companion_slots, 0);
        assert_eq!(parsed.tiers[1].companion_slots, 2);

        let legend = find_tier(&parsed.tiers, "legend").unwrap();
        assert_eq!(legend.quarterly_credits, 4);
        assert!(find_tier(&parsed.tiers, "unknown").is_none());
    }
}
