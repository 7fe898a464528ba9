use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

/// Regulatory form types the tracker follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String", into = "String")]
pub enum FilingCategory {
    /// S-1
    PrimaryRegistration,
    /// F-1
    ForeignPrimaryRegistration,
    /// 424B4, the final prospectus filed once the offering is priced.
    PricingSupplement,
    /// S-1/A
    AmendmentOfPrimary,
    /// F-1/A
    AmendmentOfForeignPrimary,
}

impl FilingCategory {
    /// Order in which one ingestion cycle walks the feeds.
    pub const CYCLE_ORDER: [FilingCategory; 3] = [
        FilingCategory::PrimaryRegistration,
        FilingCategory::ForeignPrimaryRegistration,
        FilingCategory::PricingSupplement,
    ];

    /// Categories walked day by day during a backfill.
    pub const BACKFILL_ORDER: [FilingCategory; 2] = [
        FilingCategory::PrimaryRegistration,
        FilingCategory::ForeignPrimaryRegistration,
    ];

    /// Form code as used by the EDGAR feed `type` parameter.
    pub fn code(&self) -> &'static str {
        match self {
            FilingCategory::PrimaryRegistration => "S-1",
            FilingCategory::ForeignPrimaryRegistration => "F-1",
            FilingCategory::PricingSupplement => "424B4",
            FilingCategory::AmendmentOfPrimary => "S-1/A",
            FilingCategory::AmendmentOfForeignPrimary => "F-1/A",
        }
    }

    /// Amendments collapse onto the registration they amend.
    pub fn base(&self) -> FilingCategory {
        match self {
            FilingCategory::AmendmentOfPrimary => FilingCategory::PrimaryRegistration,
            FilingCategory::AmendmentOfForeignPrimary => FilingCategory::ForeignPrimaryRegistration,
            other => *other,
        }
    }

    pub fn is_amendment(&self) -> bool {
        matches!(
            self,
            FilingCategory::AmendmentOfPrimary | FilingCategory::AmendmentOfForeignPrimary
        )
    }

    pub fn is_pricing(&self) -> bool {
        matches!(self, FilingCategory::PricingSupplement)
    }

    /// Registration categories that a pricing event promotes.
    pub fn is_registration(&self) -> bool {
        matches!(
            self.base(),
            FilingCategory::PrimaryRegistration | FilingCategory::ForeignPrimaryRegistration
        )
    }
}

impl fmt::Display for FilingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

pub static FILING_CATEGORIES: Lazy<String> = Lazy::new(|| {
    FilingCategory::iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
});

impl FilingCategory {
    pub fn list_codes() -> &'static str {
        &FILING_CATEGORIES
    }
}

impl FromStr for FilingCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "S-1" => Ok(FilingCategory::PrimaryRegistration),
            "F-1" => Ok(FilingCategory::ForeignPrimaryRegistration),
            "424B4" => Ok(FilingCategory::PricingSupplement),
            "S-1/A" => Ok(FilingCategory::AmendmentOfPrimary),
            "F-1/A" => Ok(FilingCategory::AmendmentOfForeignPrimary),
            _ => Err(format!(
                "unknown filing category '{}', expected one of: {}",
                s,
                FilingCategory::list_codes()
            )),
        }
    }
}

impl TryFrom<String> for FilingCategory {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        FilingCategory::from_str(&s)
    }
}

impl From<FilingCategory> for String {
    fn from(c: FilingCategory) -> Self {
        c.code().to_string()
    }
}
