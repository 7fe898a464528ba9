//! Company-facts ontology and the fact extraction table.
//!
//! The document maps `namespace -> concept -> unit -> [observation]`. Every
//! fact the tracker stores is read through [`latest_observation`]: try the
//! candidate concepts in order, keep the first one that has observations in
//! the wanted unit, filter by form, return the latest period.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyFacts {
    #[serde(default)]
    pub cik: Option<Value>,
    #[serde(rename = "entityName", default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub facts: HashMap<String, HashMap<String, Concept>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Concept {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub units: HashMap<String, Vec<Observation>>,
}

/// A point-in-time value as reported in one filing.
#[derive(Debug, Clone, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub end: Option<String>,
    pub val: Value,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub filed: Option<String>,
    #[serde(default)]
    pub fy: Option<i32>,
    #[serde(default)]
    pub fp: Option<String>,
}

impl Observation {
    pub fn as_f64(&self) -> Option<f64> {
        match &self.val {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match &self.val {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Which filings an observation may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormFilter {
    Any,
    /// Registration statements and annual reports; quarterly reports excluded.
    Annual,
}

const ANNUAL_FORMS: &[&str] = &[
    "10-K", "10-K/A", "20-F", "20-F/A", "40-F", "S-1", "S-1/A", "F-1", "F-1/A",
];

impl FormFilter {
    fn admits(&self, observation: &Observation) -> bool {
        match self {
            FormFilter::Any => true,
            FormFilter::Annual => observation
                .form
                .as_deref()
                .map_or(false, |form| ANNUAL_FORMS.contains(&form)),
        }
    }
}

/// One stored fact and where to find it.
#[derive(Debug, Clone, Copy)]
pub struct FactSpec {
    pub name: &'static str,
    /// `(namespace, concept)` pairs in priority order.
    pub candidates: &'static [(&'static str, &'static str)],
    pub unit: &'static str,
    pub forms: FormFilter,
}

pub const SHARES_OUTSTANDING: FactSpec = FactSpec {
    name: "shares_outstanding",
    candidates: &[
        ("dei", "EntityCommonStockSharesOutstanding"),
        ("dei", "CommonStockSharesOutstanding"),
        ("us-gaap", "CommonStockSharesOutstanding"),
        ("us-gaap", "WeightedAverageNumberOfSharesOutstandingBasic"),
    ],
    unit: "shares",
    forms: FormFilter::Any,
};

pub const REVENUES: FactSpec = FactSpec {
    name: "revenues",
    candidates: &[
        ("us-gaap", "Revenues"),
        ("us-gaap", "RevenueFromContractWithCustomerExcludingAssessedTax"),
        ("us-gaap", "SalesRevenueNet"),
    ],
    unit: "USD",
    forms: FormFilter::Annual,
};

pub const NET_INCOME: FactSpec = FactSpec {
    name: "net_income",
    candidates: &[
        ("us-gaap", "NetIncomeLoss"),
        ("us-gaap", "ProfitLoss"),
        ("us-gaap", "NetIncomeLossAvailableToCommonStockholdersBasic"),
    ],
    unit: "USD",
    forms: FormFilter::Annual,
};

pub const TOTAL_ASSETS: FactSpec = FactSpec {
    name: "total_assets",
    candidates: &[("us-gaap", "Assets")],
    unit: "USD",
    forms: FormFilter::Any,
};

pub const EMPLOYEES: FactSpec = FactSpec {
    name: "employees",
    candidates: &[("dei", "EntityNumberOfEmployees")],
    unit: "pure",
    forms: FormFilter::Any,
};

pub const FISCAL_YEAR_END: FactSpec = FactSpec {
    name: "fiscal_year_end",
    candidates: &[("dei", "CurrentFiscalYearEndDate")],
    unit: "MMM-DD",
    forms: FormFilter::Any,
};

/// The extraction primitive.
///
/// The first candidate with any observation in `spec.unit` is the only one
/// consulted. If the form filter then leaves nothing, the fact is absent.
pub fn latest_observation<'a>(facts: &'a CompanyFacts, spec: &FactSpec) -> Option<&'a Observation> {
    let (namespace, concept, observations) = spec.candidates.iter().find_map(|(ns, concept)| {
        facts
            .facts
            .get(*ns)
            .and_then(|concepts| concepts.get(*concept))
            .and_then(|c| c.units.get(spec.unit))
            .filter(|obs| !obs.is_empty())
            .map(|obs| (*ns, *concept, obs))
    })?;

    let latest = observations
        .iter()
        .filter(|o| spec.forms.admits(o))
        .max_by(|a, b| (&a.end, &a.filed).cmp(&(&b.end, &b.filed)));

    if latest.is_none() {
        log::debug!(
            "{}:{} has observations but none from an admissible form for {}",
            namespace,
            concept,
            spec.name
        );
    }
    latest
}

/// Facts extracted for one registrant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinancialFacts {
    pub entity_name: Option<String>,
    pub shares_outstanding: Option<i64>,
    pub revenues: Option<f64>,
    pub net_income: Option<f64>,
    pub total_assets: Option<f64>,
    pub employees: Option<i64>,
    pub fiscal_year_end: Option<String>,
}

fn number(facts: &CompanyFacts, spec: &FactSpec) -> Option<f64> {
    latest_observation(facts, spec).and_then(Observation::as_f64)
}

impl FinancialFacts {
    pub fn from_document(facts: &CompanyFacts) -> Self {
        FinancialFacts {
            entity_name: facts.entity_name.clone(),
            shares_outstanding: number(facts, &SHARES_OUTSTANDING).map(|v| v.round() as i64),
            revenues: number(facts, &REVENUES),
            net_income: number(facts, &NET_INCOME),
            total_assets: number(facts, &TOTAL_ASSETS),
            employees: number(facts, &EMPLOYEES).map(|v| v.round() as i64),
            fiscal_year_end: latest_observation(facts, &FISCAL_YEAR_END)
                .and_then(Observation::as_text),
        }
    }

    pub fn parse(json: &str) -> serde_json::Result<Self> {
        let document: CompanyFacts = serde_json::from_str(json)?;
        Ok(Self::from_document(&document))
    }

    pub fn is_empty(&self) -> bool {
        self.shares_outstanding.is_none()
            && self.revenues.is_none()
            && self.net_income.is_none()
            && self.total_assets.is_none()
            && self.employees.is_none()
            && self.fiscal_year_end.is_none()
    }
}
