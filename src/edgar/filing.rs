use serde::{Deserialize, Serialize};

/// The parts of the submissions document the tracker uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyProfile {
    #[serde(default)]
    pub cik: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sic: Option<String>,
    #[serde(rename = "sicDescription", default)]
    pub sic_description: Option<String>,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub exchanges: Vec<Option<String>>,
}

impl CompanyProfile {
    pub fn parse(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn ticker(&self) -> Option<&str> {
        self.tickers
            .iter()
            .map(|t| t.trim())
            .find(|t| !t.is_empty())
    }

    pub fn industry(&self) -> Option<&str> {
        self.sic_description
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Listed on at least one named exchange.
    pub fn is_listed(&self) -> bool {
        self.ticker().is_some()
            && self
                .exchanges
                .iter()
                .flatten()
                .any(|e| !e.trim().is_empty())
    }
}
