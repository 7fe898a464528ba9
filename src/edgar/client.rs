use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::report::FilingCategory;
use super::utils::fetch_text;
use crate::error::EdgarError;
use crate::record::RegistrantId;

const ATOM_ACCEPT: &str = "application/atom+xml, application/xml, text/xml";

/// Source of "latest filings" syndication documents.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// `Ok(None)` when the upstream has no feed for this request.
    async fn fetch_feed(
        &self,
        category: FilingCategory,
        cursor: Option<NaiveDate>,
    ) -> Result<Option<String>, EdgarError>;
}

/// Per-registrant documents used for enrichment. `Ok(None)` means not found.
#[async_trait]
pub trait FactsSource: Send + Sync {
    async fn company_facts(&self, cik: &RegistrantId) -> Result<Option<String>, EdgarError>;

    async fn submissions(&self, cik: &RegistrantId) -> Result<Option<String>, EdgarError>;

    async fn document(&self, url: &Url) -> Result<Option<String>, EdgarError>;
}

#[derive(Debug, Clone)]
pub struct EdgarConfig {
    pub www_url: Url,
    pub data_url: Url,
    pub user_agent: String,
    pub feed_timeout: Duration,
    pub facts_timeout: Duration,
}

impl Default for EdgarConfig {
    fn default() -> Self {
        EdgarConfig {
            www_url: Url::parse("https://www.sec.gov").expect("literal URL"),
            data_url: Url::parse("https://data.sec.gov").expect("literal URL"),
            user_agent: "IPO-Tracker contact@example.com".to_string(),
            feed_timeout: Duration::from_secs(30),
            facts_timeout: Duration::from_secs(10),
        }
    }
}

/// reqwest-backed EDGAR access.
#[derive(Clone)]
pub struct EdgarClient {
    http: Client,
    config: EdgarConfig,
}

impl EdgarClient {
    pub fn new(http: Client, config: EdgarConfig) -> Self {
        Self { http, config }
    }

    pub fn feed_url(
        &self,
        category: FilingCategory,
        cursor: Option<NaiveDate>,
    ) -> Result<Url, EdgarError> {
        let mut url = self.config.www_url.join("cgi-bin/browse-edgar")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("action", "getcurrent")
                .append_pair("type", category.code());
            if let Some(day) = cursor {
                query.append_pair("start", &day.format("%Y%m%d").to_string());
            }
            query.append_pair("output", "atom");
        }
        Ok(url)
    }

    pub fn company_facts_url(&self, cik: &RegistrantId) -> Result<Url, EdgarError> {
        Ok(self
            .config
            .data_url
            .join(&format!("api/xbrl/companyfacts/CIK{}.json", cik.padded()))?)
    }

    pub fn submissions_url(&self, cik: &RegistrantId) -> Result<Url, EdgarError> {
        Ok(self
            .config
            .data_url
            .join(&format!("submissions/CIK{}.json", cik.padded()))?)
    }

    /// One feed request; true when EDGAR answers successfully.
    pub async fn check_connection(&self) -> bool {
        match self
            .fetch_feed(FilingCategory::PrimaryRegistration, None)
            .await
        {
            Ok(Some(_)) => true,
            Ok(None) => {
                log::warn!("EDGAR answered 404 for the current S-1 feed");
                false
            }
            Err(e) => {
                log::warn!("EDGAR connection check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl FeedSource for EdgarClient {
    async fn fetch_feed(
        &self,
        category: FilingCategory,
        cursor: Option<NaiveDate>,
    ) -> Result<Option<String>, EdgarError> {
        let url = self.feed_url(category, cursor)?;
        fetch_text(
            &self.http,
            &url,
            &self.config.user_agent,
            ATOM_ACCEPT,
            self.config.feed_timeout,
        )
        .await
    }
}

#[async_trait]
impl FactsSource for EdgarClient {
    async fn company_facts(&self, cik: &RegistrantId) -> Result<Option<String>, EdgarError> {
        let url = self.company_facts_url(cik)?;
        fetch_text(
            &self.http,
            &url,
            &self.config.user_agent,
            mime::APPLICATION_JSON.as_ref(),
            self.config.facts_timeout,
        )
        .await
    }

    async fn submissions(&self, cik: &RegistrantId) -> Result<Option<String>, EdgarError> {
        let url = self.submissions_url(cik)?;
        fetch_text(
            &self.http,
            &url,
            &self.config.user_agent,
            mime::APPLICATION_JSON.as_ref(),
            self.config.facts_timeout,
        )
        .await
    }

    async fn document(&self, url: &Url) -> Result<Option<String>, EdgarError> {
        fetch_text(
            &self.http,
            url,
            &self.config.user_agent,
            mime::TEXT_HTML.as_ref(),
            self.config.facts_timeout,
        )
        .await
    }
}
