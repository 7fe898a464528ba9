use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::feed::RawEntry;
use super::report::FilingCategory;
use crate::error::ClassificationFailure;
use crate::record::RegistrantId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEntry {
    pub company_name: String,
    pub registrant_id: RegistrantId,
    pub filing_date: NaiveDate,
    /// Form code printed at the front of the title, e.g. `S-1/A`.
    pub form_code: String,
    pub link: Option<String>,
}

impl ClassifiedEntry {
    /// The category the entry really belongs to.
    ///
    /// Feeds requested for `S-1` also carry `S-1/A` entries; when the title
    /// names a known form of the same family that form wins over the hint.
    pub fn effective_category(&self, hint: FilingCategory) -> FilingCategory {
        match self.form_code.parse::<FilingCategory>() {
            Ok(parsed) if parsed.base() == hint.base() => parsed,
            _ => hint,
        }
    }
}

/// A named title grammar. Each must capture `code`, `name` and `group`.
pub struct TitleRule {
    pub name: &'static str,
    pattern: Regex,
}

fn rule(name: &'static str, pattern: &str) -> Result<TitleRule, regex::Error> {
    Ok(TitleRule {
        name,
        pattern: Regex::new(pattern)?,
    })
}

/// Tried in order; the first rule that matches decides.
pub static TITLE_RULES: Lazy<Result<Vec<TitleRule>, regex::Error>> = Lazy::new(|| {
    Ok(vec![
        rule(
            "cik-prefixed",
            r"^(?P<code>[A-Z0-9][A-Z0-9/-]*)\s+-\s+(?P<name>.+?)\s+\((?P<group>CIK-?\s*\d+)\)",
        )?,
        rule(
            "bare-digits",
            r"^(?P<code>[A-Z0-9][A-Z0-9/-]*)\s+-\s+(?P<name>.+?)\s+\((?P<group>\d+)\)",
        )?,
        rule(
            "any-parenthetical",
            r"^(?P<code>[A-Z0-9][A-Z0-9/-]*)\s+-\s+(?P<name>.+?)\s+\((?P<group>[^()]+)\)",
        )?,
    ])
});

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("literal regex"));

/// Longest run of digits in `group`; the leftmost wins a tie.
fn longest_digit_run(group: &str) -> Option<&str> {
    DIGIT_RUN
        .find_iter(group)
        .map(|m| m.as_str())
        .fold(None, |best: Option<&str>, run| match best {
            Some(b) if b.len() >= run.len() => Some(b),
            _ => Some(run),
        })
}

/// Reduces an upstream timestamp to its UTC calendar day. Timestamps
/// without an offset are taken as UTC.
pub fn filing_day(updated_at: &str) -> Option<NaiveDate> {
    let s = updated_at.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(ts.date());
    }
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

pub fn classify(
    entry: &RawEntry,
    category: FilingCategory,
) -> Result<ClassifiedEntry, ClassificationFailure> {
    let title = entry.title.as_deref().unwrap_or("").trim();
    let fail = |reason: &str| ClassificationFailure {
        title: title.to_string(),
        reason: reason.to_string(),
    };

    if title.is_empty() {
        return Err(fail("entry has no title"));
    }

    let rules = TITLE_RULES
        .as_ref()
        .map_err(|e| fail(&format!("title grammar failed to compile: {}", e)))?;
    let (rule, captures) = rules
        .iter()
        .find_map(|r| r.pattern.captures(title).map(|c| (r, c)))
        .ok_or_else(|| fail("title matches no known grammar"))?;

    let group = captures.name("group").map_or("", |m| m.as_str());
    let registrant_id = longest_digit_run(group)
        .and_then(RegistrantId::parse)
        .ok_or_else(|| fail("no registrant identifier in parenthetical group"))?;

    let company_name = captures
        .name("name")
        .map_or("", |m| m.as_str())
        .trim()
        .to_string();
    if company_name.is_empty() {
        return Err(fail("empty company name"));
    }

    let updated_at = entry
        .updated_at
        .as_deref()
        .ok_or_else(|| fail("entry has no update timestamp"))?;
    let filing_date = filing_day(updated_at).ok_or_else(|| fail("unparseable update timestamp"))?;

    log::trace!(
        "{} entry matched rule '{}': {} ({})",
        category,
        rule.name,
        company_name,
        registrant_id
    );

    Ok(ClassifiedEntry {
        company_name,
        registrant_id,
        filing_date,
        form_code: captures
            .name("code")
            .map_or_else(|| category.code().to_string(), |m| m.as_str().to_string()),
        link: entry.link.clone(),
    })
}

/// Classifies a batch, dropping (and logging) entries that cannot be read.
pub fn classify_all(entries: &[RawEntry], category: FilingCategory) -> Vec<ClassifiedEntry> {
    entries
        .iter()
        .filter_map(|entry| match classify(entry, category) {
            Ok(classified) => Some(classified),
            Err(failure) => {
                log::warn!("Skipping {} entry: {}", category, failure);
                None
            }
        })
        .collect()
}
