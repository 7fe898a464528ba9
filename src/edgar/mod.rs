pub mod classify;
pub mod client;
pub mod facts;
pub mod feed;
pub mod filing;
pub mod prospectus;
pub mod rate_limiter;
pub mod report;
pub mod utils;

pub use classify::{classify, ClassifiedEntry};
pub use client::{EdgarClient, EdgarConfig, FactsSource, FeedSource};
pub use facts::FinancialFacts;
pub use feed::{parse_feed, FeedEntries, RawEntry};
pub use report::FilingCategory;
