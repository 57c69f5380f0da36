use crate::types::{CollectSpec, SourceType};
use serde_json::Value;

/// How a source type expresses "how far back to look".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    /// A relative window string such as `"today 3-d"` under the given key.
    RelativeWindow(&'static str),
    /// An integer day count under the given key.
    DaysBack(&'static str),
    /// The adapter applies its own recency default.
    Native,
}

impl SourceType {
    pub fn time_filter(&self) -> TimeFilter {
        match self {
            SourceType::Pytrends => TimeFilter::RelativeWindow("timeframe"),
            SourceType::Youtube => TimeFilter::DaysBack("days_back"),
            SourceType::Reddit | SourceType::Telegram | SourceType::Twitter | SourceType::Gnews => {
                TimeFilter::Native
            }
        }
    }
}

/// Fills in the source's time filter from the cycle's `days_back`.
/// Caller-supplied values are never overwritten and `days_back` is forwarded
/// as-is, without range checks.
pub fn normalize(source_type: SourceType, collect_spec: &CollectSpec, days_back: u32) -> CollectSpec {
    let mut spec = collect_spec.clone();

    match source_type.time_filter() {
        TimeFilter::RelativeWindow(key) => {
            spec.entry(key)
                .or_insert_with(|| Value::String(format!("today {}-d", days_back)));
        }
        TimeFilter::DaysBack(key) => {
            spec.entry(key).or_insert_with(|| Value::from(days_back));
        }
        TimeFilter::Native => {}
    }

    spec
}
