use crate::types::{CollectionOutcome, SourceType};
use serde_json::Value;
use tracing::debug;

const RULE: &str = "============================================================";

const REDDIT_MAX_POSTS: usize = 50;
const REDDIT_SELFTEXT_CHARS: usize = 500;
const YOUTUBE_MAX_VIDEOS: usize = 20;
const YOUTUBE_TRANSCRIPT_CHARS: usize = 1000;
const TWITTER_MAX_TWEETS: usize = 100;
const TELEGRAM_MAX_MESSAGES: usize = 100;
const TELEGRAM_TEXT_CHARS: usize = 200;
const GNEWS_MAX_ARTICLES: usize = 50;
const GNEWS_DESCRIPTION_CHARS: usize = 500;
const TRENDS_TAIL_POINTS: usize = 10;
const TRENDS_TOP_QUERIES: usize = 5;

/// Renders every successful outcome into one document for summarization.
/// Failures are skipped. The output depends only on the outcomes given.
pub fn aggregate(outcomes: &[CollectionOutcome]) -> String {
    let mut sections: Vec<String> = Vec::new();

    for outcome in outcomes {
        let CollectionOutcome::Success {
            source_type,
            item_count,
            payload,
            source_info,
            ..
        } = outcome
        else {
            continue;
        };

        sections.push(format!("\n{}", RULE));
        sections.push(format!("SOURCE: {}", source_type.as_str().to_uppercase()));
        sections.push(format!("INFO: {}", Value::Object(source_info.clone())));
        sections.push(format!("ITEMS: {}", item_count));
        sections.push(format!("{}\n", RULE));
        sections.push(render_payload(*source_type, payload, *item_count));
    }

    let document = sections.join("\n");
    debug!("Aggregated {} outcomes into {} chars", outcomes.len(), document.len());
    document
}

fn render_payload(source_type: SourceType, payload: &Value, item_count: usize) -> String {
    let items = payload.as_array();
    match (source_type, items) {
        (SourceType::Pytrends, _) => format_trends(payload),
        (SourceType::Reddit, Some(items)) => format_reddit(items),
        (SourceType::Youtube, Some(items)) => format_youtube(items),
        (SourceType::Twitter, Some(items)) => format_twitter(items),
        (SourceType::Telegram, Some(items)) => format_telegram(items),
        (SourceType::Gnews, Some(items)) => format_gnews(items),
        (_, None) => format!("[{} items from {}]", item_count, source_type),
    }
}

fn format_reddit(posts: &[Value]) -> String {
    let mut lines = Vec::new();
    for post in posts.iter().take(REDDIT_MAX_POSTS) {
        lines.push(format!("\nPost: {}", text(post, "title", "No title")));
        lines.push(format!("Subreddit: r/{}", text(post, "subreddit", "unknown")));
        lines.push(format!(
            "Score: {} | Comments: {}",
            text(post, "score", "0"),
            text(post, "num_comments", "0")
        ));
        if let Some(selftext) = non_empty(post, "selftext") {
            lines.push(format!("Content: {}...", truncate(selftext, REDDIT_SELFTEXT_CHARS)));
        }
    }
    lines.join("\n")
}

fn format_youtube(videos: &[Value]) -> String {
    let mut lines = Vec::new();
    for video in videos.iter().take(YOUTUBE_MAX_VIDEOS) {
        lines.push(format!("\nVideo: {}", text(video, "title", "No title")));
        lines.push(format!("Channel: {}", text(video, "channel", "unknown")));
        lines.push(format!(
            "Duration: {}s | Views: {}",
            text(video, "duration", "0"),
            text(video, "view_count", "0")
        ));
        if let Some(transcript) = non_empty(video, "transcript") {
            lines.push(format!("Transcript: {}...", truncate(transcript, YOUTUBE_TRANSCRIPT_CHARS)));
        }
    }
    lines.join("\n")
}

fn format_twitter(tweets: &[Value]) -> String {
    let mut lines = Vec::new();
    for tweet in tweets.iter().take(TWITTER_MAX_TWEETS) {
        lines.push(format!("\nTweet: {}", text(tweet, "text", "No text")));
        lines.push(format!(
            "Likes: {} | Retweets: {}",
            text(tweet, "like_count", "0"),
            text(tweet, "retweet_count", "0")
        ));
    }
    lines.join("\n")
}

fn format_telegram(messages: &[Value]) -> String {
    let mut lines = Vec::new();
    for message in messages.iter().take(TELEGRAM_MAX_MESSAGES) {
        let body = non_empty(message, "text").unwrap_or("No text");
        lines.push(format!(
            "\n[{}] {}",
            text(message, "channel", "unknown"),
            truncate(body, TELEGRAM_TEXT_CHARS)
        ));
    }
    lines.join("\n")
}

fn format_gnews(articles: &[Value]) -> String {
    let mut lines = Vec::new();
    for article in articles.iter().take(GNEWS_MAX_ARTICLES) {
        lines.push(format!("\nArticle: {}", text(article, "title", "No title")));
        lines.push(format!("Source: {}", text(article, "source_name", "unknown")));
        lines.push(format!("Published: {}", text(article, "published_at", "unknown")));
        let description = text(article, "description", "No description");
        lines.push(format!("Description: {}", truncate(&description, GNEWS_DESCRIPTION_CHARS)));
    }
    lines.join("\n")
}

fn format_trends(trends: &Value) -> String {
    let mut lines = Vec::new();

    let interest = trends
        .get("interest_over_time")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if !interest.is_empty() {
        lines.push(format!("\nTrend Data Points: {}", interest.len()));
        lines.push("Recent trends:".to_string());
        let tail = &interest[interest.len().saturating_sub(TRENDS_TAIL_POINTS)..];
        for point in tail {
            lines.push(format!(
                "  {}: {} = {}",
                text(point, "date", "unknown"),
                text(point, "keyword", "unknown"),
                text(point, "interest", "0")
            ));
        }
    }

    // serde_json maps iterate in key order, which keeps this stable.
    if let Some(related) = trends.get("related_queries_top").and_then(Value::as_object) {
        if !related.is_empty() {
            lines.push("\nTop Related Queries:".to_string());
            for (keyword, queries) in related {
                lines.push(format!("  {}:", keyword));
                let queries = queries.as_array().map(Vec::as_slice).unwrap_or_default();
                for query in queries.iter().take(TRENDS_TOP_QUERIES) {
                    lines.push(format!(
                        "    - {} ({})",
                        text(query, "query", "unknown"),
                        text(query, "value", "0")
                    ));
                }
            }
        }
    }

    lines.join("\n")
}

/// Field as display text; strings are unquoted, null or missing give `default`.
fn text(item: &Value, key: &str, default: &str) -> String {
    match item.get(key) {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn non_empty<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
