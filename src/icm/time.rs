// src/icm/time.rs
// Time classification: resolve temporal expressions into a window

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::IcmMode;
use crate::error::{MemoryError, Result};
use crate::llm::LlmClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    #[default]
    Unknown,
}

/// Time classification result. `start_time`/`end_time` are ISO-8601 strings
/// (UTC) or null when the text carries no temporal scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeResult {
    pub time_expression: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub resolution_confidence: f32,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default)]
    pub notes: String,
}

impl TimeResult {
    /// Parse the ISO window into UTC instants, dropping halves that fail to
    /// parse.
    pub fn window(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (parse_iso(&self.start_time), parse_iso(&self.end_time))
    }
}

pub fn parse_iso(value: &Option<String>) -> Option<DateTime<Utc>> {
    let value = value.as_ref()?;
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Maps user text plus a reference instant and timezone offset into a time
/// window. Pure function of its inputs in offline mode.
pub struct TimeClassifier {
    mode: IcmMode,
    llm: Option<Arc<LlmClient>>,
}

impl TimeClassifier {
    pub fn new(mode: IcmMode, llm: Option<Arc<LlmClient>>) -> Self {
        Self { mode, llm }
    }

    pub async fn resolve(
        &self,
        text: &str,
        now: DateTime<Utc>,
        tz_offset_minutes: Option<i32>,
    ) -> Result<TimeResult> {
        match self.mode {
            IcmMode::Offline => Ok(Self::resolve_offline(text, now, tz_offset_minutes)),
            IcmMode::Llm => self.resolve_llm(text, now, tz_offset_minutes).await,
        }
    }

    /// Deterministic resolution of common expressions in the caller's local
    /// timezone, emitted as UTC.
    fn resolve_offline(text: &str, now: DateTime<Utc>, tz_offset_minutes: Option<i32>) -> TimeResult {
        let lower = text.to_lowercase();
        let local_now = to_local(now, tz_offset_minutes);

        let (window, granularity) = if lower.contains("yesterday") {
            let start = local_midnight(&local_now) - Duration::days(1);
            (Some((start, start + Duration::days(1))), Granularity::Day)
        } else if lower.contains("last week") || lower.contains("past week") {
            let start = local_midnight(&local_now) - Duration::days(7);
            let end = local_midnight(&local_now) + Duration::days(1) - Duration::seconds(1);
            (Some((start, end)), Granularity::Week)
        } else if lower.contains("today") || lower.contains("this morning") {
            let start = local_midnight(&local_now);
            (Some((start, start + Duration::days(1))), Granularity::Day)
        } else if lower.contains("last month") || lower.contains("past month") {
            let start = local_midnight(&local_now) - Duration::days(30);
            let end = local_midnight(&local_now) + Duration::days(1) - Duration::seconds(1);
            (Some((start, end)), Granularity::Month)
        } else {
            (None, Granularity::Unknown)
        };

        let (start_iso, end_iso) = match window {
            Some((start, end)) => (
                Some(start.with_timezone(&Utc).to_rfc3339()),
                Some(end.with_timezone(&Utc).to_rfc3339()),
            ),
            None => (None, None),
        };

        debug!(
            expression = %text,
            resolved = start_iso.is_some(),
            "Offline time resolution"
        );

        TimeResult {
            time_expression: text.trim().to_string(),
            resolution_confidence: if start_iso.is_some() { 0.8 } else { 0.3 },
            start_time: start_iso,
            end_time: end_iso,
            granularity,
            notes: "offline heuristic".to_string(),
        }
    }

    async fn resolve_llm(
        &self,
        text: &str,
        now: DateTime<Utc>,
        tz_offset_minutes: Option<i32>,
    ) -> Result<TimeResult> {
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| MemoryError::Classifier("LLM mode without LLM client".into()))?;

        let prompt = format!(
            "Resolve any temporal expression in the user's message into an absolute UTC window.\n\
             Reference instant: {} (UTC). Caller timezone offset minutes: {}.\n\
             Respond with only a JSON object with fields: time_expression (string),\n\
             start_time (ISO-8601 string or null), end_time (ISO-8601 string or null),\n\
             resolution_confidence (0..1),\n\
             granularity (one of \"minute\", \"hour\", \"day\", \"week\", \"month\", \"unknown\"),\n\
             notes (string).\n\nMessage: {}",
            now.to_rfc3339(),
            tz_offset_minutes.unwrap_or(0),
            text
        );

        let raw = llm
            .generate_json(&prompt)
            .await
            .map_err(|e| MemoryError::Classifier(e.to_string()))?;

        serde_json::from_value(raw)
            .map_err(|e| MemoryError::Classifier(format!("bad time schema: {e}")))
    }
}

fn to_local(now: DateTime<Utc>, tz_offset_minutes: Option<i32>) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(tz_offset_minutes.unwrap_or(0) * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
    now.with_timezone(&offset)
}

fn local_midnight(local: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    local
        .timezone()
        .with_ymd_and_hms(
            local.date_naive().year(),
            local.date_naive().month(),
            local.date_naive().day(),
            0,
            0,
            0,
        )
        .single()
        .unwrap_or(*local)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> DateTime<Utc> {
        "2024-02-15T13:30:00Z".parse().unwrap()
    }

    #[tokio::test]
    async fn yesterday_resolves_to_full_day() {
        let classifier = TimeClassifier::new(IcmMode::Offline, None);
        let result = classifier
            .resolve("what did we decide yesterday?", reference(), None)
            .await
            .unwrap();

        assert_eq!(result.granularity, Granularity::Day);
        let (start, end) = result.window();
        assert_eq!(start.unwrap(), "2024-02-14T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(end.unwrap(), "2024-02-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[tokio::test]
    async fn timezone_offset_shifts_window() {
        let classifier = TimeClassifier::new(IcmMode::Offline, None);
        // UTC+2: local midnight is 22:00 UTC the prior day.
        let result = classifier
            .resolve("yesterday", reference(), Some(120))
            .await
            .unwrap();
        let (start, _) = result.window();
        assert_eq!(
            start.unwrap(),
            "2024-02-13T22:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[tokio::test]
    async fn non_temporal_text_yields_null_window() {
        let classifier = TimeClassifier::new(IcmMode::Offline, None);
        let result = classifier
            .resolve("tell me about rust", reference(), None)
            .await
            .unwrap();
        assert!(result.start_time.is_none());
        assert!(result.end_time.is_none());
        assert_eq!(result.granularity, Granularity::Unknown);
        assert!(result.resolution_confidence < 0.5);
    }

    #[tokio::test]
    async fn last_week_spans_seven_days() {
        let classifier = TimeClassifier::new(IcmMode::Offline, None);
        let result = classifier
            .resolve("show me last week", reference(), None)
            .await
            .unwrap();
        assert_eq!(result.granularity, Granularity::Week);
        let (start, end) = result.window();
        assert!(end.unwrap() - start.unwrap() >= Duration::days(7));
    }

    #[test]
    fn iso_parsing_tolerates_null() {
        assert!(parse_iso(&None).is_none());
        assert!(parse_iso(&Some("not-a-date".into())).is_none());
        assert!(parse_iso(&Some("2024-01-01T00:00:00Z".into())).is_some());
    }
}
