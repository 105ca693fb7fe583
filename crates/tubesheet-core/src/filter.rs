//! Per-job video filters: duration window, keyword, publish-date floor.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::VideoRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordMode {
    /// Title or description.
    #[default]
    AnyMatch,
    TitleOnly,
    DescriptionOnly,
}

impl KeywordMode {
    pub fn as_str(self) -> &'static str {
        match self {
            KeywordMode::AnyMatch => "any_match",
            KeywordMode::TitleOnly => "title_only",
            KeywordMode::DescriptionOnly => "description_only",
        }
    }
}

impl FromStr for KeywordMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "any" | "any_match" => Ok(KeywordMode::AnyMatch),
            "title" | "title_only" => Ok(KeywordMode::TitleOnly),
            "description" | "description_only" => Ok(KeywordMode::DescriptionOnly),
            other => Err(format!(
                "unknown keyword mode '{other}' \
                 (expected any_match, title_only or description_only)"
            )),
        }
    }
}

/// Filter settings; every field is optional and unset fields accept everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Inclusive lower bound, in seconds.
    pub min_duration_seconds: Option<u64>,
    /// Inclusive upper bound, in seconds.
    pub max_duration_seconds: Option<u64>,
    /// Case-insensitive substring; empty means no keyword filter.
    pub keyword: String,
    pub keyword_mode: KeywordMode,
    /// Videos published at or after this instant pass.
    pub published_after: Option<DateTime<Utc>>,
}

impl FilterConfig {
    pub fn is_empty(&self) -> bool {
        self.min_duration_seconds.is_none()
            && self.max_duration_seconds.is_none()
            && self.keyword.trim().is_empty()
            && self.published_after.is_none()
    }
}

/// True when `video` passes every enabled constraint.
///
/// Checks run in a fixed order (duration, keyword, publish floor) and stop at
/// the first failure. A video whose duration is unknown fails any enabled
/// duration bound; one without a publish date fails an enabled floor.
pub fn matches(video: &VideoRecord, config: &FilterConfig) -> bool {
    duration_ok(video, config) && keyword_ok(video, config) && published_ok(video, config)
}

/// Keep the videos that pass `config`, in their original order.
pub fn apply(videos: Vec<VideoRecord>, config: &FilterConfig) -> Vec<VideoRecord> {
    if config.is_empty() {
        return videos;
    }
    videos.into_iter().filter(|v| matches(v, config)).collect()
}

fn duration_ok(video: &VideoRecord, config: &FilterConfig) -> bool {
    if config.min_duration_seconds.is_none() && config.max_duration_seconds.is_none() {
        return true;
    }
    let Some(secs) = video.duration_seconds else {
        return false;
    };
    config.min_duration_seconds.map_or(true, |min| secs >= min)
        && config.max_duration_seconds.map_or(true, |max| secs <= max)
}

fn keyword_ok(video: &VideoRecord, config: &FilterConfig) -> bool {
    let needle = config.keyword.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    let contains = |haystack: &str| haystack.to_lowercase().contains(&needle);
    match config.keyword_mode {
        KeywordMode::AnyMatch => contains(&video.title) || contains(&video.description),
        KeywordMode::TitleOnly => contains(&video.title),
        KeywordMode::DescriptionOnly => contains(&video.description),
    }
}

fn published_ok(video: &VideoRecord, config: &FilterConfig) -> bool {
    match (config.published_after, video.published_at) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(floor), Some(at)) => at >= floor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn video(title: &str, description: &str, secs: Option<u64>) -> VideoRecord {
        VideoRecord {
            id: "v1".into(),
            title: title.into(),
            description: description.into(),
            published_at: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
            duration_seconds: secs,
            view_count: 10,
            like_count: 1,
            comment_count: 0,
            channel_id: "UC1".into(),
            channel_title: "Chan".into(),
        }
    }

    #[test]
    fn empty_config_accepts_everything() {
        let cfg = FilterConfig::default();
        assert!(cfg.is_empty());
        assert!(matches(&video("a", "b", None), &cfg));
    }

    #[test]
    fn duration_bounds_are_inclusive() {
        let cfg = FilterConfig {
            min_duration_seconds: Some(60),
            max_duration_seconds: Some(600),
            ..Default::default()
        };
        assert!(matches(&video("t", "", Some(60)), &cfg));
        assert!(matches(&video("t", "", Some(600)), &cfg));
        assert!(!matches(&video("t", "", Some(59)), &cfg));
        assert!(!matches(&video("t", "", Some(601)), &cfg));
    }

    #[test]
    fn unknown_duration_fails_enabled_bounds() {
        let only_max = FilterConfig {
            max_duration_seconds: Some(600),
            ..Default::default()
        };
        assert!(!matches(&video("t", "", None), &only_max));
        assert!(matches(&video("t", "", None), &FilterConfig::default()));
    }

    #[test]
    fn keyword_modes_are_case_insensitive() {
        let v = video("Rust Async Deep Dive", "all about Tokio", Some(100));
        let mut cfg = FilterConfig {
            keyword: "TOKIO".into(),
            ..Default::default()
        };
        assert!(matches(&v, &cfg));
        cfg.keyword_mode = KeywordMode::TitleOnly;
        assert!(!matches(&v, &cfg));
        cfg.keyword = "deep dive".into();
        assert!(matches(&v, &cfg));
        cfg.keyword_mode = KeywordMode::DescriptionOnly;
        assert!(!matches(&v, &cfg));
    }

    #[test]
    fn publish_floor_is_inclusive() {
        let v = video("t", "", Some(100));
        let at = v.published_at.unwrap();
        let mut cfg = FilterConfig {
            published_after: Some(at),
            ..Default::default()
        };
        assert!(matches(&v, &cfg));
        cfg.published_after = Some(at + chrono::Duration::seconds(1));
        assert!(!matches(&v, &cfg));

        let mut undated = v.clone();
        undated.published_at = None;
        cfg.published_after = Some(at);
        assert!(!matches(&undated, &cfg));
    }

    #[test]
    fn constraints_are_anded() {
        let cfg = FilterConfig {
            min_duration_seconds: Some(10),
            keyword: "rust".into(),
            ..Default::default()
        };
        assert!(matches(&video("rust", "", Some(20)), &cfg));
        assert!(!matches(&video("rust", "", Some(5)), &cfg));
        assert!(!matches(&video("go", "", Some(20)), &cfg));
    }

    #[test]
    fn apply_keeps_order() {
        let cfg = FilterConfig {
            min_duration_seconds: Some(10),
            ..Default::default()
        };
        let mut a = video("a", "", Some(20));
        a.id = "a".into();
        let mut b = video("b", "", Some(5));
        b.id = "b".into();
        let mut c = video("c", "", Some(30));
        c.id = "c".into();
        let kept: Vec<String> = apply(vec![a, b, c], &cfg)
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(kept, vec!["a", "c"]);
    }

    #[test]
    fn keyword_mode_parses() {
        assert_eq!(
            "title".parse::<KeywordMode>().unwrap(),
            KeywordMode::TitleOnly
        );
        assert_eq!(
            "description-only".parse::<KeywordMode>().unwrap(),
            KeywordMode::DescriptionOnly
        );
        assert!("nope".parse::<KeywordMode>().is_err());
        let json = serde_json::to_string(&KeywordMode::AnyMatch).unwrap();
        assert_eq!(json, "\"any_match\"");
    }
}
