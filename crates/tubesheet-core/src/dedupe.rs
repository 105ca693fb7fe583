//! Drop videos already written to a destination, and repeats within one fetch.

use std::collections::HashSet;

use crate::model::VideoRecord;

/// Keep, in input order, every candidate whose id is neither in `known_ids`
/// nor seen earlier in `candidates`. Returns the kept records and the known
/// set extended with their ids. Running it again on its own output keeps
/// nothing new.
pub fn dedupe(
    candidates: Vec<VideoRecord>,
    mut known_ids: HashSet<String>,
) -> (Vec<VideoRecord>, HashSet<String>) {
    let mut kept = Vec::with_capacity(candidates.len());
    for video in candidates {
        if known_ids.insert(video.id.clone()) {
            kept.push(video);
        }
    }
    (kept, known_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str) -> VideoRecord {
        VideoRecord {
            id: id.to_string(),
            title: format!("video {id}"),
            description: String::new(),
            published_at: None,
            duration_seconds: None,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            channel_id: "UC1".into(),
            channel_title: String::new(),
        }
    }

    fn ids(v: &[VideoRecord]) -> Vec<&str> {
        v.iter().map(|v| v.id.as_str()).collect()
    }

    #[test]
    fn removes_known_and_repeated_ids_keeping_order() {
        let known: HashSet<String> = ["b".to_string()].into();
        let (kept, known) = dedupe(
            vec![video("c"), video("b"), video("a"), video("c"), video("d")],
            known,
        );
        assert_eq!(ids(&kept), vec!["c", "a", "d"]);
        assert_eq!(known.len(), 4);
        assert!(known.contains("d"));
    }

    #[test]
    fn idempotent() {
        let input = vec![video("x"), video("y"), video("x")];
        let (first, known) = dedupe(input.clone(), HashSet::new());
        let (second, known_again) = dedupe(input, known.clone());
        assert_eq!(ids(&first), vec!["x", "y"]);
        assert!(second.is_empty());
        assert_eq!(known, known_again);
    }

    #[test]
    fn empty_input() {
        let (kept, known) = dedupe(Vec::new(), HashSet::new());
        assert!(kept.is_empty());
        assert!(known.is_empty());
    }
}
