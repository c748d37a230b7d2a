//! Deterministic summary used when no summarizer is configured or the
//! summarizer call fails.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::types::ConversationMessage;
use crate::summarize::StructuredSummary;
use crate::Role;

const MAX_TOPICS: usize = 5;
const MAX_POINTS: usize = 3;
const POINT_CHARS: usize = 120;

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "because", "before", "being", "could", "doesn", "there", "their",
    "these", "thing", "things", "think", "those", "would", "should", "which", "while", "where",
    "really", "actually", "maybe", "going", "right", "gonna", "other", "people", "something",
];

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z][A-Za-z'-]{4,}").expect("context: static word pattern must compile")
});

pub fn heuristic_summary(messages: &[ConversationMessage]) -> StructuredSummary {
    let mut speakers: Vec<String> = Vec::new();
    for m in messages {
        let name = match (&m.speaker_name, m.role) {
            (Some(name), _) => name.clone(),
            (None, Role::Assistant) => "AI".to_string(),
            _ => continue,
        };
        if !speakers.contains(&name) {
            speakers.push(name);
        }
    }

    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0;
    for m in messages {
        for word in WORD_RE.find_iter(m.text()) {
            let w = word.as_str().to_lowercase();
            if STOPWORDS.contains(&w.as_str()) {
                continue;
            }
            let entry = counts.entry(w).or_insert_with(|| {
                order += 1;
                (0, order)
            });
            entry.0 += 1;
        }
    }
    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    let topics: Vec<String> = ranked.into_iter().take(MAX_TOPICS).map(|(w, _)| w).collect();

    let mut longest: Vec<&ConversationMessage> = messages.iter().collect();
    longest.sort_by(|a, b| b.text().len().cmp(&a.text().len()));
    let bullet_points = longest
        .into_iter()
        .take(MAX_POINTS)
        .map(|m| {
            let text: String = m.text().chars().take(POINT_CHARS).collect();
            match &m.speaker_name {
                Some(name) => format!("{name}: {text}"),
                None => text,
            }
        })
        .collect();

    let speakers_text = if speakers.is_empty() {
        "unknown".to_string()
    } else {
        speakers.join(", ")
    };
    let mut summary = format!(
        "Earlier conversation ({} messages) between {}.",
        messages.len(),
        speakers_text
    );
    if !topics.is_empty() {
        summary.push_str(&format!(" Main topics: {}.", topics.join(", ")));
    }

    StructuredSummary {
        summary,
        bullet_points,
        topics,
        decisions: Vec::new(),
        action_items: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EntryType, ConversationMessage};

    fn msg(id: &str, role: Role, speaker: Option<&str>, content: &str) -> ConversationMessage {
        ConversationMessage {
            id: id.into(),
            role,
            content: content.into(),
            speaker_id: speaker.map(|s| s.to_lowercase()),
            speaker_name: speaker.map(str::to_string),
            timestamp: chrono::Utc::now(),
            tokens: 1,
            entry_type: EntryType::Ptt,
        }
    }

    #[test]
    fn lists_speakers_in_order_of_appearance() {
        let messages = vec![
            msg("1", Role::User, Some("Bea"), "[Bea]: budget planning"),
            msg("2", Role::Assistant, None, "budget sounds fine"),
            msg("3", Role::User, Some("Al"), "[Al]: budget again"),
            msg("4", Role::User, Some("Bea"), "[Bea]: ok"),
        ];
        let s = heuristic_summary(&messages);
        assert!(s.summary.contains("4 messages"));
        assert!(s.summary.contains("Bea, AI, Al"));
        assert_eq!(s.topics.first().map(String::as_str), Some("budget"));
    }

    #[test]
    fn topics_skip_stopwords_and_short_words() {
        let messages = vec![msg(
            "1",
            Role::User,
            Some("A"),
            "[A]: there there there rocket rocket cat",
        )];
        let s = heuristic_summary(&messages);
        assert_eq!(s.topics, vec!["rocket".to_string()]);
    }

    #[test]
    fn bullet_points_are_attributed_and_bounded() {
        let long = "x".repeat(500);
        let messages = vec![msg("1", Role::User, Some("Al"), &format!("[Al]: {long}"))];
        let s = heuristic_summary(&messages);
        assert_eq!(s.bullet_points.len(), 1);
        assert!(s.bullet_points[0].starts_with("Al: "));
        assert_eq!(s.bullet_points[0].len(), "Al: ".len() + POINT_CHARS);
    }

    #[test]
    fn empty_input_still_produces_text() {
        let s = heuristic_summary(&[]);
        assert!(s.summary.contains("0 messages"));
        assert!(s.bullet_points.is_empty());
    }
}
