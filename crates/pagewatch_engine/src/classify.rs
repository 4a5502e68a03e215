use std::collections::HashSet;
use std::sync::Arc;

use pagewatch_core::{Classification, MonitoredResource, ResourceStatus, ACTIVATED_SUMMARY};

use crate::text::visible_lines;

/// Prefix length, in characters, handed to the change judge.
pub const SNAPSHOT_PREFIX_CHARS: usize = 8_000;

const MAX_LINE_CHARS: usize = 200;

/// Words that on their own only describe when something happened.
const TIME_WORDS: &[&str] = &[
    "ago", "updated", "update", "last", "just", "now", "today", "yesterday", "am", "pm", "utc",
    "gmt", "sec", "secs", "second", "seconds", "min", "mins", "minute", "minutes", "hour",
    "hours", "day", "days", "week", "weeks", "at", "on",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JudgeError {
    #[error("judgment service unavailable: {0}")]
    Unavailable(String),
    #[error("invalid judgment response: {0}")]
    InvalidResponse(String),
}

/// Decides whether snapshot content is worth reporting.
///
/// Implementations must be deterministic for identical inputs. Both methods
/// receive content already truncated to [`SNAPSHOT_PREFIX_CHARS`].
#[async_trait::async_trait]
pub trait ChangeJudge: Send + Sync {
    /// Summary of the notice visible in a first snapshot, or `None` if there is none.
    async fn describe_initial(&self, snapshot: &str) -> Result<Option<String>, JudgeError>;

    /// Summary of what is new when the change is substantive, `None` for noise.
    async fn describe_change(&self, old: &str, new: &str) -> Result<Option<String>, JudgeError>;
}

/// Local judge: compares visible text lines and ignores lines that carry no
/// words besides timestamps and counters.
#[derive(Debug, Clone)]
pub struct HeuristicJudge {
    max_items: usize,
}

impl HeuristicJudge {
    pub fn new() -> Self {
        Self::with_max_items(10)
    }

    pub fn with_max_items(max_items: usize) -> Self {
        Self {
            max_items: max_items.max(1),
        }
    }
}

impl Default for HeuristicJudge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChangeJudge for HeuristicJudge {
    async fn describe_initial(&self, snapshot: &str) -> Result<Option<String>, JudgeError> {
        let first = visible_lines(snapshot)
            .into_iter()
            .find(|line| !is_noise(line));
        Ok(first.map(|line| format!("Latest entry: {}", clip(&line))))
    }

    async fn describe_change(&self, old: &str, new: &str) -> Result<Option<String>, JudgeError> {
        let known: HashSet<String> = complete_lines(old).into_iter().collect();
        let mut seen = HashSet::new();
        let added: Vec<String> = complete_lines(new)
            .into_iter()
            .filter(|line| !known.contains(line) && !is_noise(line))
            .filter(|line| seen.insert(line.clone()))
            .collect();

        if added.is_empty() {
            return Ok(None);
        }

        let mut summary = String::from("New content:");
        for line in added.iter().take(self.max_items) {
            summary.push_str("\n- ");
            summary.push_str(&clip(line));
        }
        if added.len() > self.max_items {
            summary.push_str(&format!("\n…and {} more", added.len() - self.max_items));
        }
        Ok(Some(summary))
    }
}

/// Visible lines of a judged prefix. A prefix that reached the limit may end
/// inside a line, so that trailing line is dropped.
fn complete_lines(prefix: &str) -> Vec<String> {
    let mut lines = visible_lines(prefix);
    if prefix.chars().count() >= SNAPSHOT_PREFIX_CHARS {
        lines.pop();
    }
    lines
}

fn is_noise(line: &str) -> bool {
    !line
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .any(|word| !TIME_WORDS.contains(&word.to_lowercase().as_str()))
}

fn clip(line: &str) -> String {
    let clipped = truncate_chars(line, MAX_LINE_CHARS);
    if clipped.len() < line.len() {
        format!("{clipped}…")
    } else {
        clipped.to_string()
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Classifies a fresh snapshot against the resource's stored one.
#[derive(Clone)]
pub struct ChangeClassifier {
    judge: Arc<dyn ChangeJudge>,
    prefix_chars: usize,
}

impl ChangeClassifier {
    pub fn new(judge: Arc<dyn ChangeJudge>) -> Self {
        Self {
            judge,
            prefix_chars: SNAPSHOT_PREFIX_CHARS,
        }
    }

    /// Exact equality uses the full snapshots; the judge only ever sees the
    /// truncated prefixes of both sides.
    pub async fn classify(
        &self,
        resource: &MonitoredResource,
        new_snapshot: &str,
    ) -> Result<Classification, JudgeError> {
        if resource.status == ResourceStatus::Inactive || !resource.has_snapshot() {
            let notice = self
                .judge
                .describe_initial(truncate_chars(new_snapshot, self.prefix_chars))
                .await?;
            return Ok(match notice.filter(|summary| !summary.trim().is_empty()) {
                Some(summary) => Classification::FirstObservation {
                    summary,
                    notice_found: true,
                },
                None => Classification::FirstObservation {
                    summary: ACTIVATED_SUMMARY.to_string(),
                    notice_found: false,
                },
            });
        }

        if new_snapshot == resource.last_content_snapshot {
            return Ok(Classification::Unchanged { identical: true });
        }

        let old = truncate_chars(&resource.last_content_snapshot, self.prefix_chars);
        let new = truncate_chars(new_snapshot, self.prefix_chars);
        if old == new {
            return Ok(Classification::Unchanged { identical: false });
        }

        let verdict = self.judge.describe_change(old, new).await?;
        Ok(match verdict.filter(|summary| !summary.trim().is_empty()) {
            Some(summary) => Classification::Changed { summary },
            None => Classification::Unchanged { identical: false },
        })
    }
}
