use serde::Serialize;

/// Summary stored when a first observation finds no discernible notice.
pub const ACTIVATED_SUMMARY: &str = "Monitoring activated.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOutcome {
    FirstObservation,
    Unchanged,
    Changed,
}

/// Result of comparing a freshly extracted snapshot with the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    FirstObservation {
        summary: String,
        notice_found: bool,
    },
    /// `identical` is false when the content differed but was judged noise.
    Unchanged { identical: bool },
    Changed { summary: String },
}

impl Classification {
    pub fn outcome(&self) -> ChangeOutcome {
        match self {
            Classification::FirstObservation { .. } => ChangeOutcome::FirstObservation,
            Classification::Unchanged { .. } => ChangeOutcome::Unchanged,
            Classification::Changed { .. } => ChangeOutcome::Changed,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        match self {
            Classification::FirstObservation { summary, .. } | Classification::Changed { summary } => {
                Some(summary)
            }
            Classification::Unchanged { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Fetch, extraction and classification finished for a resource.
    CheckSucceeded {
        snapshot: String,
        classification: Classification,
    },
    /// Fetch or classification failed; the reason is only logged.
    CheckFailed { reason: String },
}
