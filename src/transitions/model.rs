use super::error::{TransitionError, TransitionResult};
use serde::{Deserialize, Serialize};

const STATUS_DRAFT: &str = "draft";
const STATUS_APPLIED: &str = "applied";
const STATUS_REVERTED: &str = "reverted";

/// Lifecycle tag. Only ever moves Draft -> Applied -> Reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionStatus {
    Draft,
    Applied,
    Reverted,
}

impl TransitionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => STATUS_DRAFT,
            Self::Applied => STATUS_APPLIED,
            Self::Reverted => STATUS_REVERTED,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            STATUS_DRAFT => Some(Self::Draft),
            STATUS_APPLIED => Some(Self::Applied),
            STATUS_REVERTED => Some(Self::Reverted),
            _ => None,
        }
    }

    pub fn ensure_editable(self) -> TransitionResult<()> {
        if self == Self::Draft {
            return Ok(());
        }
        Err(TransitionError::conflict(
            format!("cannot modify transition in status {}", self.as_str()),
            self,
        ))
    }

    pub fn ensure_deletable(self) -> TransitionResult<()> {
        if self == Self::Draft {
            return Ok(());
        }
        Err(TransitionError::conflict(
            format!("cannot delete transition in status {}", self.as_str()),
            self,
        ))
    }

    pub fn ensure_can_apply(self, mapping_count: usize) -> TransitionResult<()> {
        match self {
            Self::Applied => Err(TransitionError::conflict("transition already applied", self)),
            Self::Reverted => Err(TransitionError::conflict("transition already reverted", self)),
            Self::Draft if mapping_count == 0 => Err(TransitionError::conflict(
                "transition must be draft with mappings",
                self,
            )),
            Self::Draft => Ok(()),
        }
    }

    pub fn ensure_can_revert(self) -> TransitionResult<()> {
        match self {
            Self::Applied => Ok(()),
            Self::Draft => Err(TransitionError::conflict("transition not applied yet", self)),
            Self::Reverted => Err(TransitionError::conflict("transition already reverted", self)),
        }
    }

    pub fn can_revert(self) -> bool {
        self == Self::Applied
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub transition_id: String,
    pub from_class: String,
    /// `None` graduates everyone in `from_class`.
    pub to_class: Option<String>,
}

impl Mapping {
    pub fn is_graduation(&self) -> bool {
        self.to_class.is_none()
    }
}

/// Caller-supplied rule, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingInput {
    pub from_class: String,
    #[serde(default)]
    pub to_class: Option<String>,
}

#[cfg(test)]
impl MappingInput {
    pub fn new(from_class: &str, to_class: Option<&str>) -> Self {
        Self {
            from_class: from_class.to_string(),
            to_class: to_class.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub id: String,
    pub academic_year: String,
    pub status: TransitionStatus,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub applied_at: Option<String>,
    pub applied_by: Option<String>,
    pub reverted_at: Option<String>,
    pub reverted_by: Option<String>,
    pub mappings: Vec<Mapping>,
}

#[derive(Debug, Clone)]
pub struct NewTransition {
    pub academic_year: String,
    pub notes: Option<String>,
    pub mappings: Vec<MappingInput>,
    pub created_by: String,
}

/// Partial update. `None` on any field leaves it untouched; `notes: Some(None)`
/// clears the notes and `mappings: Some(vec![])` removes every rule.
#[derive(Debug, Clone, Default)]
pub struct TransitionPatch {
    pub academic_year: Option<String>,
    pub notes: Option<Option<String>>,
    pub mappings: Option<Vec<MappingInput>>,
}

impl TransitionPatch {
    pub fn is_empty(&self) -> bool {
        self.academic_year.is_none() && self.notes.is_none() && self.mappings.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: Option<u32>,
    pub status: Option<TransitionStatus>,
    pub academic_year: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPage {
    pub transitions: Vec<Transition>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Promoted,
    Graduated,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Promoted => "promoted",
            Self::Graduated => "graduated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "promoted" => Some(Self::Promoted),
            "graduated" => Some(Self::Graduated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub transition_id: String,
    pub student_id: String,
    pub person_name: String,
    pub from_class: String,
    pub to_class: Option<String>,
    pub action: HistoryAction,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingAction {
    Promote,
    Graduate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingImpact {
    pub from_class: String,
    pub to_class: Option<String>,
    pub action: MappingAction,
    pub student_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCount {
    pub class_name: String,
    pub student_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub transition_id: String,
    pub status: TransitionStatus,
    pub total_students: i64,
    pub to_promote: i64,
    pub to_graduate: i64,
    pub by_mapping: Vec<MappingImpact>,
    pub unmapped_classes: Vec<ClassCount>,
    pub warnings: Vec<String>,
}

/// Shared result shape of apply and revert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub transition_id: String,
    pub status: TransitionStatus,
    pub students_promoted: i64,
    pub students_graduated: i64,
    pub can_revert: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionReason {
    NextGrade,
    FinalGrade,
    NoPattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedMapping {
    pub from_class: String,
    pub to_class: Option<String>,
    pub action: MappingAction,
    pub reason: SuggestionReason,
    pub student_count: i64,
}
