use super::error::TransitionResult;
use super::model::{MappingAction, SuggestedMapping, SuggestionReason};
use super::settings::TransitionSettings;
use crate::roster;
use regex::Regex;
use rusqlite::Connection;
use std::sync::OnceLock;
use tracing::debug;

fn class_label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)([A-Za-z]+)$").expect("static class label pattern"))
}

/// `<digits><letters>` labels move up one grade unless the grade is terminal;
/// any other label is suggested for graduation.
pub fn suggest_for_label(label: &str, graduation_grade: u32) -> (Option<String>, SuggestionReason) {
    let Some(caps) = class_label_pattern().captures(label) else {
        return (None, SuggestionReason::NoPattern);
    };
    let letters = &caps[2];
    match caps[1].parse::<u32>() {
        Ok(grade) if grade < graduation_grade => (
            Some(format!("{}{}", grade + 1, letters)),
            SuggestionReason::NextGrade,
        ),
        // Overflowing grade numbers are far past any terminal grade.
        _ => (None, SuggestionReason::FinalGrade),
    }
}

pub fn suggest_for_classes(
    classes: &[(String, i64)],
    graduation_grade: u32,
) -> Vec<SuggestedMapping> {
    let mut out: Vec<SuggestedMapping> = classes
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(label, count)| {
            let (to_class, reason) = suggest_for_label(label, graduation_grade);
            SuggestedMapping {
                from_class: label.clone(),
                action: if to_class.is_some() {
                    MappingAction::Promote
                } else {
                    MappingAction::Graduate
                },
                to_class,
                reason,
                student_count: *count,
            }
        })
        .collect();
    out.sort_by(|a, b| a.from_class.cmp(&b.from_class));
    out
}

/// Advisory only; nothing is written.
pub fn suggest_mappings(conn: &Connection) -> TransitionResult<Vec<SuggestedMapping>> {
    let settings = TransitionSettings::load(conn)?;
    let classes = roster::class_counts(conn)?;
    let out = suggest_for_classes(&classes, settings.graduation_grade);
    debug!(classes = classes.len(), suggestions = out.len(), "mappings suggested");
    Ok(out)
}
