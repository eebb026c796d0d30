use super::error::{TransitionError, TransitionResult};
use super::model::MappingInput;
use std::collections::HashSet;

pub fn normalize_academic_year(raw: &str) -> TransitionResult<String> {
    let year = raw.trim();
    if year.is_empty() {
        return Err(TransitionError::validation("academicYear must not be empty"));
    }
    Ok(year.to_string())
}

pub fn normalize_notes(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn normalize_actor(raw: &str) -> TransitionResult<String> {
    let actor = raw.trim();
    if actor.is_empty() {
        return Err(TransitionError::validation("actorId must not be empty"));
    }
    Ok(actor.to_string())
}

/// Trims labels and folds a blank target into graduation. The first bad
/// entry fails the whole set.
pub fn normalize_mappings(inputs: &[MappingInput]) -> TransitionResult<Vec<MappingInput>> {
    let mut seen = HashSet::<String>::new();
    let mut out = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        let from_class = input.from_class.trim().to_string();
        if from_class.is_empty() {
            return Err(TransitionError::validation(format!(
                "mappings[{}].fromClass must not be empty",
                i
            )));
        }
        let to_class = input
            .to_class
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if to_class.as_deref() == Some(from_class.as_str()) {
            return Err(TransitionError::validation(format!(
                "mappings[{}]: fromClass and toClass must differ ({})",
                i, from_class
            )));
        }
        if !seen.insert(from_class.clone()) {
            return Err(TransitionError::validation(format!(
                "duplicate fromClass: {}",
                from_class
            )));
        }
        out.push(MappingInput {
            from_class,
            to_class,
        });
    }
    Ok(out)
}
