use super::error::{TransitionError, TransitionResult};
use super::model::{ClassCount, Mapping, MappingAction, MappingImpact, Preview, Transition};
use super::store;
use crate::roster;
use rusqlite::Connection;
use std::collections::HashSet;
use tracing::debug;

/// Read-only simulation of what apply would do right now.
pub fn preview_transition(conn: &Connection, id: &str) -> TransitionResult<Preview> {
    let transition =
        store::load_transition(conn, id)?.ok_or_else(TransitionError::transition_not_found)?;
    let mut live = Vec::with_capacity(transition.mappings.len());
    for m in &transition.mappings {
        live.push(roster::count_in_class(conn, &m.from_class)?);
    }
    let class_counts = roster::class_counts(conn)?;
    let preview = build_preview(&transition, &live, &class_counts);
    debug!(
        transition_id = %id,
        total = preview.total_students,
        unmapped = preview.unmapped_classes.len(),
        "transition previewed"
    );
    Ok(preview)
}

fn impact(m: &Mapping, student_count: i64) -> MappingImpact {
    MappingImpact {
        from_class: m.from_class.clone(),
        to_class: m.to_class.clone(),
        action: if m.is_graduation() {
            MappingAction::Graduate
        } else {
            MappingAction::Promote
        },
        student_count,
    }
}

/// `live_counts[i]` is the current head count of `mappings[i].from_class`.
fn build_preview(
    transition: &Transition,
    live_counts: &[i64],
    class_counts: &[(String, i64)],
) -> Preview {
    let mut to_promote = 0i64;
    let mut to_graduate = 0i64;
    let mut by_mapping = Vec::with_capacity(transition.mappings.len());
    for (m, count) in transition.mappings.iter().zip(live_counts) {
        let row = impact(m, *count);
        match row.action {
            MappingAction::Promote => to_promote += row.student_count,
            MappingAction::Graduate => to_graduate += row.student_count,
        }
        by_mapping.push(row);
    }

    let mapped: HashSet<&str> = transition
        .mappings
        .iter()
        .map(|m| m.from_class.as_str())
        .collect();
    let unmapped_classes: Vec<ClassCount> = class_counts
        .iter()
        .filter(|(class, count)| *count > 0 && !mapped.contains(class.as_str()))
        .map(|(class, count)| ClassCount {
            class_name: class.clone(),
            student_count: *count,
        })
        .collect();

    let mut warnings = Vec::new();
    if !unmapped_classes.is_empty() {
        let unmapped_total: i64 = unmapped_classes.iter().map(|c| c.student_count).sum();
        let names: Vec<&str> = unmapped_classes
            .iter()
            .map(|c| c.class_name.as_str())
            .collect();
        warnings.push(format!(
            "{} students in unmapped classes will not be changed: {}",
            unmapped_total,
            names.join(", ")
        ));
    }
    if to_graduate > 0 {
        warnings.push(format!(
            "{} students will be permanently deleted",
            to_graduate
        ));
    }

    Preview {
        transition_id: transition.id.clone(),
        status: transition.status,
        total_students: to_promote + to_graduate,
        to_promote,
        to_graduate,
        by_mapping,
        unmapped_classes,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::test_util::seeded_conn;
    use crate::roster::test_util::class_of;
    use crate::transitions::apply::apply_transition;
    use crate::transitions::crud::{create_transition, get_transition};
    use crate::transitions::model::{MappingInput, NewTransition, TransitionStatus};
    use crate::transitions::revert::revert_transition;

    fn draft(conn: &Connection, mappings: Vec<MappingInput>) -> String {
        create_transition(
            conn,
            NewTransition {
                academic_year: "2025".to_string(),
                notes: None,
                mappings,
                created_by: "admin".to_string(),
            },
        )
        .expect("create")
        .id
    }

    #[test]
    fn counts_partition_into_promote_and_graduate() {
        let conn = seeded_conn(&[
            ("s1", "A", "1a"),
            ("s2", "B", "1a"),
            ("s3", "C", "4b"),
            ("s4", "D", "2c"),
        ]);
        let id = draft(
            &conn,
            vec![
                MappingInput::new("1a", Some("2a")),
                MappingInput::new("4b", None),
                MappingInput::new("9z", Some("10z")),
            ],
        );
        let p = preview_transition(&conn, &id).expect("preview");
        assert_eq!(p.total_students, 3);
        assert_eq!(p.to_promote, 2);
        assert_eq!(p.to_graduate, 1);
        assert_eq!(p.by_mapping.len(), 3);
        assert_eq!(p.by_mapping[2].student_count, 0);
        assert_eq!(p.by_mapping[1].action, MappingAction::Graduate);
        assert_eq!(
            p.unmapped_classes,
            vec![ClassCount {
                class_name: "2c".to_string(),
                student_count: 1
            }]
        );
        assert_eq!(
            p.warnings,
            vec![
                "1 students in unmapped classes will not be changed: 2c".to_string(),
                "1 students will be permanently deleted".to_string(),
            ]
        );
    }

    #[test]
    fn no_warnings_when_everything_is_promoted() {
        let conn = seeded_conn(&[("s1", "A", "1a")]);
        let id = draft(&conn, vec![MappingInput::new("1a", Some("2a"))]);
        let p = preview_transition(&conn, &id).expect("preview");
        assert!(p.warnings.is_empty());
        assert!(p.unmapped_classes.is_empty());
    }

    #[test]
    fn repeated_preview_is_identical_and_read_only() {
        let conn = seeded_conn(&[("s1", "A", "1a"), ("s2", "B", "3a"), ("s3", "C", "2a")]);
        let id = draft(
            &conn,
            vec![MappingInput::new("1a", Some("2a")), MappingInput::new("3a", None)],
        );
        let first = preview_transition(&conn, &id).expect("first");
        let second = preview_transition(&conn, &id).expect("second");
        assert_eq!(first, second);
        assert_eq!(crate::roster::count_in_class(&conn, "1a").expect("count"), 1);
        assert_eq!(crate::roster::count_in_class(&conn, "3a").expect("count"), 1);
    }

    #[test]
    fn preview_after_apply_and_revert_reports_live_counts() {
        let conn = seeded_conn(&[
            ("s1", "A", "1a"),
            ("s2", "B", "1a"),
            ("s3", "C", "4b"),
            ("s4", "D", "2c"),
        ]);
        let id = draft(
            &conn,
            vec![MappingInput::new("1a", Some("2a")), MappingInput::new("4b", None)],
        );
        apply_transition(&conn, &id, "admin").expect("apply");

        let applied = preview_transition(&conn, &id).expect("preview applied");
        assert_eq!(applied.status, TransitionStatus::Applied);
        assert_eq!(applied.total_students, 0);
        assert_eq!(applied.to_promote, 0);
        assert_eq!(applied.to_graduate, 0);
        let unmapped: Vec<(&str, i64)> = applied
            .unmapped_classes
            .iter()
            .map(|c| (c.class_name.as_str(), c.student_count))
            .collect();
        assert_eq!(unmapped, vec![("2a", 2), ("2c", 1)]);
        assert_eq!(
            applied.warnings,
            vec!["3 students in unmapped classes will not be changed: 2a, 2c".to_string()]
        );
        assert_eq!(preview_transition(&conn, &id).expect("again"), applied);
        assert_eq!(class_of(&conn, "s1").as_deref(), Some("2a"));
        assert_eq!(
            get_transition(&conn, &id).expect("get").status,
            TransitionStatus::Applied
        );

        revert_transition(&conn, &id, "admin").expect("revert");
        let reverted = preview_transition(&conn, &id).expect("preview reverted");
        assert_eq!(reverted.status, TransitionStatus::Reverted);
        assert_eq!(reverted.to_promote, 2);
        assert_eq!(reverted.to_graduate, 0);
        assert_eq!(reverted.total_students, 2);
        assert_eq!(class_of(&conn, "s1").as_deref(), Some("1a"));
        assert_eq!(
            get_transition(&conn, &id).expect("get").status,
            TransitionStatus::Reverted
        );
    }

    #[test]
    fn unknown_transition_is_not_found() {
        let conn = seeded_conn(&[]);
        assert_eq!(
            preview_transition(&conn, "missing").expect_err("missing").code(),
            "not_found"
        );
    }
}
