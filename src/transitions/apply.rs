use super::error::{TransitionError, TransitionResult};
use super::model::{HistoryAction, Mapping, TransitionOutcome, TransitionStatus};
use super::store::{self, PlannedRecord};
use super::validate::normalize_actor;
use super::now_ts;
use crate::roster::{self, StudentRow};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ApplyPlan {
    pub history: Vec<PlannedRecord>,
    /// target class -> students moving there
    pub promotions: BTreeMap<String, Vec<String>>,
    pub graduations: Vec<String>,
}

/// Decides every affected student's fate from a snapshot taken before any
/// write, so history reflects the pre-apply roster.
pub(crate) fn plan_apply(mappings: &[Mapping], students: &[StudentRow]) -> ApplyPlan {
    let lookup: HashMap<&str, Option<&str>> = mappings
        .iter()
        .map(|m| (m.from_class.as_str(), m.to_class.as_deref()))
        .collect();

    let mut plan = ApplyPlan::default();
    for s in students {
        let Some(target) = lookup.get(s.school_class.as_str()) else {
            continue;
        };
        let action = match target {
            Some(to) => {
                plan.promotions
                    .entry(to.to_string())
                    .or_default()
                    .push(s.id.clone());
                HistoryAction::Promoted
            }
            None => {
                plan.graduations.push(s.id.clone());
                HistoryAction::Graduated
            }
        };
        plan.history.push(PlannedRecord {
            student_id: s.id.clone(),
            person_name: s.display_name(),
            from_class: s.school_class.clone(),
            to_class: target.map(str::to_string),
            action,
        });
    }
    plan
}

/// Draft -> Applied. All writes share one immediate transaction; any error
/// leaves the transition a draft and the roster untouched.
pub fn apply_transition(
    conn: &Connection,
    id: &str,
    actor_id: &str,
) -> TransitionResult<TransitionOutcome> {
    let actor = normalize_actor(actor_id)?;
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let header = store::load_header(&tx, id)?.ok_or_else(TransitionError::transition_not_found)?;
    let mappings = store::load_mappings(&tx, id)?;
    header.status.ensure_can_apply(mappings.len())?;

    let from_classes: Vec<String> = mappings.iter().map(|m| m.from_class.clone()).collect();
    let students = roster::students_in_classes(&tx, &from_classes)?;
    let plan = plan_apply(&mappings, &students);

    let now = now_ts();
    store::insert_history(&tx, id, &plan.history, &now)?;
    let mut promoted = 0usize;
    for (target, ids) in &plan.promotions {
        promoted += roster::set_class_for_ids(&tx, ids, target, &now)?;
    }
    let graduated = roster::delete_ids(&tx, &plan.graduations)?;

    if store::mark_applied(&tx, id, &actor, &now)? == 0 {
        return Err(TransitionError::conflict(
            "transition already applied",
            TransitionStatus::Applied,
        ));
    }
    tx.commit()?;

    let mut warnings = Vec::new();
    if graduated > 0 {
        warnings.push(format!(
            "{} graduated students were permanently deleted",
            graduated
        ));
        warn!(transition_id = %id, graduated, "graduated students deleted");
    }
    info!(
        transition_id = %id,
        actor = %actor,
        promoted,
        graduated,
        "transition applied"
    );

    Ok(TransitionOutcome {
        transition_id: id.to_string(),
        status: TransitionStatus::Applied,
        students_promoted: promoted as i64,
        students_graduated: graduated as i64,
        can_revert: TransitionStatus::Applied.can_revert(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::roster::test_util::{add_student, class_of, seeded_conn, temp_workspace};
    use crate::transitions::crud::{create_transition, get_transition};
    use crate::transitions::model::{MappingInput, NewTransition};
    use crate::transitions::store::load_history;
    use std::time::Duration;

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

    fn student(id: &str, class: &str) -> StudentRow {
        StudentRow {
            id: id.to_string(),
            last_name: "Doe".to_string(),
            first_name: id.to_string(),
            student_no: None,
            school_class: class.to_string(),
        }
    }

    fn mapping(from: &str, to: Option<&str>) -> Mapping {
        Mapping {
            transition_id: "t".to_string(),
            from_class: from.to_string(),
            to_class: to.map(str::to_string),
        }
    }

    #[test]
    fn plan_groups_by_target_and_skips_unmapped() {
        let plan = plan_apply(
            &[mapping("1a", Some("2a")), mapping("4b", None)],
            &[student("s1", "1a"), student("s2", "4b"), student("s3", "7x"), student("s4", "1a")],
        );
        assert_eq!(plan.history.len(), 3);
        assert_eq!(
            plan.promotions.get("2a"),
            Some(&vec!["s1".to_string(), "s4".to_string()])
        );
        assert_eq!(plan.graduations, vec!["s2".to_string()]);
        assert_eq!(plan.history[1].action, HistoryAction::Graduated);
        assert_eq!(plan.history[1].to_class, None);
        assert_eq!(plan.history[0].person_name, "Doe, s1");
    }

    #[test]
    fn apply_conserves_students_and_writes_one_record_each() {
        let conn = seeded_conn(&[("a1", "A", "A"), ("a2", "B", "A"), ("c1", "C", "C")]);
        let id = draft(
            &conn,
            vec![MappingInput::new("A", Some("B")), MappingInput::new("C", None)],
        );
        let out = apply_transition(&conn, &id, "principal").expect("apply");
        assert_eq!(out.students_promoted, 2);
        assert_eq!(out.students_graduated, 1);
        assert!(out.can_revert);
        assert_eq!(out.warnings.len(), 1);

        let history = load_history(&conn, &id).expect("history");
        assert_eq!(history.len(), 3);
        let promoted = history
            .iter()
            .filter(|h| h.action == HistoryAction::Promoted)
            .count();
        assert_eq!(promoted, 2);
        assert_eq!(class_of(&conn, "a1").as_deref(), Some("B"));
        assert!(class_of(&conn, "c1").is_none());

        let t = get_transition(&conn, &id).expect("get");
        assert_eq!(t.status, TransitionStatus::Applied);
        assert_eq!(t.applied_by.as_deref(), Some("principal"));
        assert!(t.applied_at.is_some());
    }

    #[test]
    fn chained_rules_move_each_student_once() {
        let conn = seeded_conn(&[("s1", "A", "1a"), ("s2", "B", "2a"), ("s3", "C", "3a")]);
        let id = draft(
            &conn,
            vec![
                MappingInput::new("1a", Some("2a")),
                MappingInput::new("2a", Some("3a")),
                MappingInput::new("3a", None),
            ],
        );
        let out = apply_transition(&conn, &id, "admin").expect("apply");
        assert_eq!(out.students_promoted, 2);
        assert_eq!(out.students_graduated, 1);
        assert_eq!(class_of(&conn, "s1").as_deref(), Some("2a"));
        assert_eq!(class_of(&conn, "s2").as_deref(), Some("3a"));
        assert!(class_of(&conn, "s3").is_none());
    }

    #[test]
    fn second_apply_fails_already_applied() {
        let conn = seeded_conn(&[("s1", "A", "1a")]);
        let id = draft(&conn, vec![MappingInput::new("1a", Some("2a"))]);
        apply_transition(&conn, &id, "admin").expect("first apply");
        let e = apply_transition(&conn, &id, "admin").expect_err("second apply");
        assert_eq!(e.code(), "state_conflict");
        assert_eq!(e.to_string(), "transition already applied");
        assert_eq!(class_of(&conn, "s1").as_deref(), Some("2a"));
    }

    #[test]
    fn apply_without_mappings_is_rejected() {
        let conn = seeded_conn(&[("s1", "A", "1a")]);
        let id = draft(&conn, Vec::new());
        let e = apply_transition(&conn, &id, "admin").expect_err("no mappings");
        assert_eq!(e.to_string(), "transition must be draft with mappings");
        assert_eq!(
            get_transition(&conn, &id).expect("get").status,
            TransitionStatus::Draft
        );
    }

    #[test]
    fn apply_requires_actor() {
        let conn = seeded_conn(&[("s1", "A", "1a")]);
        let id = draft(&conn, vec![MappingInput::new("1a", Some("2a"))]);
        let e = apply_transition(&conn, &id, " ").expect_err("no actor");
        assert_eq!(e.code(), "bad_params");
    }

    #[test]
    fn store_failure_rolls_back_everything() {
        let conn = seeded_conn(&[("s1", "A", "1a"), ("s2", "B", "4b")]);
        let id = draft(
            &conn,
            vec![MappingInput::new("1a", Some("2a")), MappingInput::new("4b", None)],
        );
        // Break the final status write so the failure lands after every roster write.
        conn.execute_batch(
            "CREATE TRIGGER fail_apply BEFORE UPDATE OF status ON class_transitions
             BEGIN SELECT RAISE(ABORT, 'boom'); END;",
        )
        .expect("trigger");
        let e = apply_transition(&conn, &id, "admin").expect_err("store failure");
        assert_eq!(e.code(), "db_tx_failed");
        assert_eq!(class_of(&conn, "s1").as_deref(), Some("1a"));
        assert_eq!(class_of(&conn, "s2").as_deref(), Some("4b"));
        assert!(load_history(&conn, &id).expect("history").is_empty());
        conn.execute_batch("DROP TRIGGER fail_apply").expect("drop trigger");
        assert_eq!(
            get_transition(&conn, &id).expect("get").status,
            TransitionStatus::Draft
        );
        // A retry after the fault clears succeeds.
        let out = apply_transition(&conn, &id, "admin").expect("retry");
        assert_eq!(out.students_promoted, 1);
    }

    #[test]
    fn competing_connections_are_serialized_by_status() {
        let workspace = temp_workspace("rollover-apply-race");
        let first = db::open_db(&workspace).expect("open first");
        let second = db::open_db(&workspace).expect("open second");
        second
            .busy_timeout(Duration::from_millis(50))
            .expect("busy timeout");
        add_student(&first, "s1", "A", "1a");
        add_student(&first, "s2", "B", "4b");
        let id = draft(
            &first,
            vec![MappingInput::new("1a", Some("2a")), MappingInput::new("4b", None)],
        );

        // Another writer holds the reserved lock.
        first.execute_batch("BEGIN IMMEDIATE").expect("hold write lock");
        let e = apply_transition(&second, &id, "admin").expect_err("locked out");
        assert_eq!(e.code(), "db_tx_failed");
        first.execute_batch("COMMIT").expect("release write lock");
        assert_eq!(
            get_transition(&second, &id).expect("get").status,
            TransitionStatus::Draft
        );
        assert_eq!(class_of(&second, "s1").as_deref(), Some("1a"));
        assert!(load_history(&second, &id).expect("history").is_empty());

        let out = apply_transition(&second, &id, "admin").expect("retry");
        assert_eq!(out.students_promoted, 1);
        assert_eq!(out.students_graduated, 1);

        let e = apply_transition(&first, &id, "admin").expect_err("already applied");
        assert_eq!(e.code(), "state_conflict");
        assert_eq!(e.to_string(), "transition already applied");
        assert_eq!(load_history(&first, &id).expect("history").len(), 2);
        assert_eq!(class_of(&first, "s1").as_deref(), Some("2a"));

        drop(first);
        drop(second);
        let _ = std::fs::remove_dir_all(&workspace);
    }
}
