use super::error::{TransitionError, TransitionResult};
use super::model::{HistoryAction, TransitionOutcome, TransitionStatus};
use super::store;
use super::validate::normalize_actor;
use super::now_ts;
use crate::roster;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RevertTally {
    pub restored: i64,
    /// promoted students whose row no longer exists
    pub missing: i64,
    pub graduated: i64,
}

impl RevertTally {
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.missing > 0 {
            out.push(format!(
                "{} promoted students could not be reverted",
                self.missing
            ));
        }
        if self.graduated > 0 {
            out.push(format!(
                "{} graduated students cannot be restored",
                self.graduated
            ));
        }
        out
    }
}

/// Applied -> Reverted, driven only by the history written at apply time.
///
/// A promoted student that has been deleted since is counted, not fatal.
/// Any other store error aborts the whole revert. Graduated students are
/// gone for good and only reported.
pub fn revert_transition(
    conn: &Connection,
    id: &str,
    actor_id: &str,
) -> TransitionResult<TransitionOutcome> {
    let actor = normalize_actor(actor_id)?;
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let header = store::load_header(&tx, id)?.ok_or_else(TransitionError::transition_not_found)?;
    header.status.ensure_can_revert()?;

    let history = store::load_history(&tx, id)?;
    let now = now_ts();
    let mut tally = RevertTally::default();
    for record in &history {
        match record.action {
            HistoryAction::Promoted => {
                let n = roster::restore_class(&tx, &record.student_id, &record.from_class, &now)?;
                if n == 0 {
                    tally.missing += 1;
                } else {
                    tally.restored += 1;
                }
            }
            HistoryAction::Graduated => tally.graduated += 1,
        }
    }

    if store::mark_reverted(&tx, id, &actor, &now)? == 0 {
        return Err(TransitionError::conflict(
            "transition already reverted",
            TransitionStatus::Reverted,
        ));
    }
    tx.commit()?;

    if tally.missing > 0 {
        warn!(
            transition_id = %id,
            missing = tally.missing,
            "promoted students missing on revert"
        );
    }
    if tally.graduated > 0 {
        warn!(
            transition_id = %id,
            graduated = tally.graduated,
            "graduated students not restorable"
        );
    }
    info!(
        transition_id = %id,
        actor = %actor,
        restored = tally.restored,
        "transition reverted"
    );

    Ok(TransitionOutcome {
        transition_id: id.to_string(),
        status: TransitionStatus::Reverted,
        students_promoted: tally.restored,
        students_graduated: tally.graduated,
        can_revert: TransitionStatus::Reverted.can_revert(),
        warnings: tally.warnings(),
    })
}
