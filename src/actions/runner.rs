use log::{debug, warn};

use crate::ledger::InstalledPackage;
use crate::manifest::ActionDescriptor;

use super::{ActionContext, ActionRegistry};

#[derive(Debug, Clone, PartialEq)]
pub enum ActionStatus {
    Succeeded,
    /// The handler ran but reported that it did nothing.
    Declined,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub alias: String,
    pub status: ActionStatus,
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ActionStatus::Failed(_))
    }
}

/// Record undoable actions in the ledger and run the install-time ones.
///
/// Both decisions are made per node: an action can be stored for undo, run
/// now, both or neither. A failing handler never stops the ones after it.
#[tracing::instrument(skip_all, fields(package = %ctx.package_name))]
pub fn run_actions(
    registry: &ActionRegistry,
    ctx: &ActionContext<'_>,
    actions: &[ActionDescriptor],
    ledger: &mut InstalledPackage,
) -> Vec<ActionOutcome> {
    let mut outcomes = Vec::new();

    for action in actions {
        if action.is_undoable() {
            ledger.actions.push_str(&action.element.outer_xml());
        }

        if !action.runs_at_install() || action.alias.trim().is_empty() {
            continue;
        }

        let status = match registry.get(&action.alias) {
            None => ActionStatus::Failed(format!("no action registered for '{}'", action.alias)),
            Some(handler) => match handler.execute(ctx, &action.element) {
                Ok(true) => ActionStatus::Succeeded,
                Ok(false) => ActionStatus::Declined,
                Err(e) => ActionStatus::Failed(format!("{:#}", e)),
            },
        };

        match &status {
            ActionStatus::Failed(reason) => {
                warn!("Package action '{}' failed: {}", action.alias, reason)
            }
            _ => debug!("Package action '{}': {:?}", action.alias, status),
        }

        outcomes.push(ActionOutcome {
            alias: action.alias.clone(),
            status,
        });
    }

    outcomes
}
