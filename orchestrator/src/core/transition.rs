//! Phase transition policy.
//!
//! Maps what an agent (or a human at a checkpoint) just did onto the next
//! phase, the next actor, and the advisory next action. Phases are typed here,
//! so a transition to a phase outside the vocabulary cannot be expressed.

use crate::core::state_update::{increment_revision, set_phase, update_actors, update_next_action};
use crate::core::types::{Actor, AgentKind, Phase, ProjectState};

/// What an agent run produced, as far as routing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOutcome {
    RequirementsWritten,
    CodeWritten,
    TestsRan { passed: usize, failed: usize },
    DocsWritten,
}

/// Routing decision applied by the runner after a successful agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// `None` keeps the current phase.
    pub next_phase: Option<Phase>,
    pub next_actor: Actor,
    pub next_action: Option<String>,
    /// Work goes back to development (bumps `health.revision_count`).
    pub counts_as_revision: bool,
}

impl Transition {
    fn to(phase: Option<Phase>, actor: Actor, action: &str) -> Self {
        Self {
            next_phase: phase,
            next_actor: actor,
            next_action: Some(action.to_string()),
            counts_as_revision: false,
        }
    }
}

pub fn after_agent(outcome: AgentOutcome) -> Transition {
    match outcome {
        AgentOutcome::RequirementsWritten => Transition::to(
            Some(Phase::Development),
            Actor::Agent(AgentKind::Developer),
            "implement code based on PRP",
        ),
        AgentOutcome::CodeWritten => Transition::to(
            Some(Phase::Test),
            Actor::Agent(AgentKind::Tester),
            "generate and run tests",
        ),
        AgentOutcome::TestsRan { failed, .. } if failed > 0 => Transition {
            counts_as_revision: true,
            ..Transition::to(
                Some(Phase::Development),
                Actor::Agent(AgentKind::Developer),
                "fix failing tests",
            )
        },
        AgentOutcome::TestsRan { .. } => Transition::to(
            Some(Phase::HumanValidation),
            Actor::Human,
            "manual testing and validation",
        ),
        AgentOutcome::DocsWritten => Transition::to(None, Actor::Human, "review documentation"),
    }
}

/// Human checkpoint decision could not be applied in the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointError {
    #[error("nothing to approve: project is in phase '{phase}' (approval happens in human_validation)")]
    NotInValidation { phase: Phase },
    #[error("nothing to reject: project is in phase '{phase}' and not awaiting a human")]
    NotAwaitingHuman { phase: Phase },
}

/// Human accepts the validated build.
pub fn on_approve(state: &ProjectState) -> Result<Transition, CheckpointError> {
    if state.phase != Phase::HumanValidation {
        return Err(CheckpointError::NotInValidation { phase: state.phase });
    }
    Ok(Transition::to(
        Some(Phase::Release),
        Actor::Human,
        "publish release",
    ))
}

/// Human sends the work back to development.
pub fn on_reject(state: &ProjectState, reason: Option<&str>) -> Result<Transition, CheckpointError> {
    if state.phase != Phase::HumanValidation && !state.actors.awaiting_human {
        return Err(CheckpointError::NotAwaitingHuman { phase: state.phase });
    }
    let action = match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => format!("address review feedback: {reason}"),
        None => "address review feedback".to_string(),
    };
    Ok(Transition {
        next_phase: Some(Phase::Development),
        next_actor: Actor::Agent(AgentKind::Developer),
        next_action: Some(action),
        counts_as_revision: true,
    })
}

/// Write a routing decision into the state record.
///
/// Any returned action is recorded with `requires_human_approval = true`.
pub fn apply(state: &mut ProjectState, transition: &Transition) {
    if let Some(phase) = transition.next_phase {
        set_phase(state, phase);
    }
    let actor = transition.next_actor.as_str();
    update_actors(state, actor, transition.next_actor.is_human());
    if let Some(action) = transition.next_action.as_deref() {
        update_next_action(state, actor, action, true);
    }
    if transition.counts_as_revision {
        increment_revision(state);
    }
}

/// Actor expected to act in `phase` when an operator moves a project by hand.
pub fn default_actor(phase: Phase) -> Actor {
    match phase {
        Phase::Idea | Phase::Prp => Actor::Agent(AgentKind::Requirements),
        Phase::Development => Actor::Agent(AgentKind::Developer),
        Phase::Test => Actor::Agent(AgentKind::Tester),
        Phase::HumanValidation | Phase::Release => Actor::Human,
    }
}
