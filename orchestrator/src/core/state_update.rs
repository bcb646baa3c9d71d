//! Field-level mutations of [`ProjectState`].
//!
//! Every helper here is total and free of I/O. Timestamps are passed in by the
//! caller so the results stay deterministic under test.

use crate::core::types::{
    ArtifactKind, BlockKind, Blocking, EventResult, InvalidPhase, LastEvent, NextAction, Phase,
    ProjectState,
};

/// Deferred state change produced by an agent's output processing.
#[derive(Debug, Clone, PartialEq)]
pub enum StateMutation {
    SetVersion {
        artifact: ArtifactKind,
        version: String,
    },
    SetTestPassRate(f64),
    IncrementRevision,
}

/// Set the phase from an untrusted name.
pub fn update_phase(state: &mut ProjectState, new_phase: &str) -> Result<(), InvalidPhase> {
    let phase: Phase = new_phase.parse()?;
    set_phase(state, phase);
    Ok(())
}

pub fn set_phase(state: &mut ProjectState, phase: Phase) {
    state.phase = phase;
}

pub fn update_actors(state: &mut ProjectState, current: &str, awaiting_human: bool) {
    state.actors.current = current.to_string();
    state.actors.awaiting_human = awaiting_human;
}

pub fn update_next_action(
    state: &mut ProjectState,
    agent: &str,
    action: &str,
    requires_human_approval: bool,
) {
    state.next_action = Some(NextAction {
        agent: agent.to_string(),
        action: action.to_string(),
        requires_human_approval,
    });
}

pub fn update_last_event(
    state: &mut ProjectState,
    agent: &str,
    action: &str,
    result: EventResult,
    model: Option<&str>,
    timestamp: &str,
) {
    state.last_event = Some(LastEvent {
        agent: agent.to_string(),
        action: action.to_string(),
        timestamp: timestamp.to_string(),
        result,
        model: model.map(str::to_string),
    });
}

pub fn set_blocked(state: &mut ProjectState, kind: BlockKind, detail: &str, since: &str) {
    state.blocking = Blocking {
        is_blocked: true,
        reason: Some(kind.reason().to_string()),
        since: Some(since.to_string()),
        kind: Some(kind),
        detail: Some(detail.to_string()),
    };
}

pub fn clear_blocked(state: &mut ProjectState) {
    state.blocking = Blocking::default();
}

pub fn update_version(state: &mut ProjectState, artifact: ArtifactKind, version: &str) {
    state
        .version
        .insert(artifact.as_str().to_string(), version.to_string());
}

pub fn increment_revision(state: &mut ProjectState) {
    state.health.revision_count = state.health.revision_count.saturating_add(1);
}

pub fn apply_mutation(state: &mut ProjectState, mutation: &StateMutation) {
    match mutation {
        StateMutation::SetVersion { artifact, version } => {
            update_version(state, *artifact, version);
        }
        StateMutation::SetTestPassRate(rate) => {
            state.health.test_pass_rate = Some(rate.clamp(0.0, 1.0));
        }
        StateMutation::IncrementRevision => increment_revision(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2025-01-02T03:04:05Z";

    #[test]
    fn update_phase_accepts_every_valid_phase() {
        let mut state = ProjectState::new("p");
        for phase in Phase::ALL {
            update_phase(&mut state, phase.as_str()).expect("valid phase");
            assert_eq!(state.phase, phase);
        }
    }

    #[test]
    fn update_phase_rejects_unknown_names_without_mutating() {
        let mut state = ProjectState::new("p");
        state.phase = Phase::Test;
        for bad in ["", "deploy", "TEST", "human validation", "released"] {
            let err = update_phase(&mut state, bad).unwrap_err();
            assert_eq!(err.value, bad);
            assert_eq!(state.phase, Phase::Test);
        }
    }

    #[test]
    fn set_and_clear_blocked() {
        let mut state = ProjectState::new("p");
        set_blocked(&mut state, BlockKind::Transport, "API error 500", NOW);
        assert!(state.blocking.is_blocked);
        assert_eq!(state.blocking.reason.as_deref(), Some("agent_error"));
        assert_eq!(state.blocking.kind, Some(BlockKind::Transport));
        assert_eq!(state.blocking.since.as_deref(), Some(NOW));

        clear_blocked(&mut state);
        assert_eq!(state.blocking, Blocking::default());
    }

    #[test]
    fn mutations_create_missing_substructures() {
        let mut state: ProjectState = serde_yaml::from_str("phase: test\n").expect("parse");
        apply_mutation(
            &mut state,
            &StateMutation::SetVersion {
                artifact: ArtifactKind::Docs,
                version: "0.1".to_string(),
            },
        );
        apply_mutation(&mut state, &StateMutation::SetTestPassRate(0.5));
        apply_mutation(&mut state, &StateMutation::IncrementRevision);
        apply_mutation(&mut state, &StateMutation::IncrementRevision);

        assert_eq!(state.version_of(ArtifactKind::Docs), Some("0.1"));
        assert_eq!(state.health.test_pass_rate, Some(0.5));
        assert_eq!(state.health.revision_count, 2);
    }

    #[test]
    fn last_event_is_overwritten() {
        let mut state = ProjectState::new("p");
        update_last_event(
            &mut state,
            "prp_agent",
            "prp failed",
            EventResult::Failure,
            Some("m1"),
            NOW,
        );
        update_last_event(
            &mut state,
            "dev_agent",
            "dev completed successfully",
            EventResult::Success,
            Some("m2"),
            NOW,
        );
        let event = state.last_event.expect("event");
        assert_eq!(event.agent, "dev_agent");
        assert_eq!(event.result, EventResult::Success);
        assert_eq!(event.model.as_deref(), Some("m2"));
    }
}
