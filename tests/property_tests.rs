//! Property-based tests for core machine types.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

use chrono::Utc;
use proptest::prelude::*;
use stagehand::builder::{BuildError, Finding, MachineBuilder, StateSpec, TransitionSpec};
use stagehand::core::{
    signature_accepts, ParamTuple, ParamType, ParameterSlots, Params, SlotKind, StateHistory,
    StateId, StateRecord, StateTransition,
};

prop_compose! {
    fn arbitrary_type()(variant in 0..5u8) -> ParamType {
        match variant {
            0 => ParamType::of::<i32>(),
            1 => ParamType::of::<String>(),
            2 => ParamType::of::<bool>(),
            3 => ParamType::of::<u8>(),
            _ => ParamType::any(),
        }
    }
}

prop_compose! {
    fn arbitrary_signature()(
        types in prop::collection::vec(arbitrary_type(), 0..=4)
    ) -> Vec<ParamType> {
        types
    }
}

prop_compose! {
    fn arbitrary_payload()(
        n in any::<i64>(),
        text in "[a-z]{0,8}",
        flag in any::<bool>(),
        arity in 0..=3usize
    ) -> Params {
        match arity {
            0 => ().into_params(),
            1 => (n,).into_params(),
            2 => (n, text).into_params(),
            _ => (n, text, flag).into_params(),
        }
    }
}

fn record(label: &str) -> StateRecord {
    (&StateId::new(label)).into()
}

proptest! {
    #[test]
    fn signatures_accept_themselves(signature in arbitrary_signature()) {
        prop_assert!(signature_accepts(&signature, &signature));
    }

    #[test]
    fn wildcards_accept_any_signature_of_same_arity(candidate in arbitrary_signature()) {
        let declared = vec![ParamType::any(); candidate.len()];
        prop_assert!(signature_accepts(&declared, &candidate));
    }

    #[test]
    fn arity_mismatch_never_accepts(
        declared in arbitrary_signature(),
        candidate in arbitrary_signature()
    ) {
        prop_assume!(declared.len() != candidate.len());
        prop_assert!(!signature_accepts(&declared, &candidate));
    }

    #[test]
    fn rollback_restores_current(current in arbitrary_payload(), staged in arbitrary_payload()) {
        let mut slots = ParameterSlots::new();
        slots.begin_transition();
        slots.set_next(current.clone());
        slots.commit_transition();

        slots.begin_transition();
        prop_assert!(!slots.is_set(SlotKind::Current));
        slots.set_next(staged);
        slots.rollback_transition();

        prop_assert_eq!(slots.signature(SlotKind::Current), Some(current.signature()));
        prop_assert!(!slots.is_set(SlotKind::Previous));
        prop_assert!(!slots.is_set(SlotKind::Next));
    }

    #[test]
    fn commit_promotes_next(current in arbitrary_payload(), staged in arbitrary_payload()) {
        let mut slots = ParameterSlots::new();
        slots.begin_transition();
        slots.set_next(current);
        slots.commit_transition();

        slots.begin_transition();
        slots.set_next(staged.clone());
        slots.commit_transition();

        prop_assert_eq!(slots.signature(SlotKind::Current), Some(staged.signature()));
        prop_assert!(!slots.is_set(SlotKind::Previous));
        prop_assert!(!slots.is_set(SlotKind::Next));
    }

    #[test]
    fn payload_values_read_back(n in any::<i64>(), text in "[a-z]{0,8}") {
        let params = (n, text.clone()).into_params();
        prop_assert_eq!(params.get_as::<i64>(0), Ok(n));
        prop_assert_eq!(params.get_as::<String>(1), Ok(text));
        prop_assert!(params.get_as::<bool>(0).is_err());
    }

    #[test]
    fn history_preserves_order(labels in prop::collection::vec("[A-Z][a-z]{0,5}", 1..10)) {
        let mut history = StateHistory::new();
        for (i, label) in labels.iter().enumerate() {
            let from = if i == 0 { None } else { Some(record(&labels[i - 1])) };
            history = history.record(StateTransition {
                from,
                to: record(label),
                label: None,
                timestamp: Utc::now(),
            });
        }

        let path = history.get_path();
        prop_assert_eq!(path.len(), labels.len());
        for (state, label) in path.iter().zip(&labels) {
            prop_assert_eq!(&state.label, label);
        }
    }

    #[test]
    fn history_record_is_pure(from in "[A-Z]{1,4}", to in "[A-Z]{1,4}") {
        let history = StateHistory::new();

        let new_history = history.record(StateTransition {
            from: Some(record(&from)),
            to: record(&to),
            label: Some("go".to_string()),
            timestamp: Utc::now(),
        });

        // Original history unchanged
        prop_assert_eq!(history.transitions().len(), 0);
        prop_assert_eq!(new_history.transitions().len(), 1);
    }

    #[test]
    fn history_roundtrip_serialization(labels in prop::collection::vec("[A-Z][a-z]{0,5}", 0..5)) {
        let mut history = StateHistory::new();
        for label in &labels {
            history = history.record(StateTransition {
                from: None,
                to: record(label),
                label: Some(label.to_lowercase()),
                timestamp: Utc::now(),
            });
        }

        let json = serde_json::to_string(&history).unwrap();
        let deserialized: StateHistory = serde_json::from_str(&json).unwrap();

        prop_assert_eq!(history.transitions().len(), deserialized.transitions().len());
        prop_assert_eq!(history.get_path(), deserialized.get_path());
    }

    #[test]
    fn history_limit_bounds_length(limit in 0..8usize, count in 0..20usize) {
        let mut history = StateHistory::with_limit(limit);
        for i in 0..count {
            history.push(StateTransition {
                from: None,
                to: record(&format!("S{i}")),
                label: None,
                timestamp: Utc::now(),
            });
        }

        prop_assert_eq!(history.transitions().len(), count.min(limit));
        if count > 0 && limit > 0 {
            let last = format!("S{}", count - 1);
            prop_assert_eq!(&history.transitions()[count.min(limit) - 1].to.label, &last);
        }
    }

    #[test]
    fn each_repeated_unconditional_transition_is_unreachable(copies in 2..6usize) {
        let transitions =
            (0..copies).map(|_| TransitionSpec::new(StateId::new("A"), "To B").to("B"));
        let result = MachineBuilder::new()
            .initial("A", ())
            .state(StateSpec::new("A"))
            .state(StateSpec::new("B"))
            .transitions(transitions)
            .build();

        match result {
            Err(BuildError::Configuration(error)) => {
                let all_unreachable = error
                    .findings()
                    .iter()
                    .all(|f| matches!(f, Finding::UnreachableTransition { .. }));
                prop_assert_eq!(error.len(), copies - 1);
                prop_assert!(all_unreachable, "every finding should be an unreachable transition");
            }
            _ => prop_assert!(false, "expected a configuration error"),
        }
    }

    #[test]
    fn every_dangling_target_is_reported(targets in prop::collection::btree_set("[C-Z]", 1..5)) {
        let transitions: Vec<_> = targets
            .iter()
            .map(|target| {
                TransitionSpec::new(StateId::new("A"), format!("To {target}")).to(target.as_str())
            })
            .collect();
        let result = MachineBuilder::new()
            .initial("A", ())
            .state(StateSpec::new("A"))
            .transitions(transitions)
            .build();

        match result {
            Err(BuildError::Configuration(error)) => {
                prop_assert_eq!(error.len(), targets.len());
            }
            _ => prop_assert!(false, "expected a configuration error"),
        }
    }
}
