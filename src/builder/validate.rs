//! Static validation of a machine configuration.
//!
//! Every pass runs and every finding is reported, so a misconfigured
//! machine is fixed in one round instead of one error at a time. Passes:
//!
//! 1. Duplicate states
//! 2. Transition sources and targets
//! 3. Unreachable (shadowed) transitions
//! 4. Initial state

use super::error::{ConfigurationError, Finding};
use super::state::StateSpec;
use super::transition::TransitionSpec;
use crate::core::{
    signature_accepts, ParamType, StateDef, StateId, StateTable, TransitionDef, TransitionTable,
};
use std::collections::HashSet;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Checked = Validation<(), NonEmptyVec<Finding>>;

/// Validated tables, ready for the runtime.
pub(crate) struct Compiled {
    pub(crate) states: StateTable,
    pub(crate) transitions: TransitionTable,
    pub(crate) initial: usize,
}

/// Validate the configuration and resolve it into tables.
pub(crate) fn compile(
    states: Vec<StateSpec>,
    transitions: Vec<TransitionSpec>,
    initial: &StateId,
) -> Result<Compiled, ConfigurationError> {
    let table = StateTable::new(
        states
            .into_iter()
            .map(|spec| StateDef {
                id: spec.id,
                handlers: spec.handlers,
            })
            .collect(),
    );

    let (resolved, targets) = resolve_transitions(&table, &transitions);
    let initial_index = table.lookup(initial.label(), initial.signature());

    let checks = vec![
        check_duplicate_states(&table),
        targets,
        check_unreachable(&transitions),
        check_initial(initial, initial_index),
    ];

    match Validation::all_vec(checks).map(|_| ()) {
        Validation::Success(_) => match initial_index {
            Some(initial) => Ok(Compiled {
                states: table,
                transitions: TransitionTable::new(resolved),
                initial,
            }),
            None => Err(ConfigurationError::from_finding(Finding::UnknownInitialState {
                state: initial.to_string(),
            })),
        },
        Validation::Failure(findings) => Err(ConfigurationError::new(findings)),
    }
}

fn check_duplicate_states(table: &StateTable) -> Checked {
    let mut seen = HashSet::new();
    let checks: Vec<Checked> = table
        .iter()
        .map(|state| {
            if seen.insert(&state.id) {
                Validation::success(())
            } else {
                Validation::fail(Finding::DuplicateState {
                    state: state.id.to_string(),
                })
            }
        })
        .collect();

    Validation::all_vec(checks).map(|_| ())
}

/// Resolve sources and targets, reporting the ones that do not resolve.
fn resolve_transitions(
    table: &StateTable,
    specs: &[TransitionSpec],
) -> (Vec<TransitionDef>, Checked) {
    let mut resolved = Vec::with_capacity(specs.len());
    let mut checks: Vec<Checked> = Vec::with_capacity(specs.len());

    for spec in specs {
        match resolve_transition(table, spec) {
            Ok(def) => {
                resolved.push(def);
                checks.push(Validation::success(()));
            }
            Err(finding) => checks.push(Validation::fail(finding)),
        }
    }

    (resolved, Validation::all_vec(checks).map(|_| ()))
}

fn resolve_transition(
    table: &StateTable,
    spec: &TransitionSpec,
) -> Result<TransitionDef, Finding> {
    let from = spec.source.to_string();
    let source = table.position(&spec.source).ok_or_else(|| Finding::UnknownSource {
        from: from.clone(),
        label: spec.label.clone(),
    })?;
    if let Some(input) = spec.mapping.as_ref().and_then(|mapping| mapping.input()) {
        if !could_hold(input, spec.source.signature()) {
            return Err(Finding::MappingInputMismatch {
                from,
                label: spec.label.clone(),
                expected: describe_signature(input),
            });
        }
    }
    let target_label = spec.target.as_deref().ok_or_else(|| Finding::MissingTarget {
        from: from.clone(),
        label: spec.label.clone(),
    })?;

    let signature = spec.target_signature();
    let target = table
        .lookup(target_label, &signature)
        .ok_or_else(|| Finding::DanglingTarget {
            from,
            label: spec.label.clone(),
            target: describe(target_label, &signature),
        })?;

    Ok(TransitionDef {
        source,
        label: spec.label.clone(),
        arguments: spec.arguments.clone(),
        guard: spec.guard.clone(),
        target,
        mapping: spec.mapping.clone(),
    })
}

/// Within one source, a later transition is unreachable when an earlier
/// guard-free one with the same label and arity accepts all of its types.
fn check_unreachable(specs: &[TransitionSpec]) -> Checked {
    let checks: Vec<Checked> = specs
        .iter()
        .enumerate()
        .map(|(index, later)| {
            let shadow = specs[..index].iter().find(|earlier| {
                earlier.guard.is_none()
                    && earlier.source == later.source
                    && earlier.label == later.label
                    && signature_accepts(&earlier.arguments, &later.arguments)
            });
            match shadow {
                Some(earlier) => Validation::fail(Finding::UnreachableTransition {
                    from: later.source.to_string(),
                    label: later.label.clone(),
                    target: target_name(later),
                    shadowed_by: target_name(earlier),
                }),
                None => Validation::success(()),
            }
        })
        .collect();

    Validation::all_vec(checks).map(|_| ())
}

fn check_initial(initial: &StateId, index: Option<usize>) -> Checked {
    match index {
        Some(_) => Validation::success(()),
        None => Validation::fail(Finding::UnknownInitialState {
            state: initial.to_string(),
        }),
    }
}

/// Whether a payload declared as `source` may be read as `input`.
/// Wildcards on either side are resolved at runtime.
fn could_hold(input: &[ParamType], source: &[ParamType]) -> bool {
    input.len() == source.len()
        && input
            .iter()
            .zip(source)
            .all(|(i, s)| i.is_assignable_from(s) || s.is_assignable_from(i))
}

fn describe_signature(signature: &[ParamType]) -> String {
    let names: Vec<&str> = signature.iter().map(|t| t.name()).collect();
    format!("({})", names.join(", "))
}

fn target_name(spec: &TransitionSpec) -> String {
    match &spec.target {
        Some(label) => describe(label, &spec.target_signature()),
        None => "<none>".to_string(),
    }
}

fn describe(label: &str, signature: &[ParamType]) -> String {
    StateId::with_signature(label, signature.to_vec()).to_string()
}
