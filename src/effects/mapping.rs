//! Mapping engine: computes the payload a transition hands to its target.

use super::error::MachineError;
use super::policy::{Category, ExceptionPolicy};
use crate::core::{MapInput, Mapping, Params, StateId};
use tokio_util::sync::CancellationToken;

/// Produce the next payload for `target`.
///
/// Mapped transitions run their transform under the `Map` category; plain
/// transitions hand their invocation arguments over verbatim. Either way the
/// result must fit the target's signature.
pub(crate) async fn next_parameters(
    policy: &ExceptionPolicy,
    mapping: Option<&Mapping>,
    previous: Params,
    arguments: Params,
    target: &StateId,
    token: &CancellationToken,
) -> Result<Params, MachineError> {
    let next = match mapping {
        Some(mapping) => {
            let input = MapInput {
                previous,
                arguments,
                token: token.clone(),
            };
            policy.invoke(Category::Map, token, mapping.apply(input)).await?
        }
        None => arguments,
    };
    next.check_fits(target.signature())?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Fault, ParamError, ParamTuple};

    #[tokio::test]
    async fn plain_transition_passes_arguments() {
        let next = next_parameters(
            &ExceptionPolicy::new(),
            None,
            (1_i32,).into_params(),
            ("x".to_string(),).into_params(),
            &StateId::of::<(String,)>("B"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(next.get_as::<String>(0), Ok("x".to_string()));
    }

    #[tokio::test]
    async fn same_mapping_keeps_previous_payload() {
        let next = next_parameters(
            &ExceptionPolicy::new(),
            Some(&Mapping::same()),
            (42_i32,).into_params(),
            Params::new(),
            &StateId::of::<(i32,)>("A"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(next.get_as::<i32>(0), Ok(42));
    }

    #[tokio::test]
    async fn mismatched_output_is_rejected() {
        let result = next_parameters(
            &ExceptionPolicy::new(),
            Some(&Mapping::typed(|(n,): (i32,)| (n as i64,))),
            (7_i32,).into_params(),
            Params::new(),
            &StateId::of::<(i32,)>("A"),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            result,
            Err(MachineError::Parameter(ParamError::Cast { index: 0, .. }))
        ));
    }

    #[tokio::test]
    async fn transform_failures_are_map_errors() {
        let failing =
            Mapping::from_async(|_: MapInput| async { Err::<(i32,), _>(Fault::failed("no")) });

        let result = next_parameters(
            &ExceptionPolicy::new(),
            Some(&failing),
            Params::new(),
            Params::new(),
            &StateId::of::<(i32,)>("A"),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.unwrap_err().category(), Some(Category::Map));
    }
}
