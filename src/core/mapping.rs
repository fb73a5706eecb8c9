//! Mapping transforms for "mapped" transitions.
//!
//! A mapping turns the payload of the state being left (plus the values the
//! transition was invoked with) into the payload of the target state.

use super::context::{BoxFuture, Fault, MapInput};
use super::params::{ParamTuple, ParamType, Params};
use std::future::Future;
use std::sync::Arc;

type MappedParams = Result<Params, Fault>;
type Transform = Arc<dyn Fn(MapInput) -> BoxFuture<'static, MappedParams> + Send + Sync>;

/// Shape of the payload a mapping produces.
#[derive(Clone, Debug, PartialEq)]
pub enum MappingOutput {
    /// Same shape as the source state.
    Source,
    /// An explicit signature.
    Declared(Vec<ParamType>),
}

/// A configured transform from previous payload to next payload.
///
/// # Example
///
/// ```rust
/// use stagehand::core::Mapping;
///
/// // Keep the payload unchanged.
/// let same = Mapping::same();
///
/// // Turn an order id into (order id, retry count).
/// let retry = Mapping::typed(|(id,): (u64,)| (id, 0_u32));
/// ```
#[derive(Clone)]
pub struct Mapping {
    /// Payload shape the transform reads, when it is typed.
    input: Option<Vec<ParamType>>,
    output: MappingOutput,
    transform: Transform,
}

impl Mapping {
    /// Passthrough: the target receives the source payload unchanged.
    pub fn same() -> Self {
        Self {
            input: None,
            output: MappingOutput::Source,
            transform: Arc::new(|input: MapInput| -> BoxFuture<'static, MappedParams> {
                Box::pin(async move { Ok(input.previous) })
            }),
        }
    }

    /// Typed synchronous transform over the previous payload.
    pub fn typed<In, Out, F>(f: F) -> Self
    where
        In: ParamTuple,
        Out: ParamTuple,
        F: Fn(In) -> Out + Send + Sync + 'static,
    {
        Self {
            input: Some(In::signature()),
            output: MappingOutput::Declared(Out::signature()),
            transform: Arc::new(move |input: MapInput| -> BoxFuture<'static, MappedParams> {
                let mapped = input
                    .previous
                    .extract::<In>()
                    .map(|values| f(values).into_params())
                    .map_err(Fault::from);
                Box::pin(async move { mapped })
            }),
        }
    }

    /// Async transform over the full [`MapInput`], producing `Out`.
    pub fn from_async<Out, F, Fut>(f: F) -> Self
    where
        Out: ParamTuple,
        F: Fn(MapInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, Fault>> + Send + 'static,
    {
        Self {
            input: None,
            output: MappingOutput::Declared(Out::signature()),
            transform: Arc::new(move |input: MapInput| -> BoxFuture<'static, MappedParams> {
                let fut = f(input);
                Box::pin(async move { fut.await.map(ParamTuple::into_params) })
            }),
        }
    }

    /// Signature the transform extracts from the previous payload.
    pub fn input(&self) -> Option<&[ParamType]> {
        self.input.as_deref()
    }

    pub fn output(&self) -> &MappingOutput {
        &self.output
    }

    /// Signature of the produced payload given the source state's signature.
    pub fn output_signature(&self, source: &[ParamType]) -> Vec<ParamType> {
        match &self.output {
            MappingOutput::Source => source.to_vec(),
            MappingOutput::Declared(signature) => signature.clone(),
        }
    }

    pub fn apply(&self, input: MapInput) -> BoxFuture<'static, MappedParams> {
        (self.transform)(input)
    }
}

impl std::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn input(previous: Params) -> MapInput {
        MapInput {
            previous,
            arguments: Params::new(),
            token: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn same_passes_payload_through() {
        let mapping = Mapping::same();
        let out = mapping.apply(input((42_i32,).into_params())).await.unwrap();

        assert_eq!(out.get_as::<i32>(0), Ok(42));
        assert_eq!(
            mapping.output_signature(&[ParamType::of::<i32>()]),
            vec![ParamType::of::<i32>()]
        );
    }

    #[tokio::test]
    async fn typed_mapping_changes_shape() {
        let mapping = Mapping::typed(|(a, b): (i32, i32)| (a + b,));
        let out = mapping.apply(input((2, 3).into_params())).await.unwrap();

        assert_eq!(out.extract::<(i32,)>(), Ok((5,)));
        assert_eq!(
            mapping.output(),
            &MappingOutput::Declared(vec![ParamType::of::<i32>()])
        );
        assert_eq!(
            mapping.input(),
            Some(&[ParamType::of::<i32>(), ParamType::of::<i32>()][..])
        );
        assert_eq!(Mapping::same().input(), None);
    }

    #[tokio::test]
    async fn typed_mapping_reports_cast_errors() {
        let mapping = Mapping::typed(|(s,): (String,)| (s.len(),));
        let result = mapping.apply(input((1_u8,).into_params())).await;

        assert!(matches!(result, Err(Fault::Failed(_))));
    }

    #[tokio::test]
    async fn async_mapping_reads_arguments() {
        let mapping = Mapping::from_async(|input: MapInput| async move {
            let base: i32 = input.previous.get_as(0)?;
            let delta: i32 = input.arguments.get_as(0)?;
            Ok::<_, Fault>((base + delta,))
        });

        let out = mapping
            .apply(MapInput {
                previous: (10,).into_params(),
                arguments: (5,).into_params(),
                token: CancellationToken::new(),
            })
            .await
            .unwrap();

        assert_eq!(out.get_as::<i32>(0), Ok(15));
    }
}
