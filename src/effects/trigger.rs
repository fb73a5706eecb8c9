//! Trigger subsystem.
//!
//! A trigger is a background loop that awaits an external signal and then
//! invokes a callback against the machine. Loops start when the machine
//! activates and are canceled and joined when it deactivates, which also
//! resets their fire counts.
//!
//! - `Once`: fire a single time per activation, then stay dormant.
//! - `Repeat`: keep firing until canceled.

use super::machine::{StateMachine, WeakMachine};
use super::policy::{Category, ExceptionPolicy};
use crate::core::{BoxFuture, Fault, Handler};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Scheduling mode of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Once,
    Repeat,
}

/// A signal that triggers can await.
///
/// Firing wakes every trigger currently waiting on the signal. Fires that
/// happen while no trigger is listening are not remembered, and fires that
/// arrive while a callback is still running are coalesced into one.
///
/// # Example
///
/// ```rust
/// use stagehand::effects::Signal;
///
/// let order_paid = Signal::new();
/// let handle = order_paid.clone();
/// handle.fire();
/// assert_eq!(order_paid.fired(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct Signal {
    sender: Arc<watch::Sender<u64>>,
}

impl Signal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn fire(&self) {
        self.sender.send_modify(|fired| *fired = fired.wrapping_add(1));
    }

    /// Total number of times the signal has been fired.
    pub fn fired(&self) -> u64 {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.sender.subscribe()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

type AwaitFn =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<(), Fault>> + Send + Sync>;

/// What a trigger waits for.
#[derive(Clone)]
pub(crate) enum Awaited {
    Signal(Signal),
    Custom(AwaitFn),
}

impl Awaited {
    pub(crate) fn custom<F, Fut>(wait: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        Self::Custom(Arc::new(
            move |token: CancellationToken| -> BoxFuture<'static, Result<(), Fault>> {
                Box::pin(wait(token))
            },
        ))
    }

    fn listen(&self) -> Listener {
        match self {
            Self::Signal(signal) => Listener::Signal(signal.subscribe()),
            Self::Custom(wait) => Listener::Custom(Arc::clone(wait)),
        }
    }
}

enum Listener {
    Signal(watch::Receiver<u64>),
    Custom(AwaitFn),
}

impl Listener {
    async fn wait(&mut self, token: &CancellationToken) -> Result<(), Fault> {
        match self {
            Self::Signal(receiver) => receiver
                .changed()
                .await
                .map_err(|_| Fault::failed("signal closed")),
            Self::Custom(wait) => wait(token.clone()).await,
        }
    }
}

/// Passed to trigger callbacks.
#[derive(Clone)]
pub struct TriggerContext {
    /// The machine the trigger belongs to.
    pub machine: StateMachine,
    /// Canceled when the machine deactivates.
    pub token: CancellationToken,
}

/// A configured trigger.
#[derive(Clone)]
pub(crate) struct TriggerDef {
    pub(crate) mode: TriggerMode,
    pub(crate) awaited: Awaited,
    pub(crate) callback: Handler<TriggerContext>,
}

struct Loop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the running trigger loops of a machine.
pub(crate) struct TriggerSet {
    machine: Uuid,
    triggers: Vec<Arc<TriggerDef>>,
    fires: Vec<Arc<AtomicUsize>>,
    running: Vec<Loop>,
}

impl TriggerSet {
    pub(crate) fn new(
        machine: Uuid,
        triggers: Vec<TriggerDef>,
        fires: Vec<Arc<AtomicUsize>>,
    ) -> Self {
        Self {
            machine,
            triggers: triggers.into_iter().map(Arc::new).collect(),
            fires,
            running: Vec::new(),
        }
    }

    /// Spawn one loop per trigger under `scope`.
    ///
    /// Listeners subscribe before this returns, so a signal fired after
    /// activation completes is never missed.
    pub(crate) fn start(
        &mut self,
        handle: WeakMachine,
        scope: &CancellationToken,
        policy: &Arc<ExceptionPolicy>,
    ) {
        for (index, trigger) in self.triggers.iter().enumerate() {
            let token = scope.child_token();
            let listener = trigger.awaited.listen();
            let task = tokio::spawn(run_trigger(
                TriggerRun {
                    machine: self.machine,
                    index,
                    trigger: Arc::clone(trigger),
                    handle: handle.clone(),
                    token: token.clone(),
                    fires: Arc::clone(&self.fires[index]),
                    policy: Arc::clone(policy),
                },
                listener,
            ));
            self.running.push(Loop { token, task });
        }
        tracing::debug!(machine = %self.machine, count = self.running.len(), "triggers started");
    }

    /// Cancel and join every loop, then reset the fire counts.
    ///
    /// A loop whose callback is the caller is canceled but not joined; it
    /// exits as soon as the callback returns.
    pub(crate) async fn stop(&mut self) {
        for running in &self.running {
            running.token.cancel();
        }
        let caller = tokio::task::try_id();
        for running in self.running.drain(..) {
            if caller == Some(running.task.id()) {
                tracing::debug!(machine = %self.machine, "trigger stopped from its own callback");
                continue;
            }
            if let Err(error) = running.task.await {
                if error.is_panic() {
                    tracing::error!(machine = %self.machine, "trigger panicked");
                }
            }
        }
        for fires in &self.fires {
            fires.store(0, Ordering::SeqCst);
        }
    }
}

struct TriggerRun {
    machine: Uuid,
    index: usize,
    trigger: Arc<TriggerDef>,
    handle: WeakMachine,
    token: CancellationToken,
    fires: Arc<AtomicUsize>,
    policy: Arc<ExceptionPolicy>,
}

async fn run_trigger(run: TriggerRun, mut listener: Listener) {
    let TriggerRun {
        machine,
        index,
        trigger,
        handle,
        token,
        fires,
        policy,
    } = run;

    loop {
        let signaled = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            signaled = listener.wait(&token) => signaled,
        };
        if let Err(fault) = signaled {
            if let Err(error) = policy
                .supervise(Category::Trigger, &token, async { Err(fault) })
                .await
            {
                tracing::error!(%machine, trigger = index, %error, "trigger signal failed");
            }
            break;
        }

        let Some(target) = handle.upgrade() else {
            break;
        };
        // Counted before the callback runs, which may itself deactivate.
        let count = fires.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(%machine, trigger = index, count, "trigger fired");
        let ctx = TriggerContext {
            machine: target,
            token: token.clone(),
        };
        let outcome = policy
            .supervise(Category::Trigger, &token, (trigger.callback)(ctx))
            .await;
        if let Err(error) = outcome {
            tracing::error!(%machine, trigger = index, %error, "trigger callback failed");
        }

        if trigger.mode == TriggerMode::Once {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_wakes_subscribed_listeners() {
        let signal = Signal::new();
        let mut listener = Awaited::Signal(signal.clone()).listen();

        signal.fire();
        listener.wait(&CancellationToken::new()).await.unwrap();
        assert_eq!(signal.fired(), 1);
    }

    #[tokio::test]
    async fn fires_before_subscription_are_ignored() {
        let signal = Signal::new();
        signal.fire();

        let mut listener = Awaited::Signal(signal.clone()).listen();
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            listener.wait(&CancellationToken::new()),
        )
        .await;

        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn custom_await_receives_token() {
        let awaited = Awaited::custom(|token: CancellationToken| async move {
            token.cancelled().await;
            Err(Fault::Canceled)
        });
        let token = CancellationToken::new();
        token.cancel();

        let result = awaited.listen().wait(&token).await;
        assert!(result.unwrap_err().is_canceled());
    }
}
