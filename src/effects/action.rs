//! Background action supervisor.
//!
//! Each state may declare one long-running action. The machine picks one
//! [`ActionDiscipline`] for its whole lifetime:
//!
//! - `Coupled`: the action is awaited as part of entering the state.
//! - `Detached`: the action is spawned and keeps running while the machine
//!   handles further transitions, until its state is exited or the machine
//!   deactivates.
//!
//! Every action runs under its own per-state token, a child of the machine
//! scope, so canceling either one stops it.

use super::error::MachineError;
use super::policy::{Category, ExceptionPolicy};
use crate::core::{Handler, Params, StateContext, StateId};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How state actions relate to state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionDiscipline {
    #[default]
    Coupled,
    Detached,
}

struct Running {
    state: StateId,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Shared view of the current detached task, readable without the protocol lock.
#[derive(Clone, Default)]
pub(crate) struct ActionStatus(Arc<Mutex<Option<AbortHandle>>>);

impl ActionStatus {
    fn set(&self, handle: Option<AbortHandle>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = handle;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Owns the action of the currently entered state.
pub(crate) struct ActionSupervisor {
    machine: Uuid,
    discipline: ActionDiscipline,
    policy: Arc<ExceptionPolicy>,
    running: Option<Running>,
    status: ActionStatus,
}

impl ActionSupervisor {
    pub(crate) fn new(
        machine: Uuid,
        discipline: ActionDiscipline,
        policy: Arc<ExceptionPolicy>,
    ) -> Self {
        Self {
            machine,
            discipline,
            policy,
            running: None,
            status: ActionStatus::default(),
        }
    }

    pub(crate) fn status(&self) -> ActionStatus {
        self.status.clone()
    }

    pub(crate) fn discipline(&self) -> ActionDiscipline {
        self.discipline
    }

    /// Start the action of an entered state.
    ///
    /// With the coupled discipline this returns once the action finishes.
    /// Canceling `caller` cancels the action and waits for it to wind down.
    pub(crate) async fn start(
        &mut self,
        action: Option<&Handler<StateContext>>,
        state: &StateId,
        parameters: Params,
        scope: &CancellationToken,
        caller: &CancellationToken,
    ) -> Result<(), MachineError> {
        self.stop(true).await;

        let token = scope.child_token();
        let Some(action) = action else {
            self.running = Some(Running {
                state: state.clone(),
                token,
                task: None,
            });
            return Ok(());
        };

        let ctx = StateContext {
            state: state.clone(),
            parameters,
            token: token.clone(),
        };

        match self.discipline {
            ActionDiscipline::Coupled => {
                let result = {
                    let run = self.policy.supervise(Category::Action, &token, action(ctx));
                    tokio::pin!(run);
                    tokio::select! {
                        result = &mut run => result,
                        _ = caller.cancelled() => {
                            token.cancel();
                            run.await
                        }
                    }
                };
                self.running = Some(Running {
                    state: state.clone(),
                    token,
                    task: None,
                });
                result
            }
            ActionDiscipline::Detached => {
                let policy = Arc::clone(&self.policy);
                let machine = self.machine;
                let task_token = token.clone();
                let label = state.to_string();
                let fut = action(ctx);
                let task = tokio::spawn(async move {
                    if let Err(error) = policy.supervise(Category::Action, &task_token, fut).await {
                        tracing::error!(%machine, state = %label, %error, "detached action failed");
                    }
                });
                tracing::debug!(%machine, state = %state, "detached action started");
                self.status.set(Some(task.abort_handle()));
                self.running = Some(Running {
                    state: state.clone(),
                    token,
                    task: Some(task),
                });
                Ok(())
            }
        }
    }

    /// Cancel the current action, optionally waiting for it to finish.
    pub(crate) async fn stop(&mut self, wait: bool) {
        let Some(running) = self.running.take() else {
            return;
        };
        self.status.set(None);
        running.token.cancel();
        let Some(task) = running.task else {
            return;
        };
        // An action stopping itself cannot join its own task.
        let own_task = tokio::task::try_id() == Some(task.id());
        if wait && !own_task {
            if let Err(error) = task.await {
                if error.is_panic() {
                    tracing::error!(
                        machine = %self.machine,
                        state = %running.state,
                        "action panicked"
                    );
                }
            }
        } else {
            tracing::debug!(
                machine = %self.machine,
                state = %running.state,
                "action cancellation requested"
            );
        }
    }

    /// Whether a detached action task is still alive.
    pub(crate) fn is_running(&self) -> bool {
        self.status.is_running()
    }
}
