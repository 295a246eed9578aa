// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The command-list state machine and the state shared with the completion callback.
//!
//! ```text
//! Initial --begin--> Recording --end--> Ended --submit--> Submitted --(gpu)--> Completed
//!    ^                   |                 |                                       |
//!    +------reset--------+------reset------+----------------begin / reset----------+
//! ```
//!
//! `begin` is also accepted from `Ended`, discarding the unsubmitted recording.
//! Nothing but the device's completion signal leaves `Submitted`.
//!
//! Everything the completion callback touches lives here, behind one mutex, so
//! completion can run on whatever thread the backend retires work on.

use crate::commands::staging::StagingPool;
use crate::error::Error;
use crate::swapchain::SwapchainReferences;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListState {
    Initial,
    Recording,
    Ended,
    Submitted,
    Completed,
}

/// Identity of a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandListId(u64);

impl CommandListId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        CommandListId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct LifecycleInner {
    state: CommandListState,
    staging: StagingPool,
    swapchains: Vec<Arc<SwapchainReferences>>,
    waiters: Vec<r#continue::Sender<()>>,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    list: CommandListId,
    inner: Mutex<LifecycleInner>,
}

impl Lifecycle {
    pub fn new(list: CommandListId) -> Arc<Self> {
        Arc::new(Lifecycle {
            list,
            inner: Mutex::new(LifecycleInner {
                state: CommandListState::Initial,
                staging: StagingPool::new(),
                swapchains: Vec::new(),
                waiters: Vec::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleInner> {
        self.inner.lock().expect("command list lifecycle poisoned")
    }

    pub fn state(&self) -> CommandListState {
        self.lock().state
    }

    /// Fails with [`Error::WrongLifecycle`] unless the current state is in `allowed`.
    pub fn require(&self, operation: &'static str, allowed: &[CommandListState]) -> Result<CommandListState, Error> {
        let state = self.lock().state;
        if allowed.contains(&state) {
            Ok(state)
        } else {
            Err(Error::WrongLifecycle { operation, state })
        }
    }

    /// Moves to `to` if the current state is in `allowed`, returning the previous state.
    ///
    /// Leaving `Ended`, `Completed` or `Initial` for `Recording` or `Initial`
    /// drops whatever the previous recording still held.
    pub fn transition(
        &self,
        operation: &'static str,
        allowed: &[CommandListState],
        to: CommandListState,
    ) -> Result<CommandListState, Error> {
        let mut inner = self.lock();
        let from = inner.state;
        if !allowed.contains(&from) {
            return Err(Error::WrongLifecycle {
                operation,
                state: from,
            });
        }
        if matches!(to, CommandListState::Recording | CommandListState::Initial) {
            let released = inner.staging.release_submitted();
            let swapchains = std::mem::take(&mut inner.swapchains);
            for swapchain in swapchains {
                swapchain.remove(self.list);
            }
            if released > 0 {
                logwise::trace_sync!(
                    "Released {released} staging buffers of a discarded recording",
                    released = released
                );
            }
        }
        inner.state = to;
        Ok(from)
    }

    pub fn with_staging<R>(&self, f: impl FnOnce(&mut StagingPool) -> R) -> R {
        f(&mut self.lock().staging)
    }

    /// Records that this list references a swapchain until it completes.
    pub fn reference_swapchain(&self, references: &Arc<SwapchainReferences>) {
        let mut inner = self.lock();
        if inner.swapchains.iter().any(|r| Arc::ptr_eq(r, references)) {
            return;
        }
        references.insert(self.list);
        inner.swapchains.push(references.clone());
    }

    /// The device finished executing the submission.
    pub fn complete(&self) {
        let waiters = {
            let mut inner = self.lock();
            if inner.state != CommandListState::Submitted {
                logwise::warn_sync!("Completion signalled for a command list that was not submitted");
            }
            inner.state = CommandListState::Completed;
            let released = inner.staging.release_submitted();
            for swapchain in std::mem::take(&mut inner.swapchains) {
                swapchain.remove(self.list);
            }
            logwise::trace_sync!(
                "Command list completed, released {released} staging buffers",
                released = released
            );
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            waiter.send(());
        }
    }

    /// Resolves once the list is `Completed`.
    ///
    /// Only meaningful after submission; any state other than `Submitted` or
    /// `Completed` is an error.
    pub async fn completed(&self) -> Result<(), Error> {
        let future = {
            let mut inner = self.lock();
            match inner.state {
                CommandListState::Completed => return Ok(()),
                CommandListState::Submitted => {
                    let (sender, future) = r#continue::continuation();
                    inner.waiters.push(sender);
                    future
                }
                state => {
                    return Err(Error::WrongLifecycle {
                        operation: "completion",
                        state,
                    });
                }
            }
        };
        future.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CommandListState::*;

    #[test]
    fn transitions_are_checked() {
        let lifecycle = Lifecycle::new(CommandListId::next());
        assert_eq!(lifecycle.state(), Initial);
        let err = lifecycle
            .transition("end", &[Recording], Ended)
            .unwrap_err();
        assert_eq!(
            err,
            Error::WrongLifecycle {
                operation: "end",
                state: Initial
            }
        );
        assert_eq!(
            lifecycle.transition("begin", &[Initial], Recording).unwrap(),
            Initial
        );
        assert_eq!(lifecycle.state(), Recording);
    }

    #[test]
    fn completion_resolves_waiters() {
        let lifecycle = Lifecycle::new(CommandListId::next());
        lifecycle.transition("begin", &[Initial], Recording).unwrap();
        lifecycle.transition("end", &[Recording], Ended).unwrap();
        assert!(test_executors::sleep_on(lifecycle.completed()).is_err());
        lifecycle.transition("submit", &[Ended], Submitted).unwrap();

        let waiter = lifecycle.clone();
        let thread = std::thread::spawn(move || test_executors::sleep_on(waiter.completed()));
        // the waiter either registers before completion or observes Completed
        std::thread::sleep(std::time::Duration::from_millis(10));
        lifecycle.complete();
        thread.join().unwrap().unwrap();
        assert_eq!(lifecycle.state(), Completed);
        test_executors::sleep_on(lifecycle.completed()).unwrap();
    }
}
