//! Cooperative tracking of in-flight package service requests.
//!
//! The owner calls [`OperationTracker::tick`] once per loop iteration. Each
//! tick polls every pending request once: finished requests run their
//! completion callback (success) or are reported back (failure), and are
//! removed from the queue. Unfinished requests wait for the next tick.
//!
//! Callbacks receive the owner's state by `&mut` and run only inside `tick`,
//! so state is never mutated concurrently and no locking is needed.

use log::{debug, error};

use crate::error::PackageError;
use crate::service::{Operation, Request, RequestStatus};

/// A request that completed with a failure status.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationFailure {
    pub operation: Operation,
    pub message: String,
}

impl From<OperationFailure> for PackageError {
    fn from(failure: OperationFailure) -> Self {
        PackageError::Service {
            operation: failure.operation,
            message: failure.message,
        }
    }
}

enum Progress {
    Pending,
    Completed,
    Failed(String),
}

trait PendingOperation<C> {
    fn operation(&self) -> Operation;
    fn poll(&mut self, ctx: &mut C) -> Progress;
}

type Callback<C, T> = Box<dyn FnOnce(&mut C, T)>;

struct Tracked<C, T> {
    request: Request<T>,
    on_complete: Option<Callback<C, T>>,
}

impl<C, T> PendingOperation<C> for Tracked<C, T> {
    fn operation(&self) -> Operation {
        self.request.operation()
    }

    fn poll(&mut self, ctx: &mut C) -> Progress {
        match self.request.poll() {
            RequestStatus::InProgress => Progress::Pending,
            RequestStatus::Success(value) => {
                if let Some(on_complete) = self.on_complete.take() {
                    on_complete(ctx, value);
                }
                Progress::Completed
            }
            RequestStatus::Failure(message) => Progress::Failed(message),
        }
    }
}

/// Queue of pending requests with their completion callbacks.
pub struct OperationTracker<C> {
    pending: Vec<Box<dyn PendingOperation<C>>>,
}

impl<C> Default for OperationTracker<C> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<C> OperationTracker<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `request`; `on_complete` runs once, on the tick that sees it succeed.
    pub fn track<T: 'static>(
        &mut self,
        request: Request<T>,
        on_complete: impl FnOnce(&mut C, T) + 'static,
    ) where
        C: 'static,
    {
        debug!("Tracking {} request", request.operation());
        self.pending.push(Box::new(Tracked {
            request,
            on_complete: Some(Box::new(on_complete)),
        }));
    }

    /// Poll every pending request once and return the failures seen this tick.
    pub fn tick(&mut self, ctx: &mut C) -> Vec<OperationFailure> {
        let mut failures = Vec::new();

        // Reverse order keeps indices valid while removing.
        for i in (0..self.pending.len()).rev() {
            match self.pending[i].poll(ctx) {
                Progress::Pending => {}
                Progress::Completed => {
                    let op = self.pending.remove(i);
                    debug!("{} request completed", op.operation());
                }
                Progress::Failed(message) => {
                    let op = self.pending.remove(i);
                    error!("Package {} request failed: {}", op.operation(), message);
                    failures.push(OperationFailure {
                        operation: op.operation(),
                        message,
                    });
                }
            }
        }

        failures
    }

    /// Stop waiting for every pending request. Callbacks are dropped uninvoked.
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            debug!("Discarding {} pending request(s)", self.pending.len());
        }
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Ctx {
        completed: Vec<String>,
        loading: bool,
    }

    #[test_log::test]
    fn test_success_runs_callback_once_and_dequeues() {
        let mut tracker = OperationTracker::<Ctx>::new();
        let mut ctx = Ctx::default();

        tracker.track(Request::ready(Operation::Embed, Ok(())), |ctx: &mut Ctx, ()| {
            ctx.completed.push("embed".into())
        });
        assert_eq!(tracker.len(), 1);

        assert!(tracker.tick(&mut ctx).is_empty());
        assert!(tracker.tick(&mut ctx).is_empty());

        assert_eq!(ctx.completed, vec!["embed"]);
        assert!(tracker.is_idle());
    }

    #[test_log::test]
    fn test_failure_skips_callback_and_surfaces_once() {
        let mut tracker = OperationTracker::<Ctx>::new();
        let mut ctx = Ctx {
            loading: true,
            ..Default::default()
        };

        tracker.track(
            Request::<Vec<u8>>::ready(Operation::List, Err("service offline".into())),
            |ctx: &mut Ctx, _| {
                ctx.completed.push("list".into());
                ctx.loading = false;
            },
        );

        let failures = tracker.tick(&mut ctx);
        assert_eq!(
            failures,
            vec![OperationFailure {
                operation: Operation::List,
                message: "service offline".into()
            }]
        );
        assert!(ctx.completed.is_empty());
        assert!(tracker.is_idle());
        assert!(tracker.tick(&mut ctx).is_empty());
    }

    #[test]
    fn test_pending_request_waits_for_later_tick() {
        let mut tracker = OperationTracker::<Ctx>::new();
        let mut ctx = Ctx::default();
        let (completer, request) = Request::<String>::channel(Operation::Remove);

        tracker.track(request, |ctx: &mut Ctx, name| ctx.completed.push(name));

        assert!(tracker.tick(&mut ctx).is_empty());
        assert_eq!(tracker.len(), 1);
        assert!(ctx.completed.is_empty());

        completer.complete(Ok("com.acme.foo".into()));
        assert!(tracker.tick(&mut ctx).is_empty());
        assert_eq!(ctx.completed, vec!["com.acme.foo"]);
        assert!(tracker.is_idle());
    }

    #[test]
    fn test_mixed_queue_removes_only_finished() {
        let mut tracker = OperationTracker::<Ctx>::new();
        let mut ctx = Ctx::default();
        let (_waiting, pending) = Request::<()>::channel(Operation::Embed);

        tracker.track(Request::ready(Operation::List, Ok(())), |ctx: &mut Ctx, ()| {
            ctx.completed.push("list".into())
        });
        tracker.track(pending, |ctx: &mut Ctx, ()| ctx.completed.push("embed".into()));
        tracker.track(
            Request::<()>::ready(Operation::Remove, Err("busy".into())),
            |ctx: &mut Ctx, ()| ctx.completed.push("remove".into()),
        );

        let failures = tracker.tick(&mut ctx);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].operation, Operation::Remove);
        assert_eq!(ctx.completed, vec!["list"]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_clear_drops_callbacks_without_running_them() {
        let mut tracker = OperationTracker::<Ctx>::new();
        let mut ctx = Ctx::default();
        let (completer, request) = Request::<()>::channel(Operation::Embed);

        tracker.track(request, |ctx: &mut Ctx, ()| ctx.completed.push("embed".into()));
        tracker.clear();
        completer.complete(Ok(()));

        assert!(tracker.tick(&mut ctx).is_empty());
        assert!(ctx.completed.is_empty());
        assert!(tracker.is_idle());
    }

    #[test]
    fn test_failure_converts_to_service_error() {
        let err: PackageError = OperationFailure {
            operation: Operation::Embed,
            message: "not cached".into(),
        }
        .into();
        assert!(matches!(err, PackageError::Service { operation: Operation::Embed, .. }));
    }
}
