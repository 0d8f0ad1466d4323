//! In-flight construction markers.
//!
//! The first caller to miss on a cacheable key installs a marker and runs
//! the factory (the leader); everyone else arriving for the same key waits
//! on the marker instead of constructing a duplicate. Waiters are parked
//! threads or async wakers.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};
use std::time::Instant;

use parking_lot::Mutex;

use crate::instance::Instance;

enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

enum State {
  Constructing,
  Ready(Instance),
  /// The leader failed or panicked; waiters must start over.
  Abandoned,
}

struct Inner {
  state: State,
  waiters: VecDeque<Waiter>,
}

/// How a wait on a marker ended.
pub(crate) enum Outcome {
  Ready(Instance),
  Abandoned,
  TimedOut,
}

pub(crate) struct InFlight {
  inner: Mutex<Inner>,
}

impl InFlight {
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Constructing,
        waiters: VecDeque::new(),
      }),
    }
  }

  pub(crate) fn complete(&self, instance: Instance) {
    self.finish(State::Ready(instance));
  }

  pub(crate) fn abandon(&self) {
    self.finish(State::Abandoned);
  }

  fn finish(&self, state: State) {
    let mut inner = self.inner.lock();
    inner.state = state;
    for waiter in inner.waiters.drain(..) {
      waiter.wake();
    }
  }

  /// Blocks the calling thread until the marker completes or `deadline`
  /// passes.
  pub(crate) fn wait(&self, deadline: Option<Instant>) -> Outcome {
    let current = thread::current();
    let mut queued = false;
    let mut inner = self.inner.lock();
    loop {
      match &inner.state {
        State::Ready(instance) => return Outcome::Ready(instance.clone()),
        State::Abandoned => return Outcome::Abandoned,
        State::Constructing => {
          // Spurious unparks loop back here; the thread is queued once.
          if !queued {
            inner.waiters.push_back(Waiter::Sync(current.clone()));
            queued = true;
          }
          drop(inner); // Unlock before parking.
          match deadline {
            Some(deadline) => {
              let now = Instant::now();
              if now >= deadline {
                self.dequeue(&current);
                return Outcome::TimedOut;
              }
              thread::park_timeout(deadline - now);
            }
            None => thread::park(),
          }
          inner = self.inner.lock();
        }
      }
    }
  }

  fn dequeue(&self, thread: &Thread) {
    let id = thread.id();
    self
      .inner
      .lock()
      .waiters
      .retain(|waiter| !matches!(waiter, Waiter::Sync(queued) if queued.id() == id));
  }

  /// Suspends the calling task until the marker completes.
  pub(crate) fn wait_async(&self) -> WaitFuture<'_> {
    WaitFuture { flight: self }
  }
}

pub(crate) struct WaitFuture<'a> {
  flight: &'a InFlight,
}

impl Future for WaitFuture<'_> {
  type Output = Outcome;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.flight.inner.lock();
    match &inner.state {
      State::Ready(instance) => Poll::Ready(Outcome::Ready(instance.clone())),
      State::Abandoned => Poll::Ready(Outcome::Abandoned),
      State::Constructing => {
        let waker = cx.waker();
        let queued = inner
          .waiters
          .iter()
          .any(|waiter| matches!(waiter, Waiter::Async(queued) if queued.will_wake(waker)));
        if !queued {
          inner.waiters.push_back(Waiter::Async(waker.clone()));
        }
        Poll::Pending
      }
    }
  }
}
