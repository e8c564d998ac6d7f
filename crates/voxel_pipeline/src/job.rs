//! One-shot asynchronous unit of work with a non-blocking completion poll.
//!
//! Jobs execute on rayon's thread pool; the pipeline thread only ever polls
//! [`Job::done`] and applies results, so no stage state needs locking. The
//! blocking escape hatch [`Job::force_complete`] exists for teardown:
//! disposing a stage must not leave background work running against freed
//! chunk records.

use crossbeam_channel::{Receiver, TryRecvError};

/// A one-shot async computation producing a `T`.
///
/// Completion is observed through [`done`](Self::done), which transitions to
/// `true` exactly once and extracts the result at that transition. The result
/// is consumed with [`take_result`](Self::take_result).
pub struct Job<T> {
  rx: Option<Receiver<T>>,
  result: Option<T>,
}

impl<T: Send + 'static> Job<T> {
  /// Start `work` on the rayon pool and return immediately.
  pub fn spawn<F>(work: F) -> Self
  where
    F: FnOnce() -> T + Send + 'static,
  {
    let (tx, rx) = crossbeam_channel::bounded(1);
    rayon::spawn(move || {
      // The receiver may be gone if the job was abandoned; that is fine.
      let _ = tx.send(work());
    });
    Self {
      rx: Some(rx),
      result: None,
    }
  }

  /// A job that completed synchronously with `value`.
  pub fn ready(value: T) -> Self {
    Self {
      rx: None,
      result: Some(value),
    }
  }

  /// Non-blocking completion poll.
  ///
  /// Once this returns `true` it returns `true` forever; the underlying
  /// result is cached on the first observed completion.
  pub fn done(&mut self) -> bool {
    if self.result.is_some() {
      return true;
    }
    let Some(rx) = &self.rx else {
      // Result already taken: the job finished in a previous life.
      return true;
    };
    match rx.try_recv() {
      Ok(value) => {
        self.result = Some(value);
        self.rx = None;
        true
      }
      Err(TryRecvError::Empty) => false,
      Err(TryRecvError::Disconnected) => {
        // The worker dropped the sender without producing a value: the job
        // body panicked. Collaborator defect, not a scheduler condition.
        panic!("chunk job worker terminated without producing a result");
      }
    }
  }

  /// Block until the work finishes, then run the same extraction path as
  /// [`done`](Self::done). Used for disposal; never called on the steady
  /// tick path.
  pub fn force_complete(&mut self) {
    if self.result.is_some() {
      return;
    }
    let Some(rx) = self.rx.take() else {
      return;
    };
    match rx.recv() {
      Ok(value) => self.result = Some(value),
      Err(_) => panic!("chunk job worker terminated without producing a result"),
    }
  }

  /// Take the result. Valid only after [`done`](Self::done) returned `true`.
  pub fn take_result(&mut self) -> T {
    self
      .result
      .take()
      .expect("take_result called before job completion")
  }
}
