//! Single-assignment, drop-safe completion handles.
//!
//! A `Completor<T, E>` is handed to whatever task produces a result; the
//! matching `Completion<T, E>` is handed to whatever task is waiting on it.
//! The producer resolves it with either `complete(v)` or `complete_err(e)`.
//! Dropping the `Completor` before either is called resolves the
//! `Completion` with the caller's error type converted from `Cancelled`,
//! matching the cancellation semantics callers of the wire protocols rely
//! on. `E` defaults to `Cancelled` itself for completions that have no
//! richer failure mode to report.

use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("completion was dropped before being resolved")]
pub struct Cancelled;

/// The waiting half of a completion handle.
pub struct Completion<T, E = Cancelled> {
    rx: oneshot::Receiver<Result<T, E>>,
}

/// The resolving half of a completion handle.
pub struct Completor<T, E = Cancelled> {
    tx: oneshot::Sender<Result<T, E>>,
}

pub fn completion_pair<T, E>() -> (Completor<T, E>, Completion<T, E>) {
    let (tx, rx) = oneshot::channel();
    (Completor { tx }, Completion { rx })
}

impl<T, E> Completion<T, E>
where
    E: From<Cancelled>,
{
    pub async fn wait(self) -> Result<T, E> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(E::from(Cancelled)),
        }
    }
}

impl<T, E> Completor<T, E> {
    /// Resolves the completion with a success value. Returns the value
    /// back if the waiting side was already dropped.
    pub fn complete(self, value: T) -> Result<(), T> {
        self.tx.send(Ok(value)).map_err(|sent| match sent {
            Ok(value) => value,
            Err(_) => unreachable!("sent Ok(value) above"),
        })
    }

    /// Resolves the completion with a failure value. Returns the error
    /// back if the waiting side was already dropped.
    pub fn complete_err(self, err: E) -> Result<(), E> {
        self.tx.send(Err(err)).map_err(|sent| match sent {
            Err(err) => err,
            Ok(_) => unreachable!("sent Err(err) above"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_with_value() {
        let (completor, completion) = completion_pair::<u32, Cancelled>();
        completor.complete(42).unwrap();
        assert_eq!(completion.wait().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn completes_with_error() {
        let (completor, completion) = completion_pair::<u32, Cancelled>();
        completor.complete_err(Cancelled).unwrap();
        assert!(completion.wait().await.is_err());
    }

    #[tokio::test]
    async fn dropping_completor_cancels() {
        let (completor, completion) = completion_pair::<u32, Cancelled>();
        drop(completor);
        assert!(completion.wait().await.is_err());
    }
}
