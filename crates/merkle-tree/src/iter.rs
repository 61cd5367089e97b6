use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Terminal states surfaced by [`PullIter::next`].
#[derive(Debug, thiserror::Error)]
pub enum IterError<E> {
    #[error("iterator is done")]
    Done,
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Producer(E),
}

/// Handle given to a spawned producer task. Mirrors the push-style
/// `yield(value, err) -> bool` predicate from the design notes, rendered as
/// an async method: the `bool` returned by the original becomes "should I
/// keep producing", which is `false` once the consumer cancels.
pub struct Producer<T, E> {
    tx: mpsc::Sender<Result<T, E>>,
    cancel: CancellationToken,
}

impl<T, E> Producer<T, E> {
    /// Sends one item (or a terminal error) downstream. Returns `false` once
    /// the consumer has cancelled — the producer should wind down without
    /// calling `send` again.
    pub async fn send(&self, item: Result<T, E>) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            res = self.tx.send(item) => res.is_ok(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A pull-style iterator backed by one producer task and one bounded
/// channel, turning a push-style traversal into `next(token) -> (value, err)`
/// with cancellation, as described in spec.md §4.6 / §9.
pub struct PullIter<T, E> {
    rx: mpsc::Receiver<Result<T, E>>,
    cancel: CancellationToken,
    done: bool,
}

impl<T, E> PullIter<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Spawns `produce` as a background task and returns a handle that pulls
    /// its output through a channel of `buffer` capacity.
    pub fn spawn<F, Fut>(buffer: usize, produce: F) -> Self
    where
        F: FnOnce(Producer<T, E>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer);
        let cancel = CancellationToken::new();
        let producer = Producer {
            tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(produce(producer));
        Self {
            rx,
            cancel,
            done: false,
        }
    }

    /// Returns `IterError::Done` exactly once, after which further calls
    /// return it immediately without blocking on the channel.
    pub async fn next(&mut self, token: &CancellationToken) -> Result<T, IterError<E>> {
        if self.done {
            return Err(IterError::Done);
        }

        tokio::select! {
            _ = token.cancelled() => {
                self.cancel.cancel();
                Err(IterError::Cancelled)
            }
            item = self.rx.recv() => {
                match item {
                    None => {
                        self.done = true;
                        Err(IterError::Done)
                    }
                    Some(Ok(value)) => Ok(value),
                    Some(Err(err)) => {
                        self.done = true;
                        Err(IterError::Producer(err))
                    }
                }
            }
        }
    }

    /// Signals the producer to stop. Safe to call before the first `next`
    /// and after `Done`; idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
