//! The single cancellation token shared by every worker.
//!
//! Grounded on the "done channel" idiom: cancelling drops the handle's
//! sender, which disconnects the channel; every worker's `select!` includes
//! a `recv` on the token so a disconnect fires immediately and unblocks
//! whichever other `recv`/`send` it was parked on.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// A cheaply cloneable handle workers observe on their next `select!`.
#[derive(Clone)]
pub struct CancellationToken {
    rx: Receiver<()>,
}

impl CancellationToken {
    /// True once `CancellationHandle::cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// The receiver to include in a `crossbeam_channel::select!` block.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Held by the orchestrator; dropping or calling `cancel` signals every
/// token cloned from the same pair.
pub struct CancellationHandle {
    _tx: Sender<()>,
}

impl CancellationHandle {
    pub fn cancel(self) {
        drop(self);
    }
}

/// Creates a linked (token, handle) pair. `token` can be cloned freely and
/// handed to every worker; dropping `handle` (or calling `.cancel()` on it)
/// cancels all of them at once.
pub fn cancellation_pair() -> (CancellationToken, CancellationHandle) {
    let (tx, rx) = bounded(0);
    (CancellationToken { rx }, CancellationHandle { _tx: tx })
}
