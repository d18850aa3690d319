//! One direction of a split connection.

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{constants, ProtocolError, Result};
use crate::utils::timeout::until_cancelled;

/// The read or write half of a connection behind its own async lock.
///
/// After the owning transport's `closed` token fires, the half is dropped by
/// [`Half::release`] or by the last [`HalfGuard`] to let go of it, whichever
/// comes first.
pub(crate) struct Half<H> {
    slot: Mutex<Option<H>>,
}

impl<H> Half<H> {
    pub(crate) fn empty() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub(crate) fn new(half: H) -> Self {
        Self {
            slot: Mutex::new(Some(half)),
        }
    }

    /// Wait for exclusive use of this half.
    ///
    /// Resolves to `ProtocolError::ConnectionClosed` once `closed` is cancelled.
    pub(crate) async fn acquire<'a>(
        &'a self,
        closed: &'a CancellationToken,
    ) -> Result<HalfGuard<'a, H>> {
        let slot =
            until_cancelled(async { Ok::<_, ProtocolError>(self.slot.lock().await) }, closed)
                .await?;
        Ok(HalfGuard { slot, closed })
    }

    pub(crate) async fn install(&self, half: H) {
        *self.slot.lock().await = Some(half);
    }

    /// Drop the half now unless an operation holds it. Returns whether one was dropped.
    pub(crate) fn release(&self) -> bool {
        self.slot
            .try_lock()
            .map(|mut slot| slot.take().is_some())
            .unwrap_or(false)
    }
}

/// Exclusive use of a [`Half`] for one operation.
pub(crate) struct HalfGuard<'a, H> {
    slot: MutexGuard<'a, Option<H>>,
    closed: &'a CancellationToken,
}

impl<H> HalfGuard<'_, H> {
    pub(crate) fn get(&mut self) -> Result<&mut H> {
        self.slot
            .as_mut()
            .ok_or_else(|| ProtocolError::TransportError(constants::ERR_NOT_CONNECTED.to_string()))
    }
}

impl<H> Drop for HalfGuard<'_, H> {
    fn drop(&mut self) {
        if self.closed.is_cancelled() {
            self.slot.take();
        }
    }
}
