use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// Why a new snapshot was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRefusal {
    /// The previous snapshot is still running.
    Overlap { elapsed: Duration },
    /// The previous snapshot has been running for at least twice the
    /// interval.
    Stalled { elapsed: Duration },
}

/// Single-slot token that keeps snapshots from overlapping.
pub struct SnapshotGate {
    interval: Duration,
    started_at: Mutex<Option<Instant>>,
}

impl fmt::Debug for SnapshotGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotGate")
            .field("interval", &self.interval)
            .field("busy", &self.slot().is_some())
            .finish()
    }
}

impl SnapshotGate {
    pub fn new(interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            interval,
            started_at: Mutex::new(None),
        })
    }

    fn slot(&self) -> MutexGuard<'_, Option<Instant>> {
        self.started_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the slot, or report how long the holder has had it.
    pub fn try_begin(self: &Arc<Self>) -> Result<SnapshotPermit, GateRefusal> {
        let now = Instant::now();
        let mut slot = self.slot();

        if let Some(started) = *slot {
            let elapsed = now.saturating_duration_since(started);
            return Err(if elapsed >= self.interval * 2 {
                GateRefusal::Stalled { elapsed }
            } else {
                GateRefusal::Overlap { elapsed }
            });
        }

        *slot = Some(now);
        Ok(SnapshotPermit {
            gate: Arc::clone(self),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.slot().is_some()
    }
}

/// Held for the duration of one snapshot; releases the gate on drop.
pub struct SnapshotPermit {
    gate: Arc<SnapshotGate>,
}

impl fmt::Debug for SnapshotPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotPermit").finish_non_exhaustive()
    }
}

impl Drop for SnapshotPermit {
    fn drop(&mut self) {
        self.gate.slot().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn refuses_while_held_and_escalates_after_two_intervals() {
        let gate = SnapshotGate::new(Duration::from_millis(50));
        let permit = gate.try_begin().unwrap();

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(matches!(gate.try_begin(), Err(GateRefusal::Overlap { .. })));

        tokio::time::advance(Duration::from_millis(50)).await;
        match gate.try_begin() {
            Err(GateRefusal::Stalled { elapsed }) => {
                assert!(elapsed >= Duration::from_millis(100))
            }
            other => panic!("expected stall, got {other:?}"),
        }

        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_begin().is_ok());
    }
}
