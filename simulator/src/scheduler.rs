use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Picks which simulated caller acts next, on a virtual millisecond clock.
pub(crate) struct Scheduler {
    ready: Vec<usize>,
    sleeping: BinaryHeap<Reverse<(u64, usize)>>,
    pub(crate) now_ms: u64,
}

impl Scheduler {
    pub(crate) fn new(callers: usize) -> Self {
        Self {
            ready: (0..callers).collect(),
            sleeping: BinaryHeap::new(),
            now_ms: 0,
        }
    }

    pub(crate) fn sleep(&mut self, caller: usize, duration_ms: u64) {
        let wake_at = self.now_ms.saturating_add(duration_ms.max(1));
        self.sleeping.push(Reverse((wake_at, caller)));
    }

    pub(crate) fn tick(&mut self) {
        self.now_ms = self.now_ms.saturating_add(1);
        self.wake_due();
    }

    /// A random ready caller. When nobody is ready the clock jumps to the next wake-up.
    pub(crate) fn next(&mut self, rng: &mut ChaCha8Rng) -> Option<usize> {
        if self.ready.is_empty() {
            let Reverse((wake_at, _)) = *self.sleeping.peek()?;
            self.now_ms = self.now_ms.max(wake_at);
            self.wake_due();
        }
        let idx = rng.random_range(0..self.ready.len());
        Some(self.ready.swap_remove(idx))
    }

    pub(crate) fn resume(&mut self, caller: usize) {
        self.ready.push(caller);
    }

    fn wake_due(&mut self) {
        while let Some(Reverse((wake_at, caller))) = self.sleeping.peek().copied() {
            if wake_at > self.now_ms {
                break;
            }
            self.sleeping.pop();
            self.ready.push(caller);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sleepers_wake_when_nobody_else_is_ready() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut scheduler = Scheduler::new(1);
        let caller = scheduler.next(&mut rng).unwrap();
        scheduler.sleep(caller, 20);
        assert_eq!(scheduler.next(&mut rng), Some(0));
        assert_eq!(scheduler.now_ms, 20);
    }
}
