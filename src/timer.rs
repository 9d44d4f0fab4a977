// Auto-update timer: a background thread per blur session that re-triggers the
// pipeline every `auto_update_delay`, and once more `processing_delay` after the
// content behind the element changed. Both run off absolute deadlines, so a
// stream of commands can delay neither of them indefinitely.
//
// The thread only holds a `Weak` to its target, so it never keeps a session alive,
// and it exits as soon as it is cancelled or the target reports it is gone.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, trace};

use crate::config::CaptureTiming;
use crate::error::Error;

/// Something the timer can poke. Returns false once the target is disposed.
pub trait Tick: Send + Sync + 'static {
    fn tick(&self) -> bool;
}

enum TimerCommand {
    ContentChanged,
    SetAutoUpdate(bool),
    Stop,
}

pub struct AutoUpdateTimer {
    commands: Option<Sender<TimerCommand>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AutoUpdateTimer {
    /// Spawn the timer thread for `target`.
    pub fn spawn<T: Tick>(
        name: String,
        target: Weak<T>,
        timing: CaptureTiming,
        auto_update: bool,
    ) -> Result<Self, Error> {
        let (tx, rx) = mpsc::channel();

        let thread_handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let period = timing.auto_update_delay();
                let settle = timing.processing_delay();
                // Commands never move the periodic deadline.
                let mut next_tick = auto_update.then(|| Instant::now() + period);
                // Debounce window: (first unhandled change, deadline).
                let mut pending: Option<(Instant, Instant)> = None;
                loop {
                    let deadline = match (next_tick, pending.map(|(_, at)| at)) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                    let command = match deadline {
                        Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };

                    match command {
                        Ok(TimerCommand::ContentChanged) => {
                            let now = Instant::now();
                            let first = pending.map_or(now, |(first, _)| first);
                            // A burst of changes waits at most one period past its first change.
                            pending = Some((first, (now + settle).min(first + period.max(settle))));
                        }
                        Ok(TimerCommand::SetAutoUpdate(enabled)) => {
                            if !enabled {
                                next_tick = None;
                            } else if next_tick.is_none() {
                                next_tick = Some(Instant::now() + period);
                            }
                        }
                        Ok(TimerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    // Checked after every wakeup: a busy channel never times out.
                    let now = Instant::now();
                    let mut due = false;
                    if pending.is_some_and(|(_, at)| at <= now) {
                        pending = None;
                        due = true;
                    }
                    if let Some(at) = next_tick.filter(|at| *at <= now) {
                        // Skip missed periods instead of bursting to catch up.
                        let next = at + period;
                        next_tick = Some(if next <= now { now + period } else { next });
                        due = true;
                    }
                    if !due {
                        continue;
                    }
                    let Some(target) = target.upgrade() else {
                        break;
                    };
                    if !target.tick() {
                        trace!("timer target disposed");
                        break;
                    }
                }
                debug!("auto-update timer exiting");
            })
            .map_err(Error::Thread)?;

        Ok(Self {
            commands: Some(tx),
            thread_handle: Some(thread_handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.commands.is_some()
    }

    /// Re-capture after the processing delay (debounced).
    pub fn content_changed(&self) {
        self.send(TimerCommand::ContentChanged);
    }

    pub fn set_auto_update(&self, enabled: bool) {
        self.send(TimerCommand::SetAutoUpdate(enabled));
    }

    fn send(&self, command: TimerCommand) {
        if let Some(tx) = &self.commands {
            // The thread may already have exited on its own; nothing to do then.
            let _ = tx.send(command);
        }
    }

    /// Stop the thread and wait for it. Safe to call any number of times,
    /// including from the timer thread itself (it then just detaches).
    pub fn cancel(&mut self) {
        if let Some(tx) = self.commands.take() {
            let _ = tx.send(TimerCommand::Stop);
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if let Err(e) = handle.join() {
                error!("auto-update timer thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for AutoUpdateTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct Counter {
        ticks: AtomicUsize,
        disposed: AtomicBool,
    }

    impl Tick for Counter {
        fn tick(&self) -> bool {
            if self.disposed.load(Ordering::SeqCst) {
                return false;
            }
            self.ticks.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn timing(auto_ms: i64, processing_ms: i64) -> CaptureTiming {
        CaptureTiming::from_millis(auto_ms, processing_ms).unwrap()
    }

    #[test_log::test]
    fn ticks_periodically_until_cancelled() {
        let counter = Arc::new(Counter::default());
        let mut timer =
            AutoUpdateTimer::spawn("tick-test".into(), Arc::downgrade(&counter), timing(5, 1), true).unwrap();
        thread::sleep(millis(100));
        timer.cancel();
        let after_cancel = counter.ticks.load(Ordering::SeqCst);
        assert!(after_cancel >= 2, "only {after_cancel} ticks");

        thread::sleep(millis(30));
        assert_eq!(counter.ticks.load(Ordering::SeqCst), after_cancel);
        assert!(!timer.is_running());
        timer.cancel();
    }

    #[test_log::test]
    fn content_change_ticks_once_without_auto_update() {
        let counter = Arc::new(Counter::default());
        let timer =
            AutoUpdateTimer::spawn("settle-test".into(), Arc::downgrade(&counter), timing(1, 5), false).unwrap();
        thread::sleep(millis(30));
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 0);

        timer.content_changed();
        thread::sleep(millis(100));
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 1);
    }

    /// Sends a content change every 2 ms for `total_ms`.
    fn spam_changes(timer: &AutoUpdateTimer, total_ms: u64) {
        for _ in 0..total_ms / 2 {
            timer.content_changed();
            thread::sleep(millis(2));
        }
    }

    #[test_log::test]
    fn content_changes_do_not_starve_periodic_ticks() {
        let counter = Arc::new(Counter::default());
        let timer =
            AutoUpdateTimer::spawn("busy-test".into(), Arc::downgrade(&counter), timing(20, 10), true).unwrap();
        spam_changes(&timer, 300);
        let ticks = counter.ticks.load(Ordering::SeqCst);
        assert!(ticks >= 5, "only {ticks} ticks");
    }

    #[test_log::test]
    fn change_burst_is_capped_without_auto_update() {
        let counter = Arc::new(Counter::default());
        let timer =
            AutoUpdateTimer::spawn("burst-test".into(), Arc::downgrade(&counter), timing(20, 10), false).unwrap();
        spam_changes(&timer, 200);
        let ticks = counter.ticks.load(Ordering::SeqCst);
        assert!(ticks >= 3, "only {ticks} ticks");
    }

    #[test_log::test]
    fn toggling_auto_update_does_not_push_ticks_back() {
        let counter = Arc::new(Counter::default());
        let timer =
            AutoUpdateTimer::spawn("toggle-test".into(), Arc::downgrade(&counter), timing(20, 10), true).unwrap();
        for _ in 0..100 {
            timer.set_auto_update(true);
            thread::sleep(millis(2));
        }
        let ticks = counter.ticks.load(Ordering::SeqCst);
        assert!(ticks >= 5, "only {ticks} ticks");
    }

    #[test_log::test]
    fn exits_when_target_is_dropped() {
        let counter = Arc::new(Counter::default());
        let mut timer =
            AutoUpdateTimer::spawn("drop-test".into(), Arc::downgrade(&counter), timing(2, 1), true).unwrap();
        drop(counter);
        thread::sleep(millis(20));
        // Joining a thread that already exited returns immediately.
        timer.cancel();
    }

    #[test_log::test]
    fn exits_when_target_reports_disposed() {
        let counter = Arc::new(Counter::default());
        counter.disposed.store(true, Ordering::SeqCst);
        let mut timer =
            AutoUpdateTimer::spawn("dispose-test".into(), Arc::downgrade(&counter), timing(2, 1), true).unwrap();
        thread::sleep(millis(20));
        timer.cancel();
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 0);
    }
}
