//! FIFO serialization gate for event handlers.
//!
//! At most one submitted task body runs at any instant. The submitter that
//! finds the gate idle runs its task and then drains whatever was queued
//! meanwhile; every other submitter (including tasks that submit from inside
//! a running task) only enqueues and returns. A panicking task does not stop
//! the drain: the queue is emptied first and the panic is then resumed on the
//! draining thread.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

pub type GateTask = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct GateState {
    executing: bool,
    drainer: Option<ThreadId>,
    queue: VecDeque<GateTask>,
    completed: u64,
}

#[derive(Clone, Default)]
pub struct SerializedEventGate {
    state: Arc<Mutex<GateState>>,
}

/// Whether a submission ran on the caller's stack or was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Drained,
    Queued,
}

impl SerializedEventGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // Tasks never run under this lock, so a poisoned guard still holds a
        // consistent queue.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn submit<F>(&self, task: F) -> Submission
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.lock();
            if state.executing {
                state.queue.push_back(Box::new(task));
                return Submission::Queued;
            }
            state.executing = true;
            state.drainer = Some(thread::current().id());
        }

        let mut first_panic: Option<Box<dyn Any + Send>> = None;
        let mut next: Option<GateTask> = Some(Box::new(task));
        while let Some(task) = next.take() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                first_panic.get_or_insert(payload);
            }
            let mut state = self.lock();
            state.completed += 1;
            match state.queue.pop_front() {
                Some(queued) => next = Some(queued),
                None => {
                    state.executing = false;
                    state.drainer = None;
                }
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        Submission::Drained
    }

    /// Run `task` through the gate and wait for its result.
    ///
    /// Returns `None` when called from a task body on the draining thread,
    /// where waiting would never finish, or when the task panicked.
    pub fn call<T, F>(&self, task: F) -> Option<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_draining_here() {
            return None;
        }
        let (tx, rx) = mpsc::sync_channel(1);
        self.submit(move || {
            let _ = tx.send(task());
        });
        rx.recv().ok()
    }

    /// True when the current thread is the one running task bodies.
    pub fn is_draining_here(&self) -> bool {
        let state = self.lock();
        state.executing && state.drainer == Some(thread::current().id())
    }

    /// True while a task body is running.
    pub fn is_executing(&self) -> bool {
        self.lock().executing
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn completed(&self) -> u64 {
        self.lock().completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn idle_gate_runs_inline() {
        let gate = SerializedEventGate::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let outcome = gate.submit(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(outcome, Submission::Drained);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!gate.is_executing());
    }

    #[test]
    fn nested_submissions_run_after_the_current_task_in_order() {
        let gate = SerializedEventGate::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (g, l) = (gate.clone(), Arc::clone(&log));
        gate.submit(move || {
            l.lock().unwrap().push("outer-start");
            for label in ["first", "second", "third"] {
                let inner_log = Arc::clone(&l);
                let outcome = g.submit(move || inner_log.lock().unwrap().push(label));
                assert_eq!(outcome, Submission::Queued);
            }
            assert!(g.is_executing());
            assert_eq!(g.pending(), 3);
            l.lock().unwrap().push("outer-end");
        });
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &["outer-start", "outer-end", "first", "second", "third"]
        );
        assert_eq!(gate.completed(), 4);
    }

    #[test]
    fn concurrent_submitters_never_overlap() {
        let gate = SerializedEventGate::new();
        let in_flight = Arc::new(AtomicBool::new(false));
        let runs = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let (gate, in_flight, runs, overlaps) = (
                    gate.clone(),
                    Arc::clone(&in_flight),
                    Arc::clone(&runs),
                    Arc::clone(&overlaps),
                );
                thread::spawn(move || {
                    for _ in 0..25 {
                        let (in_flight, runs, overlaps) =
                            (Arc::clone(&in_flight), Arc::clone(&runs), Arc::clone(&overlaps));
                        gate.submit(move || {
                            if in_flight.swap(true, Ordering::SeqCst) {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            thread::yield_now();
                            runs.fetch_add(1, Ordering::SeqCst);
                            in_flight.store(false, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 200);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(gate.pending(), 0);
        assert!(!gate.is_executing());
    }

    #[test]
    fn panicking_task_releases_the_gate() {
        let gate = SerializedEventGate::new();
        let g = gate.clone();
        let result = thread::spawn(move || {
            g.submit(|| panic!("handler blew up"));
        })
        .join();
        assert!(result.is_err());
        assert!(!gate.is_executing());
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        gate.submit(move || r.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn tasks_queued_behind_a_panic_still_run() {
        let gate = SerializedEventGate::new();
        let ran = Arc::new(AtomicBool::new(false));
        let (g, r) = (gate.clone(), Arc::clone(&ran));
        let result = thread::spawn(move || {
            let nested = g.clone();
            g.submit(move || {
                nested.submit(move || r.store(true, Ordering::SeqCst));
                panic!("handler blew up");
            });
        })
        .join();
        assert!(result.is_err());
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(gate.pending(), 0);
        assert!(!gate.is_executing());
    }

    #[test]
    fn call_queued_behind_a_panic_gets_its_result() {
        let gate = SerializedEventGate::new();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let g = gate.clone();
        let drainer = thread::spawn(move || {
            g.submit(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                panic!("handler blew up");
            });
        });
        started_rx.recv().unwrap();

        let g = gate.clone();
        let waiter = thread::spawn(move || g.call(|| 7));
        while gate.pending() == 0 {
            thread::yield_now();
        }
        release_tx.send(()).unwrap();

        assert_eq!(waiter.join().unwrap(), Some(7));
        assert!(drainer.join().is_err());
    }

    #[test]
    fn call_returns_the_task_result() {
        let gate = SerializedEventGate::new();
        assert_eq!(gate.call(|| 6 * 7), Some(42));
        assert!(!gate.is_executing());
    }

    #[test]
    fn call_from_inside_a_task_refuses_instead_of_waiting() {
        let gate = SerializedEventGate::new();
        let g = gate.clone();
        let nested = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&nested);
        gate.submit(move || {
            *slot.lock().unwrap() = Some(g.call(|| 1));
        });
        assert_eq!(*nested.lock().unwrap(), Some(None));
    }

    #[test]
    fn call_waits_for_another_drainer() {
        let gate = SerializedEventGate::new();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let g = gate.clone();
        let drainer = thread::spawn(move || {
            g.submit(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            });
        });
        started_rx.recv().unwrap();
        let g = gate.clone();
        let caller = thread::spawn(move || g.call(|| "done"));
        while gate.pending() == 0 {
            thread::yield_now();
        }
        release_tx.send(()).unwrap();
        assert_eq!(caller.join().unwrap(), Some("done"));
        drainer.join().unwrap();
    }
}
