use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use lte_core::{Rnti, Tti};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

struct DelayedTask {
    /// Filled in by the worker when the entry is received
    due: Tti,
    /// Identifier the entry concerns, for logging only
    rnti: Rnti,
    task: Task,
}

enum CtrlMsg {
    Run { label: &'static str, task: Task },
    Defer { delay_ttis: u32, rnti: Rnti, task: Task },
    Tick(Tti),
}

/// Producer handle of the deferred task pipeline. Cheap to clone; the
/// real-time and event contexts only ever enqueue, never execute.
#[derive(Clone)]
pub struct TaskQueue {
    tx: Sender<CtrlMsg>,
}

impl TaskQueue {
    /// Queue a task for the control-plane context. Tasks from one producer
    /// run in enqueue order.
    pub fn enqueue(&self, label: &'static str, task: impl FnOnce() + Send + 'static) {
        if self.tx.send(CtrlMsg::Run { label, task: Box::new(task) }).is_err() {
            tracing::warn!("TaskQueue: dropping task `{}`, worker is gone", label);
        }
    }

    /// Queue a task that runs once the control-plane TTI clock has advanced
    /// `delay_ttis` past the point of receipt. Carries only the identifier
    /// and the callback, no references into session state.
    pub fn defer(&self, delay_ttis: u32, rnti: Rnti, task: impl FnOnce() + Send + 'static) {
        if self
            .tx
            .send(CtrlMsg::Defer { delay_ttis, rnti, task: Box::new(task) })
            .is_err()
        {
            tracing::warn!("TaskQueue: dropping deferred task for rnti=0x{:x}, worker is gone", rnti);
        }
    }

    /// Advance the control-plane TTI clock. Sent once per TTI by the uplink
    /// pipeline; strictly one-directional.
    pub fn tick(&self, tti: Tti) {
        let _ = self.tx.send(CtrlMsg::Tick(tti));
    }
}

/// Consumer side, owned by the single control-plane execution context.
pub struct TaskWorker {
    rx: Receiver<CtrlMsg>,
    delayed: Vec<DelayedTask>,
    now: Tti,
}

/// Create a connected producer/consumer pair
pub fn task_channel() -> (TaskQueue, TaskWorker) {
    let (tx, rx) = unbounded();
    (
        TaskQueue { tx },
        TaskWorker {
            rx,
            delayed: Vec::new(),
            now: Tti::default(),
        },
    )
}

impl TaskWorker {
    fn handle(&mut self, msg: CtrlMsg) {
        match msg {
            CtrlMsg::Run { label, task } => {
                tracing::trace!("running task `{}`", label);
                task();
            }
            CtrlMsg::Defer { delay_ttis, rnti, task } => {
                let due = self.now.add(delay_ttis);
                tracing::debug!("deferred task for rnti=0x{:x} due at tti {}", rnti, due);
                self.delayed.push(DelayedTask { due, rnti, task });
            }
            CtrlMsg::Tick(tti) => {
                self.now = tti;
                self.run_due();
            }
        }
    }

    fn run_due(&mut self) {
        let now = self.now;
        // The delayed set is small (one entry per in-flight removal)
        let mut i = 0;
        while i < self.delayed.len() {
            if now.diff(self.delayed[i].due) >= 0 {
                let entry = self.delayed.swap_remove(i);
                tracing::debug!("running deferred task for rnti=0x{:x} at tti {}", entry.rnti, now);
                (entry.task)();
            } else {
                i += 1;
            }
        }
    }

    /// Drain everything currently queued, without blocking. Test entry point
    /// and the inner loop of `run`.
    pub fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => self.handle(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Control-plane thread main loop; returns when `running` clears or all
    /// producers are gone.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            match self.rx.recv_timeout(Duration::from_millis(10)) {
                Ok(msg) => {
                    self.handle(msg);
                    self.drain();
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    #[cfg(test)]
    pub fn now(&self) -> Tti {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_tasks_run_in_enqueue_order() {
        let (queue, mut worker) = task_channel();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = Arc::clone(&log);
            queue.enqueue("order", move || log.lock().unwrap().push(i));
        }
        worker.drain();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_deferred_task_waits_for_clock() {
        let (queue, mut worker) = task_channel();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        queue.defer(8, 0x50, move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        queue.tick(Tti::new(4));
        worker.drain();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        queue.tick(Tti::new(8));
        worker.drain();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Does not fire twice
        queue.tick(Tti::new(20));
        worker.drain();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tasks_may_enqueue_tasks() {
        let (queue, mut worker) = task_channel();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let q2 = queue.clone();
        queue.enqueue("outer", move || {
            let f2 = Arc::clone(&f);
            q2.enqueue("inner", move || {
                f2.fetch_add(1, Ordering::SeqCst);
            });
        });
        worker.drain();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
