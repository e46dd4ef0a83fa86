//! Purpose: Run cascading completions from an explicit job stack instead of the call stack.
//! Exports: `run` (crate-private).
//! Role: Every drain and progress fan-out step in `Resolver` is routed through here.
//! Invariants: The outermost `run` drives; nested calls only enqueue and return.
//! Invariants: Jobs execute depth-first in the order direct recursion would have used.
//! Invariants: Stack depth stays constant regardless of chain length.

use std::cell::RefCell;

type Job = Box<dyn FnOnce()>;

thread_local! {
    // `None` while no driver is active on this thread.
    static JOBS: RefCell<Option<Vec<Job>>> = const { RefCell::new(None) };
}

/// Runs `job` now when nothing is driving, otherwise after the current job.
pub(crate) fn run(job: Job) {
    let first = JOBS.with(|jobs| {
        let mut jobs = jobs.borrow_mut();
        match jobs.as_mut() {
            Some(pending) => {
                pending.push(job);
                None
            }
            None => {
                *jobs = Some(Vec::new());
                Some(job)
            }
        }
    });
    let Some(first) = first else {
        return;
    };

    let _driver = Driver;
    let mut next = Some(first);
    while let Some(job) = next {
        let base = depth();
        job();
        next = JOBS.with(|jobs| {
            let mut jobs = jobs.borrow_mut();
            let pending = jobs.as_mut()?;
            // Jobs pushed by `job` were appended in call order; flip them so
            // the first one pops next.
            pending[base..].reverse();
            pending.pop()
        });
    }
}

fn depth() -> usize {
    JOBS.with(|jobs| jobs.borrow().as_ref().map_or(0, Vec::len))
}

/// Releases the driver slot, also when a job unwinds.
struct Driver;

impl Drop for Driver {
    fn drop(&mut self) {
        JOBS.with(|jobs| *jobs.borrow_mut() = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn push(log: &Rc<RefCell<Vec<String>>>, entry: &str) {
        log.borrow_mut().push(entry.to_string());
    }

    #[test]
    fn outermost_run_executes_immediately() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        run(Box::new(move || push(&sink, "ran")));
        assert_eq!(*log.borrow(), vec!["ran"]);
        assert_eq!(depth(), 0);
    }

    #[test]
    fn nested_jobs_run_depth_first_in_call_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = Rc::clone(&log);
        run(Box::new(move || {
            push(&outer, "root");
            for label in ["a", "b"] {
                let sink = Rc::clone(&outer);
                run(Box::new(move || {
                    push(&sink, label);
                    let child = Rc::clone(&sink);
                    run(Box::new(move || push(&child, &format!("{label}.1"))));
                }));
            }
            push(&outer, "root done");
        }));
        assert_eq!(*log.borrow(), vec!["root", "root done", "a", "a.1", "b", "b.1"]);
    }

    #[test]
    fn deep_nesting_does_not_grow_the_stack() {
        fn descend(remaining: u32, count: Rc<RefCell<u32>>) {
            *count.borrow_mut() += 1;
            if remaining > 0 {
                run(Box::new(move || descend(remaining - 1, count)));
            }
        }

        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        run(Box::new(move || descend(200_000, counter)));
        assert_eq!(*count.borrow(), 200_001);
    }

    #[test]
    fn unwinding_job_releases_the_driver() {
        let result = std::panic::catch_unwind(|| {
            run(Box::new(|| {
                run(Box::new(|| {}));
                panic!("job failed");
            }));
        });
        assert!(result.is_err());
        assert_eq!(depth(), 0);

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        run(Box::new(move || push(&sink, "after")));
        assert_eq!(*log.borrow(), vec!["after"]);
    }
}
