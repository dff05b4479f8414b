use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Bounded pool applying one function to a stream of inputs.
///
/// At most `threads` inputs are in flight at once: submitting blocks until
/// a worker finishes. Outputs are released in the order inputs were
/// submitted, regardless of the order in which workers complete them.
pub struct ThreadPool<I, O> {
    function: Arc<dyn Fn(I) -> O + Send + Sync>,
    pool: rayon::ThreadPool,
    capacity: usize,
    sender: Sender<(u64, O)>,
    receiver: Receiver<(u64, O)>,
    completed: BTreeMap<u64, O>,
    next_submit: u64,
    next_output: u64,
    in_flight: usize,
}

impl<I, O> ThreadPool<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new<F>(function: F, threads: usize) -> Result<Self>
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("worker-{}", idx))
            .build()
            .context("Unable to create worker threads")?;

        let (sender, receiver) = unbounded();

        Ok(ThreadPool {
            function: Arc::new(function),
            pool,
            capacity: threads,
            sender,
            receiver,
            completed: BTreeMap::new(),
            next_submit: 0,
            next_output: 0,
            in_flight: 0,
        })
    }

    /// Submit an input, blocking while all workers are busy.
    pub fn run_when_thread_available(&mut self, input: I) {
        while self.in_flight >= self.capacity {
            self.receive_blocking();
        }

        let index = self.next_submit;
        self.next_submit += 1;
        self.in_flight += 1;

        let function = Arc::clone(&self.function);
        let sender = self.sender.clone();
        self.pool.spawn(move || {
            let output = function(input);
            // the receiver outlives all workers since the pool owns both
            let _ = sender.send((index, output));
        });
    }

    /// True if the next output in submission order is ready.
    pub fn output_available(&mut self) -> bool {
        while let Ok((index, output)) = self.receiver.try_recv() {
            self.in_flight -= 1;
            self.completed.insert(index, output);
        }

        self.completed.contains_key(&self.next_output)
    }

    /// Next output in submission order, waiting for it if necessary.
    ///
    /// Returns None once every submitted input has been returned.
    pub fn pop_output_when_available(&mut self) -> Option<O> {
        if !self.running() {
            return None;
        }

        loop {
            if let Some(output) = self.completed.remove(&self.next_output) {
                self.next_output += 1;
                return Some(output);
            }

            self.receive_blocking();
        }
    }

    /// True while submitted inputs have outputs not yet popped.
    pub fn running(&self) -> bool {
        self.next_output < self.next_submit
    }

    fn receive_blocking(&mut self) {
        // a sender is held by the pool itself so this never disconnects
        if let Ok((index, output)) = self.receiver.recv() {
            self.in_flight -= 1;
            self.completed.insert(index, output);
        }
    }
}
