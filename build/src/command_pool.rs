/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crossbeam::{
    channel::{unbounded, Receiver},
    deque::{Injector, Steal},
    scope,
    utils::Backoff,
};
use scopeguard::{defer, defer_on_unwind};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

/// How long an idle worker sleeps once spinning stops paying off.
const IDLE_WAIT: Duration = Duration::from_millis(2);

pub trait CommandPoolTask: Send {
    type Result: Send;
    fn run(&self) -> Self::Result;
}

enum QueueTask<T: CommandPoolTask> {
    Stop,
    Task(T),
}

impl<T> std::fmt::Debug for QueueTask<T>
where
    T: CommandPoolTask,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            QueueTask::Stop => write!(f, "QueueTask::Stop"),
            QueueTask::Task(_) => write!(f, "QueueTask::Task"),
        }
    }
}

/// A fixed set of worker threads, each running one task at a time to completion.
pub struct CommandPool<T: CommandPoolTask> {
    capacity: usize,
    job_queue: Injector<QueueTask<T>>,
    running_jobs: AtomicUsize,
}

pub struct Scope<'a, T: CommandPoolTask> {
    command_pool: &'a CommandPool<T>,
    rx: Receiver<T::Result>,
}

// Prevents users from enqueueing tasks outside run().
impl<'a, T> Scope<'a, T>
where
    T: CommandPoolTask,
{
    pub fn enqueue(&self, job: T) {
        self.command_pool.enqueue(job);
    }

    /// Blocks until some task finishes. `None` once every worker has exited, which only happens
    /// early if a worker panicked.
    pub fn recv(&self) -> Option<T::Result> {
        self.rx.recv().ok()
    }

    #[cfg(test)]
    fn try_recv(&self) -> Option<T::Result> {
        self.rx.try_recv().ok()
    }
}

impl<T> CommandPool<T>
where
    T: CommandPoolTask,
{
    pub fn with_capacity(capacity: usize) -> Self {
        CommandPool {
            capacity: capacity.max(1),
            job_queue: Injector::new(),
            running_jobs: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Starts the workers, runs `main_thread` on the calling thread and joins the workers once it
    /// returns. Workers stop when they reach the end of the queue, or as soon as a result can no
    /// longer be delivered. `Err` if any worker panicked.
    pub fn run<F, R>(&self, main_thread: F) -> Result<R, Box<dyn core::any::Any + 'static + Send>>
    where
        F: FnOnce(Scope<T>) -> R,
    {
        defer! {self.assert_no_running_jobs();}
        let (tx, rx) = unbounded();

        scope(|s| {
            for _ in 0..self.capacity {
                let tx = tx.clone();
                s.spawn(move |_| {
                    // A panicking worker takes the others down with it, so the main thread's
                    // recv() sees a disconnect instead of waiting forever.
                    defer_on_unwind! {
                        for _ in 0..self.capacity {
                            self.job_queue.push(QueueTask::Stop);
                        }
                    }

                    let backoff = Backoff::new();
                    loop {
                        match self.job_queue.steal() {
                            Steal::Success(QueueTask::Stop) => break,
                            Steal::Success(QueueTask::Task(task)) => {
                                backoff.reset();
                                self.running_jobs.fetch_add(1, Ordering::SeqCst);
                                defer! {self.running_jobs.fetch_sub(1, Ordering::SeqCst);}
                                let result = task.run();
                                if tx.send(result).is_err() {
                                    // Nobody is listening any more.
                                    break;
                                }
                            }
                            Steal::Retry => {}
                            Steal::Empty => {
                                if backoff.is_completed() {
                                    std::thread::sleep(IDLE_WAIT);
                                } else {
                                    backoff.snooze();
                                }
                            }
                        }
                    }
                });
            }

            // Drop our sender so rx disconnects when the workers exit.
            drop(tx);

            {
                // shut down the threads even if the main thread panics.
                defer!(for _ in 0..self.capacity {
                    self.job_queue.push(QueueTask::Stop);
                });
                main_thread(Scope {
                    command_pool: &self,
                    rx,
                })
            }
        })
    }

    fn enqueue(&self, job: T) {
        self.job_queue.push(QueueTask::Task(job));
    }

    #[cfg(test)]
    fn assert_no_running_jobs(&self) {
        assert_eq!(self.running_jobs.load(Ordering::SeqCst), 0);
    }

    #[cfg(not(test))]
    fn assert_no_running_jobs(&self) {}
}
