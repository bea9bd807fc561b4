//! Named worker threads that act as execution contexts.
//!
//! A [`Worker`] owns a thread that runs queued jobs one at a time, in the order they were
//! dispatched. Any number of [`Dispatcher`]s can feed jobs into the same worker from arbitrary
//! threads; this is how work is marshaled between the UI context and the frame relay context.

use std::{
    fmt, io,
    panic::resume_unwind,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::drop::defer;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Exit,
}

/// Creates a connected pair of [`Promise`] and [`PromiseHandle`].
pub fn promise<T>() -> (Promise<T>, PromiseHandle<T>) {
    // Capacity of 1 means that `Promise::fulfill` will never block, which is the property we want.
    let (sender, recv) = channel::bounded(1);
    (Promise { inner: sender }, PromiseHandle { recv })
}

/// An empty slot that can be filled with a `T`, fulfilling the promise.
///
/// Fulfilling a [`Promise`] lets the connected [`PromiseHandle`] retrieve the value. A connected
/// pair of [`Promise`] and [`PromiseHandle`] can be created by calling [`promise`].
pub struct Promise<T> {
    inner: Sender<T>,
}

impl<T> Promise<T> {
    /// Fulfills the promise with a value, consuming it.
    ///
    /// This method does not block or fail. If the connected [`PromiseHandle`] was dropped, `value`
    /// will be dropped and nothing happens.
    pub fn fulfill(self, value: T) {
        self.inner.send(value).ok();
    }
}

/// A handle connected to a [`Promise`] that will eventually resolve to a value of type `T`.
pub struct PromiseHandle<T> {
    recv: Receiver<T>,
}

impl<T> PromiseHandle<T> {
    /// Blocks the calling thread until the [`Promise`] is fulfilled.
    pub fn block(self) -> Result<T, PromiseDropped> {
        self.recv.recv().map_err(|_| PromiseDropped { _priv: () })
    }
}

/// An error returned by [`PromiseHandle::block`] indicating that the connected [`Promise`] object
/// was dropped without being fulfilled.
///
/// For a [`Worker`] barrier, this means that the worker has exited or panicked before reaching
/// the barrier.
#[derive(Debug, Clone, Copy)]
pub struct PromiseDropped {
    _priv: (),
}

impl fmt::Display for PromiseDropped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("promise was dropped without being fulfilled")
    }
}

impl std::error::Error for PromiseDropped {}

/// Reasons why [`Dispatcher::try_dispatch`] can reject a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The worker's queue is at capacity.
    #[error("worker queue is full")]
    Full,
    /// The worker has exited.
    #[error("worker has exited")]
    Closed,
}

/// A builder object that can be used to configure and spawn a [`Worker`].
#[derive(Clone)]
pub struct WorkerBuilder {
    name: Option<String>,
    capacity: Option<usize>,
}

impl WorkerBuilder {
    /// Sets the name of the [`Worker`] thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Bounds the number of jobs that may be queued on the [`Worker`].
    ///
    /// By default, the queue is unbounded. With a bounded queue, [`Dispatcher::dispatch`] blocks
    /// while the queue is full, and [`Dispatcher::try_dispatch`] rejects the job instead.
    pub fn capacity(self, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..self
        }
    }

    /// Spawns the [`Worker`] thread.
    pub fn spawn(self) -> io::Result<Worker> {
        let (sender, recv) = match self.capacity {
            Some(capacity) => channel::bounded(capacity),
            None => channel::unbounded(),
        };
        let name: Arc<str> = self.name.as_deref().unwrap_or("worker").into();

        let mut builder = thread::Builder::new();
        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        let thread_name = name.clone();
        let handle = builder.spawn(move || {
            log::trace!("worker '{thread_name}' starting");
            let _guard = defer(move || log::trace!("worker '{thread_name}' exiting"));
            for message in recv {
                match message {
                    Message::Run(job) => job(),
                    Message::Exit => break,
                }
            }
        })?;

        Ok(Worker {
            dispatcher: Dispatcher { name, sender },
            handle: Some(handle),
        })
    }
}

/// A cloneable handle that queues jobs on a [`Worker`].
///
/// Dispatchers do not keep the worker alive. Once the owning [`Worker`] is dropped, dispatching
/// fails and the job is discarded.
#[derive(Clone)]
pub struct Dispatcher {
    name: Arc<str>,
    sender: Sender<Message>,
}

impl Dispatcher {
    /// Returns the name of the worker this dispatcher feeds.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues `job` on the worker, blocking while a bounded queue is full.
    ///
    /// Returns `false` if the worker has exited, in which case `job` is dropped without running.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.send(Message::Run(Box::new(job))) {
            Ok(()) => true,
            Err(_) => {
                log::trace!("worker '{}' has exited, dropping job", self.name);
                false
            }
        }
    }

    /// Queues `job` on the worker without blocking.
    pub fn try_dispatch<F>(&self, job: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.try_send(Message::Run(Box::new(job))) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DispatchError::Full),
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::Closed),
        }
    }

    /// Blocks until every job dispatched before this call has finished running.
    pub fn sync(&self) -> Result<(), PromiseDropped> {
        let (promise, handle) = promise();
        self.dispatch(move || promise.fulfill(()));
        handle.block()
    }
}

/// A handle to a worker thread.
///
/// When dropped, the worker finishes the jobs queued so far, then exits and is joined. If the
/// thread has panicked, the panic will be forwarded to the thread dropping the `Worker`.
pub struct Worker {
    dispatcher: Dispatcher,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Returns a builder that can be used to configure and spawn a [`Worker`].
    #[inline]
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder {
            name: None,
            capacity: None,
        }
    }

    /// Returns a new [`Dispatcher`] feeding this worker.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Queues `job` on the worker. See [`Dispatcher::dispatch`].
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatcher.dispatch(job)
    }

    /// Blocks until every job dispatched before this call has finished running.
    pub fn sync(&self) -> Result<(), PromiseDropped> {
        self.dispatcher.sync()
    }

    fn wait_for_exit(&mut self) {
        let Some(handle) = self.handle.take() else { return };
        if handle.thread().id() == thread::current().id() {
            // The last owner is being dropped by one of our own jobs; joining would deadlock.
            log::trace!("worker '{}' dropped from its own thread", self.dispatcher.name);
            return;
        }

        // Wait for it to exit and propagate its panic if it panicked.
        if let Err(payload) = handle.join() {
            if !thread::panicking() {
                resume_unwind(payload);
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Fails only if the thread is already gone, which `wait_for_exit` reports.
        self.dispatcher.sender.send(Message::Exit).ok();

        self.wait_for_exit();
    }
}
