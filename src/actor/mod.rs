use crate::singleton::{
    DeregisterError, RegisterError, RegisterInput, SingletonHandle, SingletonRegistry,
};
use std::error::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

// The registry table has exactly one writer: this actor. Everything else talks to it through
// `RegistryActorClient`.
enum Event {
    // Validate join + duplicates + role eligibility, then spawn the lifecycle task.
    Register(RegisterInput, Callback<SingletonHandle, RegisterError>),

    // Cancel the lifecycle task and hand its JoinHandle back, so the caller can wait for the local
    // instance to stop without blocking the actor.
    Deregister(String, Callback<JoinHandle<()>, DeregisterError>),

    ListRegistrations(oneshot::Sender<Vec<String>>),

    // Stop every lifecycle task, then exit the event loop.
    Shutdown(oneshot::Sender<Vec<JoinHandle<()>>>),
}

struct Callback<O, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O, E: Error> Callback<O, E> {
    fn send(self, message: Result<O, E>) {
        let _ = self.0.send(message);
    }
}

#[derive(Clone)]
pub(crate) struct RegistryActorClient {
    logger: slog::Logger,
    sender: mpsc::Sender<Event>,
}

/// Does not keep the registry actor alive.
#[derive(Clone)]
pub(crate) struct WeakRegistryClient {
    logger: slog::Logger,
    sender: mpsc::WeakSender<Event>,
}

pub(crate) struct RegistryActorQueue {
    receiver: mpsc::Receiver<Event>,
}

impl RegistryActorClient {
    pub(crate) fn new(logger: slog::Logger, buffer_size: usize) -> (Self, RegistryActorQueue) {
        let (tx, rx) = mpsc::channel(buffer_size);

        (
            RegistryActorClient { logger, sender: tx },
            RegistryActorQueue { receiver: rx },
        )
    }

    pub(crate) fn weak(&self) -> WeakRegistryClient {
        WeakRegistryClient {
            logger: self.logger.clone(),
            sender: self.sender.downgrade(),
        }
    }

    pub(crate) async fn register(&self, input: RegisterInput) -> Result<SingletonHandle, RegisterError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Event::Register(input, Callback(tx)))
            .await
            .map_err(|_| RegisterError::RegistryExited)?;

        rx.await.map_err(|_| RegisterError::RegistryExited)?
    }

    /// Resolves once the local instance (if any) has stopped.
    pub(crate) async fn deregister(&self, name: String) -> Result<(), DeregisterError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Event::Deregister(name, Callback(tx)))
            .await
            .map_err(|_| DeregisterError::RegistryExited)?;

        let lifecycle = rx.await.map_err(|_| DeregisterError::RegistryExited)??;
        self.await_lifecycle(lifecycle).await;
        Ok(())
    }

    /// Names of the singletons registered on this node. Empty once the actor has exited.
    pub(crate) async fn registered_singletons(&self) -> Vec<String> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Event::ListRegistrations(tx)).await.is_err() {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Stops every local lifecycle and waits for them to finish standing down. Safe to call more
    /// than once.
    pub(crate) async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Event::Shutdown(tx)).await.is_err() {
            return;
        }

        if let Ok(lifecycles) = rx.await {
            for lifecycle in lifecycles {
                self.await_lifecycle(lifecycle).await;
            }
        }
    }

    async fn await_lifecycle(&self, lifecycle: JoinHandle<()>) {
        if let Err(e) = lifecycle.await {
            slog::error!(self.logger, "Singleton lifecycle task terminated abnormally: {:?}", e);
        }
    }
}

impl WeakRegistryClient {
    pub(crate) fn upgrade(&self) -> Option<RegistryActorClient> {
        self.sender.upgrade().map(|sender| RegistryActorClient {
            logger: self.logger.clone(),
            sender,
        })
    }
}

/// RegistryActor is the singleton registry in actor model.
pub(crate) struct RegistryActor {
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    registry: SingletonRegistry,
}

impl RegistryActor {
    pub(crate) fn new(logger: slog::Logger, queue: RegistryActorQueue, registry: SingletonRegistry) -> Self {
        RegistryActor {
            logger,
            receiver: queue.receiver,
            registry,
        }
    }

    pub(crate) async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }

        slog::info!(self.logger, "Registry actor exited");
    }

    // This must NOT be async. Anything that waits (instance start/stop) happens on the lifecycle
    // tasks, and callers await the returned JoinHandles themselves.
    //
    // Returns false when the event loop should exit.
    fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Register(input, callback) => {
                let result = self.registry.register(input);
                callback.send(result);
            }
            Event::Deregister(name, callback) => {
                let result = self.registry.deregister(&name);
                callback.send(result);
            }
            Event::ListRegistrations(callback) => {
                let _ = callback.send(self.registry.registered());
            }
            Event::Shutdown(callback) => {
                let _ = callback.send(self.registry.shutdown());
                return false;
            }
        }

        true
    }
}
