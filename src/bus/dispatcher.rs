use crate::bus::{BusError, Envelope, InboundDispatch, MailboxId, MailboxRef, TransportMessage, WeakMailboxRef};
use arc_swap::ArcSwap;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A subscriber with its payload type erased, so subscribers of every topic fit in one table.
trait ErasedSubscriber: Send + Sync {
    fn id(&self) -> MailboxId;

    fn is_closed(&self) -> bool;

    /// Returns false if the subscriber's mailbox is gone.
    fn offer(&self, message: &TransportMessage) -> bool;
}

impl<T: Send + Sync + 'static> ErasedSubscriber for MailboxRef<T> {
    fn id(&self) -> MailboxId {
        MailboxRef::id(self)
    }

    fn is_closed(&self) -> bool {
        MailboxRef::is_closed(self)
    }

    fn offer(&self, message: &TransportMessage) -> bool {
        let payload = match message.payload.clone().downcast::<T>() {
            Ok(payload) => payload,
            // Filtered out by the dispatcher's type check.
            Err(_) => return true,
        };
        let sender = message
            .sender
            .as_ref()
            .and_then(|sender| sender.downcast_ref::<WeakMailboxRef<T>>())
            .cloned();

        self.deliver(Envelope::from_shared(payload, sender))
    }
}

#[derive(Clone)]
struct TopicEntry {
    payload_type: TypeId,
    payload_type_name: &'static str,
    subscribers: Vec<Arc<dyn ErasedSubscriber>>,
}

/// TopicDispatcher is this node's subscriber table. Reads on the delivery path never block: every
/// change publishes a new copy of the table.
pub(crate) struct TopicDispatcher {
    logger: slog::Logger,
    topics: ArcSwap<HashMap<String, TopicEntry>>,
}

impl TopicDispatcher {
    pub(crate) fn new(logger: slog::Logger) -> Self {
        TopicDispatcher {
            logger,
            topics: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Binds `topic` to payload type `T` for the lifetime of this process. Binding the same type
    /// again is a no-op.
    pub(crate) fn bind_topic<T: Send + Sync + 'static>(&self, topic: &str) -> Result<(), BusError> {
        let mut bound = Ok(());
        self.topics.rcu(|topics| {
            bound = Ok(());
            if let Some(entry) = topics.get(topic) {
                if entry.payload_type != TypeId::of::<T>() {
                    bound = Err(BusError::PayloadTypeMismatch {
                        topic: topic.to_string(),
                        registered: entry.payload_type_name,
                        requested: type_name::<T>(),
                    });
                }
                return Arc::clone(topics);
            }

            let mut topics = HashMap::clone(topics);
            topics.insert(
                topic.to_string(),
                TopicEntry {
                    payload_type: TypeId::of::<T>(),
                    payload_type_name: type_name::<T>(),
                    subscribers: Vec::new(),
                },
            );
            Arc::new(topics)
        });

        bound
    }

    /// Returns false if the mailbox was already subscribed.
    pub(crate) fn subscribe<T: Send + Sync + 'static>(&self, topic: &str, mailbox: &MailboxRef<T>) -> bool {
        let mut added = false;
        self.topics.rcu(|topics| {
            added = false;
            let mut topics = HashMap::clone(topics);
            if let Some(entry) = topics.get_mut(topic) {
                entry.subscribers.retain(|sub| !sub.is_closed());
                if entry.subscribers.iter().all(|sub| sub.id() != mailbox.id()) {
                    entry.subscribers.push(Arc::new(mailbox.clone()));
                    added = true;
                }
            }
            topics
        });

        if added {
            slog::debug!(self.logger, "Mailbox {:?} subscribed to '{}'", mailbox.id(), topic);
        }
        added
    }

    /// Returns false if the mailbox was not subscribed.
    pub(crate) fn unsubscribe(&self, topic: &str, mailbox_id: MailboxId) -> bool {
        let mut removed = false;
        self.topics.rcu(|topics| {
            removed = false;
            let mut topics = HashMap::clone(topics);
            if let Some(entry) = topics.get_mut(topic) {
                let before = entry.subscribers.len();
                entry.subscribers.retain(|sub| sub.id() != mailbox_id);
                removed = entry.subscribers.len() != before;
            }
            topics
        });

        removed
    }

    pub(crate) fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .load()
            .get(topic)
            .map(|entry| entry.subscribers.iter().filter(|sub| !sub.is_closed()).count())
            .unwrap_or(0)
    }

    fn prune_closed(&self, topic: &str) {
        self.topics.rcu(|topics| {
            let mut topics = HashMap::clone(topics);
            if let Some(entry) = topics.get_mut(topic) {
                entry.subscribers.retain(|sub| !sub.is_closed());
            }
            topics
        });
    }
}

impl InboundDispatch for TopicDispatcher {
    fn dispatch(&self, message: &TransportMessage) {
        let topics = self.topics.load();
        let entry = match topics.get(&message.topic) {
            Some(entry) => entry,
            None => return,
        };

        if (*message.payload).type_id() != entry.payload_type {
            slog::warn!(
                self.logger,
                "Dropping message from {} on '{}'. Payload is not a {}.",
                message.origin,
                message.topic,
                entry.payload_type_name
            );
            return;
        }

        let mut gone = 0;
        for subscriber in &entry.subscribers {
            if !subscriber.offer(message) {
                gone += 1;
            }
        }

        if gone > 0 {
            slog::debug!(self.logger, "Pruning {} closed mailbox(es) from '{}'", gone, message.topic);
            self.prune_closed(&message.topic);
        }
    }
}
