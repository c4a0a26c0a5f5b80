use crate::bus::dispatcher::TopicDispatcher;
use crate::bus::{mailbox, BusTransport, Envelope, MailboxRef, TransportMessage};
use crate::membership::NodeId;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Topic '{topic}' carries {registered}, not {requested}")]
    PayloadTypeMismatch {
        topic: String,
        registered: &'static str,
        requested: &'static str,
    },
    #[error("Broadcast bus is detached from the transport")]
    Detached,
}

/// BroadcastBus is this node's entry point to best-effort publish/subscribe. It runs
/// independently of singleton lifecycles.
#[derive(Clone)]
pub struct BroadcastBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    logger: slog::Logger,
    local_node: NodeId,
    transport: Arc<dyn BusTransport>,
    dispatcher: Arc<TopicDispatcher>,
    detached: AtomicBool,
}

impl BroadcastBus {
    pub(crate) fn attach(logger: slog::Logger, local_node: NodeId, transport: Arc<dyn BusTransport>) -> Self {
        let dispatcher = Arc::new(TopicDispatcher::new(logger.clone()));
        transport.attach(local_node.clone(), dispatcher.clone());
        slog::info!(logger, "Attached broadcast bus for {}", local_node);

        BroadcastBus {
            inner: Arc::new(BusInner {
                logger,
                local_node,
                transport,
                dispatcher,
                detached: AtomicBool::new(false),
            }),
        }
    }

    /// `topic()` returns a typed handle on `topic`. The first call binds the topic to `T` in this
    /// process; later calls with another payload type fail.
    pub fn topic<T: Send + Sync + 'static>(&self, topic: &str) -> Result<BusHandle<T>, BusError> {
        if self.inner.detached.load(Ordering::Acquire) {
            return Err(BusError::Detached);
        }
        self.inner.dispatcher.bind_topic::<T>(topic)?;

        Ok(BusHandle {
            topic: topic.to_string(),
            bus: self.inner.clone(),
            _payload: PhantomData,
        })
    }

    pub(crate) fn detach(&self) {
        if !self.inner.detached.swap(true, Ordering::AcqRel) {
            self.inner.transport.detach(&self.inner.local_node);
            slog::info!(self.inner.logger, "Detached broadcast bus for {}", self.inner.local_node);
        }
    }
}

pub struct BusHandle<T> {
    topic: String,
    bus: Arc<BusInner>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for BusHandle<T> {
    fn clone(&self) -> Self {
        BusHandle {
            topic: self.topic.clone(),
            bus: self.bus.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> BusHandle<T> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Subscribing the same mailbox twice has no further effect.
    pub fn subscribe(&self, mailbox: &MailboxRef<T>) {
        self.bus.dispatcher.subscribe(&self.topic, mailbox);
    }

    pub fn unsubscribe(&self, mailbox: &MailboxRef<T>) -> bool {
        self.bus.dispatcher.unsubscribe(&self.topic, mailbox.id())
    }

    /// Live subscribers on this node.
    pub fn subscriber_count(&self) -> usize {
        self.bus.dispatcher.subscriber_count(&self.topic)
    }

    /// `publish()` hands the message to the transport and returns. Every node attached at that
    /// moment, this one included, delivers it to its current subscribers of the topic.
    pub fn publish(&self, payload: T, sender: Option<&MailboxRef<T>>) {
        if self.bus.detached.load(Ordering::Acquire) {
            slog::debug!(self.bus.logger, "Dropping publish on '{}'. Bus is detached.", self.topic);
            return;
        }

        let payload: Arc<dyn Any + Send + Sync> = Arc::new(payload);
        let sender = sender.map(|sender| {
            let reply_to: Arc<dyn Any + Send + Sync> = Arc::new(sender.downgrade());
            reply_to
        });

        self.bus.transport.broadcast(TransportMessage {
            origin: self.bus.local_node.clone(),
            topic: self.topic.clone(),
            payload,
            sender,
        });
    }

    /// `ask()` publishes `payload` with a temporary reply address and waits up to `timeout` for
    /// the first reply. None means nobody answered in time.
    pub async fn ask(&self, payload: T, timeout: Duration) -> Option<Envelope<T>> {
        let (reply_to, mut replies) = mailbox::<T>();
        self.publish(payload, Some(&reply_to));

        let reply = replies.recv_timeout(timeout).await;
        if reply.is_none() {
            slog::debug!(self.bus.logger, "No reply on '{}' within {:?}", self.topic, timeout);
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBusTransport;

    fn discard_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn two_nodes() -> (InMemoryBusTransport, BroadcastBus, BroadcastBus) {
        let transport = InMemoryBusTransport::new();
        let a = BroadcastBus::attach(discard_logger(), NodeId::new("a"), Arc::new(transport.clone()));
        let b = BroadcastBus::attach(discard_logger(), NodeId::new("b"), Arc::new(transport.clone()));
        (transport, a, b)
    }

    #[tokio::test]
    async fn publish_reaches_subscribers_on_every_node() {
        let (_transport, a, b) = two_nodes();
        let on_a = a.topic::<String>("news").unwrap();
        let on_b = b.topic::<String>("news").unwrap();
        let (a_sub, mut a_inbox) = mailbox::<String>();
        let (b_sub, mut b_inbox) = mailbox::<String>();
        on_a.subscribe(&a_sub);
        on_b.subscribe(&b_sub);

        on_a.publish("hello".to_string(), None);

        assert_eq!(a_inbox.recv().await.unwrap().payload(), "hello");
        assert_eq!(b_inbox.recv().await.unwrap().payload(), "hello");
    }

    #[tokio::test]
    async fn late_subscriber_only_sees_later_messages() {
        let (_transport, a, b) = two_nodes();
        let on_a = a.topic::<u32>("counter").unwrap();
        let on_b = b.topic::<u32>("counter").unwrap();
        let (early, mut early_inbox) = mailbox::<u32>();
        on_b.subscribe(&early);

        on_a.publish(1, None);
        let (late, mut late_inbox) = mailbox::<u32>();
        on_b.subscribe(&late);
        on_a.publish(2, None);

        assert_eq!(*early_inbox.recv().await.unwrap().payload(), 1);
        assert_eq!(*early_inbox.recv().await.unwrap().payload(), 2);
        assert_eq!(*late_inbox.recv().await.unwrap().payload(), 2);
        assert!(late_inbox.try_recv().is_none());
    }

    #[tokio::test]
    async fn ask_returns_first_reply_or_none() {
        let (_transport, a, b) = two_nodes();
        let on_a = a.topic::<String>("probe").unwrap();
        let on_b = b.topic::<String>("probe").unwrap();

        assert!(on_a.ask("anyone?".to_string(), Duration::from_millis(50)).await.is_none());

        let (responder, mut requests) = mailbox::<String>();
        on_b.subscribe(&responder);
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let _ = request.reply(format!("b got {}", request.payload()), None);
            }
        });

        let reply = on_a.ask("anyone?".to_string(), Duration::from_secs(1)).await;
        assert_eq!(reply.unwrap().payload(), "b got anyone?");
    }

    #[tokio::test]
    async fn partitioned_nodes_miss_messages() {
        let (transport, a, b) = two_nodes();
        let on_a = a.topic::<u32>("t").unwrap();
        let on_b = b.topic::<u32>("t").unwrap();
        let (sub, mut inbox) = mailbox::<u32>();
        on_b.subscribe(&sub);

        transport.partition(&NodeId::new("a"), &NodeId::new("b"));
        on_a.publish(1, None);
        transport.heal();
        on_a.publish(2, None);

        assert_eq!(*inbox.recv().await.unwrap().payload(), 2);
        assert!(inbox.try_recv().is_none());
    }

    #[tokio::test]
    async fn detached_bus_stops_sending_and_receiving() {
        let (transport, a, b) = two_nodes();
        let on_a = a.topic::<u32>("t").unwrap();
        let on_b = b.topic::<u32>("t").unwrap();
        let (sub, mut inbox) = mailbox::<u32>();
        on_b.subscribe(&sub);

        b.detach();
        on_a.publish(1, None);
        assert!(inbox.try_recv().is_none());
        assert_eq!(transport.attached_nodes(), vec![NodeId::new("a")]);
        assert!(matches!(b.topic::<u32>("t"), Err(BusError::Detached)));

        a.detach();
        on_a.publish(2, None);
        assert!(inbox.try_recv().is_none());
    }
}
