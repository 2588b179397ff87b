//! Event Bus
//!
//! Synchronous publish/subscribe for runtime events raised by instrumented
//! code. Subscriptions are fixed when the bus is built; `publish` calls every
//! listener subscribed to the event's kind, in subscription order, on the
//! publishing thread.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};
use warden_core::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ChatMessage,
    CommandDispatch,
    PlayerJoin,
    PrivilegeGrant,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::ChatMessage => "chat_message",
            EventKind::CommandDispatch => "command_dispatch",
            EventKind::PlayerJoin => "player_join",
            EventKind::PrivilegeGrant => "privilege_grant",
        };
        f.write_str(s)
    }
}

/// A runtime occurrence. `caller` is the plugin the action is attributed to,
/// `None` when it originated in the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    ChatMessage {
        player: String,
        message: String,
    },
    CommandDispatch {
        sender: String,
        command: String,
        caller: Option<Identity>,
    },
    PlayerJoin {
        player: String,
    },
    PrivilegeGrant {
        target: String,
        granted: bool,
        caller: Option<Identity>,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ChatMessage { .. } => EventKind::ChatMessage,
            Event::CommandDispatch { .. } => EventKind::CommandDispatch,
            Event::PlayerJoin { .. } => EventKind::PlayerJoin,
            Event::PrivilegeGrant { .. } => EventKind::PrivilegeGrant,
        }
    }
}

pub trait Listener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Event kinds delivered to this listener.
    fn subscriptions(&self) -> &'static [EventKind];

    /// Must not block; runs on the publishing thread.
    fn on_event(&self, event: &Event) -> anyhow::Result<()>;
}

/// Assembles the subscription table.
#[derive(Default)]
pub struct EventBusBuilder {
    listeners: Vec<Arc<dyn Listener>>,
}

impl EventBusBuilder {
    pub fn listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn listeners(mut self, listeners: impl IntoIterator<Item = Arc<dyn Listener>>) -> Self {
        self.listeners.extend(listeners);
        self
    }

    pub fn build(self) -> EventBus {
        let mut subscribers: HashMap<EventKind, Vec<Arc<dyn Listener>>> = HashMap::new();
        for listener in self.listeners {
            for kind in listener.subscriptions() {
                debug!(listener = listener.name(), kind = %kind, "[EventBus] Subscribed");
                subscribers.entry(*kind).or_default().push(listener.clone());
            }
        }
        EventBus { subscribers }
    }
}

pub struct EventBus {
    subscribers: HashMap<EventKind, Vec<Arc<dyn Listener>>>,
}

impl EventBus {
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    /// Deliver `event` to every subscribed listener. Returns how many
    /// listeners handled it without failing.
    pub fn publish(&self, event: &Event) -> usize {
        let kind = event.kind();
        let Some(listeners) = self.subscribers.get(&kind) else {
            return 0;
        };

        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(listener = listener.name(), kind = %kind, "[EventBus] Listener failed: {e:#}"),
                Err(_) => error!(listener = listener.name(), kind = %kind, "[EventBus] Listener panicked"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Listener for Recorder {
        fn name(&self) -> &'static str {
            self.tag
        }

        fn subscriptions(&self) -> &'static [EventKind] {
            &[EventKind::ChatMessage, EventKind::PlayerJoin]
        }

        fn on_event(&self, event: &Event) -> anyhow::Result<()> {
            self.log.lock().push(format!("{}:{}", self.tag, event.kind()));
            Ok(())
        }
    }

    struct Faulty {
        panics: bool,
    }

    impl Listener for Faulty {
        fn name(&self) -> &'static str {
            "faulty"
        }

        fn subscriptions(&self) -> &'static [EventKind] {
            &[EventKind::ChatMessage]
        }

        fn on_event(&self, _event: &Event) -> anyhow::Result<()> {
            if self.panics {
                panic!("listener bug");
            }
            anyhow::bail!("listener refused")
        }
    }

    fn chat() -> Event {
        Event::ChatMessage {
            player: "alex".into(),
            message: "hi".into(),
        }
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::builder()
            .listener(Arc::new(Recorder { tag: "first", log: log.clone() }))
            .listener(Arc::new(Recorder { tag: "second", log: log.clone() }))
            .build();

        assert_eq!(bus.publish(&chat()), 2);
        assert_eq!(bus.publish(&Event::PlayerJoin { player: "alex".into() }), 2);
        assert_eq!(
            *log.lock(),
            vec![
                "first:chat_message",
                "second:chat_message",
                "first:player_join",
                "second:player_join"
            ]
        );
    }

    #[test]
    fn test_failing_listeners_do_not_stop_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::builder()
            .listener(Arc::new(Faulty { panics: true }))
            .listener(Arc::new(Faulty { panics: false }))
            .listener(Arc::new(Recorder { tag: "after", log: log.clone() }))
            .build();

        assert_eq!(bus.publish(&chat()), 1);
        assert_eq!(*log.lock(), vec!["after:chat_message"]);
    }

    #[test]
    fn test_unsubscribed_kind_is_a_no_op() {
        let bus = EventBus::builder().build();
        assert_eq!(bus.subscriber_count(EventKind::PrivilegeGrant), 0);
        assert_eq!(
            bus.publish(&Event::PrivilegeGrant {
                target: "alex".into(),
                granted: true,
                caller: None,
            }),
            0
        );
    }
}
