//! Heuristics: listeners that correlate runtime events.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;
use warden_core::Clock;

use crate::event_bus::{Event, EventKind, Listener};
use crate::report::{Report, ReportSink, Severity};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Flags a plugin granting privileges right after a human-triggered event.
///
/// Tracks the last time a chat message, command dispatch, or join was seen.
/// A privilege grant attributed to a plugin within the window of any of them
/// looks like a backdoor reacting to a trigger phrase.
pub struct ForcePrivilegeHeuristic {
    clock: Arc<dyn Clock>,
    sink: ReportSink,
    window: Duration,
    last_seen: Mutex<[Option<Instant>; 3]>,
}

impl ForcePrivilegeHeuristic {
    pub const NAME: &'static str = "force-privilege";

    pub fn new(clock: Arc<dyn Clock>, sink: ReportSink) -> Self {
        Self::with_window(clock, sink, DEFAULT_WINDOW)
    }

    pub fn with_window(clock: Arc<dyn Clock>, sink: ReportSink, window: Duration) -> Self {
        Self {
            clock,
            sink,
            window,
            last_seen: Mutex::new([None; 3]),
        }
    }

    fn slot(kind: EventKind) -> Option<usize> {
        match kind {
            EventKind::ChatMessage => Some(0),
            EventKind::CommandDispatch => Some(1),
            EventKind::PlayerJoin => Some(2),
            EventKind::PrivilegeGrant => None,
        }
    }

    fn recent_trigger(&self, now: Instant) -> Option<EventKind> {
        let last_seen = self.last_seen.lock();
        [EventKind::ChatMessage, EventKind::CommandDispatch, EventKind::PlayerJoin]
            .into_iter()
            .zip(last_seen.iter())
            .find(|(_, seen)| seen.is_some_and(|t| now.saturating_duration_since(t) <= self.window))
            .map(|(kind, _)| kind)
    }
}

impl Listener for ForcePrivilegeHeuristic {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[
            EventKind::ChatMessage,
            EventKind::CommandDispatch,
            EventKind::PlayerJoin,
            EventKind::PrivilegeGrant,
        ]
    }

    fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        let now = self.clock.now();
        if let Some(slot) = Self::slot(event.kind()) {
            self.last_seen.lock()[slot] = Some(now);
            return Ok(());
        }

        let Event::PrivilegeGrant {
            target,
            granted: true,
            caller: Some(caller),
        } = event
        else {
            return Ok(());
        };
        match self.recent_trigger(now) {
            Some(trigger) => self.sink.submit(Report::new(
                Self::NAME,
                Severity::High,
                caller,
                format!("{caller} granted operator status to {target} right after a {trigger} event"),
            )),
            None => debug!(caller = %caller, "[Heuristics] Privilege grant outside the trigger window"),
        }
        Ok(())
    }
}

pub type ListenerFactory = fn(Arc<dyn Clock>, ReportSink) -> Arc<dyn Listener>;

fn force_privilege(clock: Arc<dyn Clock>, sink: ReportSink) -> Arc<dyn Listener> {
    Arc::new(ForcePrivilegeHeuristic::new(clock, sink))
}

/// Every built-in heuristic, in subscription order.
pub const BUILTIN_HEURISTICS: &[(&str, ListenerFactory)] = &[(ForcePrivilegeHeuristic::NAME, force_privilege)];

pub fn builtin_heuristics(clock: Arc<dyn Clock>, sink: &ReportSink) -> Vec<Arc<dyn Listener>> {
    BUILTIN_HEURISTICS
        .iter()
        .map(|(_, make)| make(clock.clone(), sink.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use warden_core::{Identity, ManualClock};

    fn evil() -> Identity {
        Identity::concrete("/plugins/evil.jar", "Evil", "evil.Backdoor", "onCommand").unwrap()
    }

    fn grant(caller: Option<Identity>) -> Event {
        Event::PrivilegeGrant {
            target: "mallory".into(),
            granted: true,
            caller,
        }
    }

    fn command() -> Event {
        Event::CommandDispatch {
            sender: "mallory".into(),
            command: "secret".into(),
            caller: None,
        }
    }

    fn setup() -> (Arc<ManualClock>, EventBus, tokio::sync::broadcast::Receiver<Report>) {
        let clock = Arc::new(ManualClock::new());
        let sink = ReportSink::new();
        let rx = sink.subscribe();
        let bus = EventBus::builder()
            .listeners(builtin_heuristics(clock.clone(), &sink))
            .build();
        (clock, bus, rx)
    }

    #[test]
    fn test_grant_inside_window_reports_once() {
        let (clock, bus, mut rx) = setup();
        bus.publish(&command());
        clock.advance(Duration::from_millis(300));
        bus.publish(&grant(Some(evil())));

        let report = rx.try_recv().unwrap();
        assert_eq!(report.severity, Severity::High);
        assert_eq!(report.plugin, "Evil");
        assert_eq!(report.class_name, "evil.Backdoor");
        assert_eq!(report.method_name, "onCommand");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_grant_outside_window_is_quiet() {
        let (clock, bus, mut rx) = setup();
        bus.publish(&command());
        clock.advance(Duration::from_millis(1500));
        bus.publish(&grant(Some(evil())));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_host_grants_and_revocations_are_ignored() {
        let (_clock, bus, mut rx) = setup();
        bus.publish(&Event::ChatMessage {
            player: "mallory".into(),
            message: "!op".into(),
        });
        bus.publish(&grant(None));
        bus.publish(&Event::PrivilegeGrant {
            target: "mallory".into(),
            granted: false,
            caller: Some(evil()),
        });
        assert!(rx.try_recv().is_err());
    }
}
