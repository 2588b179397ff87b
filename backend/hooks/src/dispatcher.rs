/// Runtime side of hook references.
///
/// Instrumented code calls an argument-less static hook; the host bridge
/// forwards that call here together with whatever it knows about the call
/// (the affected player, the command text, the caller's stack). The
/// dispatcher turns it into an event on the bus or a call-stack update.
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;
use warden_core::{CallStack, Frame, Identity, IdentityResolver};
use warden_plugins::{Event, EventBus, EventKind};

use crate::builtin::{BUILTIN_HOOKS, HOOK_CLASS};
use crate::injection::HookRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Publish(EventKind),
    /// Record entry into instrumented plugin code on this thread.
    EnterFrame,
    ExitFrame,
}

/// What the host bridge knows about one hook call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookCall {
    /// Player or command sender involved.
    pub subject: String,
    /// Message or command text.
    pub detail: String,
    /// Grant (true) or revoke (false) for privilege changes.
    pub flag: bool,
    /// Caller stack, innermost first. Empty means use this thread's
    /// recorded `CallStack`.
    pub frames: Vec<Frame>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no action bound to hook {0}")]
    UnknownHook(String),

    #[error("hook {0} needs the entered frame")]
    MissingFrame(String),
}

pub struct HookDispatcher {
    actions: HashMap<HookRef, HookAction>,
    bus: Arc<EventBus>,
    resolver: IdentityResolver,
}

impl HookDispatcher {
    /// Dispatcher bound to every built-in hook.
    pub fn new(bus: Arc<EventBus>, resolver: IdentityResolver) -> Self {
        let actions = BUILTIN_HOOKS
            .iter()
            .map(|(name, action)| (HookRef::new(HOOK_CLASS, *name), *action))
            .collect();
        Self { actions, bus, resolver }
    }

    pub fn bind(&mut self, hook: HookRef, action: HookAction) {
        self.actions.insert(hook, action);
    }

    fn caller(&self, call: &HookCall) -> Option<Identity> {
        if call.frames.is_empty() {
            self.resolver.resolve_current()
        } else {
            self.resolver.resolve_caller(&call.frames)
        }
    }

    /// Run the action bound to `hook`. Returns how many listeners handled the
    /// published event (0 for frame bookkeeping).
    pub fn invoke(&self, hook: &HookRef, call: HookCall) -> Result<usize, DispatchError> {
        let action = self
            .actions
            .get(hook)
            .copied()
            .ok_or_else(|| DispatchError::UnknownHook(hook.to_string()))?;
        trace!(hook = %hook, action = ?action, "[Hooks] Invoked");

        let event = match action {
            HookAction::EnterFrame => {
                let frame = call
                    .frames
                    .into_iter()
                    .next()
                    .ok_or_else(|| DispatchError::MissingFrame(hook.to_string()))?;
                CallStack::push(frame);
                return Ok(0);
            }
            HookAction::ExitFrame => {
                CallStack::pop();
                return Ok(0);
            }
            HookAction::Publish(EventKind::ChatMessage) => Event::ChatMessage {
                player: call.subject,
                message: call.detail,
            },
            HookAction::Publish(EventKind::PlayerJoin) => Event::PlayerJoin { player: call.subject },
            HookAction::Publish(EventKind::CommandDispatch) => {
                let caller = self.caller(&call);
                Event::CommandDispatch {
                    sender: call.subject,
                    command: call.detail,
                    caller,
                }
            }
            HookAction::Publish(EventKind::PrivilegeGrant) => {
                let caller = self.caller(&call);
                Event::PrivilegeGrant {
                    target: call.subject,
                    granted: call.flag,
                    caller,
                }
            }
        };
        Ok(self.bus.publish(&event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::hook;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use warden_core::{IndexedPlugin, ManualClock, StaticLookup};
    use warden_plugins::{builtin_heuristics, ReportSink};

    fn resolver() -> IdentityResolver {
        let evil = IndexedPlugin {
            jar_file: PathBuf::from("/plugins/evil.jar"),
            class_names: BTreeSet::from(["evil.Backdoor".to_string()]),
            display_name: "Evil".into(),
            content_hash: "00".into(),
        };
        IdentityResolver::new(Arc::new(StaticLookup::new(vec![evil])))
    }

    fn setup() -> (HookDispatcher, tokio::sync::broadcast::Receiver<warden_plugins::Report>) {
        let sink = ReportSink::new();
        let rx = sink.subscribe();
        let bus = EventBus::builder()
            .listeners(builtin_heuristics(Arc::new(ManualClock::new()), &sink))
            .build();
        (HookDispatcher::new(Arc::new(bus), resolver()), rx)
    }

    #[test]
    fn test_command_then_plugin_grant_reports() {
        let (dispatcher, mut rx) = setup();
        let delivered = dispatcher
            .invoke(
                &hook("commandDispatch"),
                HookCall {
                    subject: "mallory".into(),
                    detail: "backdoor".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(delivered, 1);

        dispatcher
            .invoke(
                &hook("privilegeGrant"),
                HookCall {
                    subject: "mallory".into(),
                    flag: true,
                    frames: vec![
                        Frame::new("org.bukkit.craftbukkit.entity.CraftPlayer", "setOp"),
                        Frame::new("evil.Backdoor", "onCommand"),
                    ],
                    ..Default::default()
                },
            )
            .unwrap();
        let report = rx.try_recv().unwrap();
        assert_eq!(report.plugin, "Evil");
        assert_eq!(report.method_name, "onCommand");
    }

    #[test]
    fn test_frame_hooks_drive_the_call_stack() {
        let (dispatcher, _rx) = setup();
        CallStack::clear();
        dispatcher
            .invoke(
                &hook("enterPlugin"),
                HookCall {
                    frames: vec![Frame::new("evil.Backdoor", "run")],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(CallStack::depth(), 1);
        assert_eq!(
            dispatcher.caller(&HookCall::default()).and_then(|i| i.plugin_name().map(str::to_string)),
            Some("Evil".to_string())
        );
        dispatcher.invoke(&hook("exitPlugin"), HookCall::default()).unwrap();
        assert_eq!(CallStack::depth(), 0);
        assert_eq!(
            dispatcher.invoke(&hook("enterPlugin"), HookCall::default()),
            Err(DispatchError::MissingFrame(hook("enterPlugin").to_string()))
        );
    }

    #[test]
    fn test_unknown_hook_is_an_error() {
        let (dispatcher, _rx) = setup();
        assert!(matches!(
            dispatcher.invoke(&hook("nope"), HookCall::default()),
            Err(DispatchError::UnknownHook(_))
        ));
    }
}
