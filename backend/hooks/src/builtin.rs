/// Built-in injections and hook bindings.
///
/// Both tables are fixed at compile time. Injections target the host
/// server's own methods; hooks live on one runtime class whose static
/// methods forward into `HookDispatcher`. Plugin entry points are only
/// known once the plugins are indexed, so their frame injections are built
/// per plugin by `frame_injections`.
use warden_classfile::opcodes::{ACONST_NULL, INVOKESTATIC};
use warden_plugins::EventKind;

use crate::dispatcher::HookAction;
use crate::injection::{HookRef, Injection, InsnPattern, MethodTarget, Position};

/// Internal name of the class declaring every runtime hook.
pub const HOOK_CLASS: &str = "warden/runtime/Hooks";

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

pub const BUILTIN_HOOKS: &[(&str, HookAction)] = &[
    ("privilegeGrant", HookAction::Publish(EventKind::PrivilegeGrant)),
    ("commandDispatch", HookAction::Publish(EventKind::CommandDispatch)),
    ("chatMessage", HookAction::Publish(EventKind::ChatMessage)),
    ("playerJoin", HookAction::Publish(EventKind::PlayerJoin)),
    ("enterPlugin", HookAction::EnterFrame),
    ("exitPlugin", HookAction::ExitFrame),
];

pub fn hook(name: &str) -> HookRef {
    HookRef::new(HOOK_CLASS, name)
}

// ---------------------------------------------------------------------------
// Injections
// ---------------------------------------------------------------------------

pub type InjectionFactory = fn() -> Injection;

fn privilege_grant_monitor() -> Injection {
    Injection::call(
        "privilege-grant-monitor",
        MethodTarget::new("org/bukkit/craftbukkit/entity/CraftPlayer", "setOp", "(Z)V"),
        hook("privilegeGrant"),
        Position::Begin,
    )
}

fn command_dispatch_monitor() -> Injection {
    Injection::call(
        "command-dispatch-monitor",
        MethodTarget::new(
            "org/bukkit/craftbukkit/CraftServer",
            "dispatchCommand",
            "(Lorg/bukkit/command/CommandSender;Ljava/lang/String;)Z",
        ),
        hook("commandDispatch"),
        Position::Begin,
    )
}

fn chat_monitor() -> Injection {
    Injection::call(
        "chat-monitor",
        MethodTarget::new(
            "net/minecraft/server/network/ServerGamePacketListenerImpl",
            "handleChat",
            "(Ljava/lang/String;)V",
        ),
        hook("chatMessage"),
        Position::Begin,
    )
}

/// The host installs a security manager at boot that would shadow the access
/// checks; the installation call is removed.
fn security_manager_excision() -> Injection {
    Injection::excise(
        "security-manager-excision",
        MethodTarget::new("org/bukkit/craftbukkit/Main", "main", "([Ljava/lang/String;)V"),
        vec![
            InsnPattern::op(ACONST_NULL),
            InsnPattern::member(
                INVOKESTATIC,
                "java/lang/System",
                "setSecurityManager",
                "(Ljava/lang/SecurityManager;)V",
            ),
        ],
    )
}

pub const BUILTIN_INJECTIONS: &[(&str, InjectionFactory)] = &[
    ("privilege-grant-monitor", privilege_grant_monitor),
    ("command-dispatch-monitor", command_dispatch_monitor),
    ("chat-monitor", chat_monitor),
    ("security-manager-excision", security_manager_excision),
];

pub fn builtin_injections() -> Vec<Injection> {
    BUILTIN_INJECTIONS.iter().map(|(_, make)| make()).collect()
}

/// Lifecycle methods of a plugin's main class that run plugin code.
pub const PLUGIN_ENTRY_POINTS: &[(&str, &str)] = &[("onEnable", "()V"), ("onDisable", "()V"), ("onLoad", "()V")];

/// `enterPlugin` at the start and `exitPlugin` before every return of each
/// entry point of the given main classes. An exit by exception skips
/// `exitPlugin`; the bridge unwinds the call stack for those.
pub fn frame_injections<'a>(main_classes: impl IntoIterator<Item = &'a str>) -> Vec<Injection> {
    let mut injections = Vec::new();
    for class in main_classes {
        for (name, descriptor) in PLUGIN_ENTRY_POINTS {
            let target = MethodTarget::new(class, name, descriptor);
            injections.push(Injection::call(
                &format!("enter-frame:{target}"),
                target.clone(),
                hook("enterPlugin"),
                Position::Begin,
            ));
            injections.push(Injection::call(
                &format!("exit-frame:{target}"),
                target,
                hook("exitPlugin"),
                Position::End,
            ));
        }
    }
    injections
}
