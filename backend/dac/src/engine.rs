//! The DAC decision point.
//!
//! Called before every sensitive operation, from any thread. A denial is
//! returned as `DacError::AccessDenied`; the caller must abort the operation.

use std::cell::Cell;

use tracing::{trace, warn};
use warden_core::{Frame, Identity, WardenContext};
use warden_logging::{SecurityEvent, SecurityEventLogger};

use crate::error::{DacError, Result};
use crate::operation::{normalize, Argument, Operation};
use crate::policy::DacPolicy;
use crate::rule::RuleType;

thread_local! {
    static IN_CHECK: Cell<bool> = const { Cell::new(false) };
}

/// Marks this thread as inside the engine until dropped.
struct CheckGuard {
    outer: bool,
}

impl CheckGuard {
    fn enter() -> Self {
        Self {
            outer: IN_CHECK.with(|c| c.replace(true)),
        }
    }
}

impl Drop for CheckGuard {
    fn drop(&mut self) {
        IN_CHECK.with(|c| c.set(self.outer));
    }
}

pub struct DacEngine {
    policy: DacPolicy,
    ctx: WardenContext,
    self_defense: bool,
}

impl DacEngine {
    /// Engine with self-defense enabled.
    pub fn new(policy: DacPolicy, ctx: WardenContext) -> Self {
        Self {
            policy,
            ctx,
            self_defense: true,
        }
    }

    pub fn with_self_defense(mut self, enabled: bool) -> Self {
        self.self_defense = enabled;
        self
    }

    pub fn policy(&self) -> &DacPolicy {
        &self.policy
    }

    /// Check `operation` for the caller found in `frames` (innermost first).
    pub fn check(&self, operation: Operation, argument: &Argument, frames: &[Frame]) -> Result<()> {
        self.guarded(operation, argument, || self.ctx.resolver.resolve_caller(frames))
    }

    /// Check `operation` for the caller on this thread's recorded call stack.
    pub fn check_current(&self, operation: Operation, argument: &Argument) -> Result<()> {
        self.guarded(operation, argument, || self.ctx.resolver.resolve_current())
    }

    /// Run engine bookkeeping. Checks raised inside `f` on this thread are
    /// allowed unconditionally.
    pub fn internal<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = CheckGuard::enter();
        f()
    }

    fn guarded(
        &self,
        operation: Operation,
        argument: &Argument,
        resolve: impl FnOnce() -> Option<Identity>,
    ) -> Result<()> {
        if IN_CHECK.with(Cell::get) {
            trace!(operation = %operation, "[DAC] Re-entered check allowed");
            return Ok(());
        }
        let _guard = CheckGuard::enter();

        let Some(caller) = resolve() else {
            trace!(operation = %operation, argument = %argument, "[DAC] Host caller allowed");
            return Ok(());
        };

        if self.touches_own_storage(operation, argument) {
            return Err(self.deny(operation, &caller, argument, "self-defense"));
        }

        match self.policy.decide(operation, &caller, argument) {
            RuleType::Allow => Ok(()),
            RuleType::Deny => Err(self.deny(operation, &caller, argument, "policy")),
        }
    }

    fn touches_own_storage(&self, operation: Operation, argument: &Argument) -> bool {
        if !self.self_defense || !operation.modifies_files() {
            return false;
        }
        match argument {
            Argument::Path(path) => normalize(path).starts_with(normalize(&self.ctx.working_dir)),
            _ => false,
        }
    }

    fn deny(&self, operation: Operation, caller: &Identity, argument: &Argument, reason: &str) -> DacError {
        warn!(
            operation = %operation,
            identity = %caller,
            argument = %argument,
            reason,
            "[DAC] Access denied"
        );
        SecurityEventLogger::log(SecurityEvent::AccessDenied {
            operation: operation.to_string(),
            identity: caller.to_string(),
            argument: argument.to_string(),
        });
        DacError::AccessDenied {
            operation: operation.to_string(),
            identity: caller.to_string(),
            argument: argument.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, OnceLock, Weak};
    use warden_config::{DacConfig, OperationConfig};
    use warden_core::{CallStack, IndexedPlugin, PluginLookup, StaticLookup};

    fn plugin(name: &str, class: &str) -> IndexedPlugin {
        IndexedPlugin {
            jar_file: PathBuf::from(format!("/plugins/{}.jar", name.to_lowercase())),
            class_names: BTreeSet::from([class.to_string()]),
            display_name: name.into(),
            content_hash: "00".into(),
        }
    }

    fn lookup() -> StaticLookup {
        StaticLookup::new(vec![plugin("Evil", "evil.Main"), plugin("Good", "good.Main")])
    }

    fn engine(rules: &[(&str, &str, &[&str])]) -> DacEngine {
        let config = DacConfig {
            operations: rules
                .iter()
                .map(|(op, default, lines)| {
                    (
                        op.to_string(),
                        OperationConfig {
                            default: Some(default.to_string()),
                            rules: lines.iter().map(|l| l.to_string()).collect(),
                        },
                    )
                })
                .collect(),
        };
        let lookup = Arc::new(lookup());
        let policy = DacPolicy::from_config(&config, Some(lookup.as_ref() as &dyn PluginLookup));
        DacEngine::new(policy, WardenContext::new(lookup, "/srv/warden"))
    }

    fn from(class: &str) -> Vec<Frame> {
        vec![
            Frame::new("java.io.FileInputStream", "<init>"),
            Frame::new(class, "onEnable"),
        ]
    }

    fn path(p: &str) -> Argument {
        Argument::path(p, Path::new("/srv"))
    }

    #[test]
    fn test_plugin_denied_on_secret_files() {
        let engine = engine(&[("file-read", "ALLOW", &["DENY PLUGIN=Evil /secret/*"])]);
        let secret = path("/secret/config.yml");

        let err = engine.check(Operation::FileRead, &secret, &from("evil.Main")).unwrap_err();
        match err {
            DacError::AccessDenied {
                operation,
                identity,
                argument,
            } => {
                assert_eq!(operation, "file-read");
                assert!(identity.starts_with("Evil"));
                assert_eq!(argument, "/secret/config.yml");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(engine.check(Operation::FileRead, &secret, &from("good.Main")).is_ok());
        assert!(engine
            .check(Operation::FileRead, &path("/public/readme"), &from("evil.Main"))
            .is_ok());
    }

    #[test]
    fn test_default_deny_blocks_every_plugin() {
        let engine = engine(&[("process-exec", "DENY", &[])]);
        let cmd = Argument::Command("rm -rf /".into());
        assert!(engine.check(Operation::ProcessExec, &cmd, &from("evil.Main")).is_err());
        assert!(engine.check(Operation::ProcessExec, &cmd, &from("good.Main")).is_err());
        // Nothing on the stack belongs to a plugin.
        assert!(engine
            .check(Operation::ProcessExec, &cmd, &[Frame::new("org.bukkit.Server", "run")])
            .is_ok());
    }

    #[test]
    fn test_exact_and_any_port_rules() {
        let engine = engine(&[(
            "connection-open",
            "DENY",
            &["ALLOW ALL *.mojang.com:*", "ALLOW PLUGIN=Good =db.local:5432"],
        )]);
        let frames = from("good.Main");
        assert!(engine
            .check(Operation::ConnectionOpen, &Argument::socket("api.mojang.com", 443), &frames)
            .is_ok());
        assert!(engine
            .check(Operation::ConnectionOpen, &Argument::socket("db.local", 5432), &frames)
            .is_ok());
        assert!(engine
            .check(Operation::ConnectionOpen, &Argument::socket("db.local", 5433), &frames)
            .is_err());
    }

    #[test]
    fn test_self_defense_protects_working_storage() {
        let engine = engine(&[("file-write", "ALLOW", &[]), ("file-delete", "ALLOW", &[])]);
        let frames = from("good.Main");
        let cache = path("/srv/warden/cache/evil.jar.json");

        assert!(engine.check(Operation::FileWrite, &cache, &frames).is_err());
        assert!(engine
            .check(Operation::FileDelete, &path("plugins/../warden/quarantine/x"), &frames)
            .is_err());
        assert!(engine.check(Operation::FileRead, &cache, &frames).is_ok());
        assert!(engine.check(Operation::FileWrite, &path("/srv/other"), &frames).is_ok());

        let engine = engine.with_self_defense(false);
        assert!(engine.check(Operation::FileWrite, &cache, &frames).is_ok());
    }

    #[test]
    fn test_check_current_uses_thread_call_stack() {
        let engine = engine(&[("system-exit", "DENY", &[])]);
        CallStack::clear();
        assert!(engine.check_current(Operation::SystemExit, &Argument::ExitCode(0)).is_ok());
        let _frame = CallStack::enter(Frame::new("evil.Main", "onDisable"));
        assert!(engine.check_current(Operation::SystemExit, &Argument::ExitCode(0)).is_err());
    }

    #[test]
    fn test_internal_scope_is_allowed() {
        let engine = engine(&[("misc", "DENY", &[])]);
        let frames = from("evil.Main");
        let arg = Argument::Text("reflect".into());
        assert!(engine.check(Operation::Misc, &arg, &frames).is_err());
        assert!(engine.internal(|| engine.check(Operation::Misc, &arg, &frames)).is_ok());
        assert!(engine.check(Operation::Misc, &arg, &frames).is_err());
    }

    /// A lookup that itself performs a guarded operation while resolving.
    struct ReentrantLookup {
        inner: StaticLookup,
        engine: OnceLock<Weak<DacEngine>>,
        nested_allowed: AtomicUsize,
    }

    impl PluginLookup for ReentrantLookup {
        fn plugin_for_class(&self, class_name: &str) -> Option<&IndexedPlugin> {
            if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
                let nested = engine.check(
                    Operation::FileRead,
                    &Argument::Path(PathBuf::from("/plugins/evil.jar")),
                    &from("evil.Main"),
                );
                if nested.is_ok() {
                    self.nested_allowed.fetch_add(1, Ordering::SeqCst);
                }
            }
            self.inner.plugin_for_class(class_name)
        }

        fn plugin_for_file(&self, path: &Path) -> Option<&IndexedPlugin> {
            self.inner.plugin_for_file(path)
        }

        fn plugin_by_name(&self, name: &str) -> Option<&IndexedPlugin> {
            self.inner.plugin_by_name(name)
        }

        fn plugins(&self) -> Vec<&IndexedPlugin> {
            self.inner.plugins()
        }
    }

    #[test]
    fn test_resolver_reentry_does_not_recurse() {
        let lookup = Arc::new(ReentrantLookup {
            inner: lookup(),
            engine: OnceLock::new(),
            nested_allowed: AtomicUsize::new(0),
        });
        let config = DacConfig {
            operations: [(
                "file-read".to_string(),
                OperationConfig {
                    default: Some("DENY".into()),
                    rules: Vec::new(),
                },
            )]
            .into(),
        };
        let policy = DacPolicy::from_config(&config, None);
        let engine = Arc::new(DacEngine::new(
            policy,
            WardenContext::new(lookup.clone(), "/srv/warden"),
        ));
        assert!(lookup.engine.set(Arc::downgrade(&engine)).is_ok());

        let result = engine.check(
            Operation::FileRead,
            &Argument::Path(PathBuf::from("/etc/passwd")),
            &from("evil.Main"),
        );
        assert!(result.is_err());
        assert!(lookup.nested_allowed.load(Ordering::SeqCst) >= 1);
    }
}
