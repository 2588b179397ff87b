/// Class transformer: applies injections on the class-loading path.
///
/// Classes no injection targets come back as the very bytes that went in.
/// A targeted class is parsed, edited, and re-serialized; any failure along
/// the way fails the load instead of handing back unmonitored bytes.
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use warden_classfile::ClassFile;

use crate::error::{Result, RewriteError};
use crate::injection::{EditOutcome, Injection};

#[derive(Debug, Default)]
pub struct ClassTransformer {
    injections: Vec<Arc<Injection>>,
    by_class: HashMap<String, Vec<Arc<Injection>>>,
}

impl ClassTransformer {
    pub fn new(injections: impl IntoIterator<Item = Injection>) -> Self {
        let mut transformer = Self::default();
        for injection in injections {
            let injection = Arc::new(injection);
            transformer
                .by_class
                .entry(injection.target.class.clone())
                .or_default()
                .push(injection.clone());
            transformer.injections.push(injection);
        }
        transformer
    }

    pub fn injections(&self) -> &[Arc<Injection>] {
        &self.injections
    }

    /// Injections that have not landed in any class yet.
    pub fn inert(&self) -> impl Iterator<Item = &Arc<Injection>> {
        self.injections.iter().filter(|i| !i.is_applied())
    }

    pub fn targets(&self, class_name: &str) -> bool {
        self.by_class.contains_key(&internal_name(class_name))
    }

    /// Rewrite one class. `class_name` may be dotted or internal.
    pub fn rewrite<'a>(&self, bytes: &'a [u8], class_name: &str) -> Result<Cow<'a, [u8]>> {
        let internal = internal_name(class_name);
        let Some(injections) = self.by_class.get(&internal) else {
            return Ok(Cow::Borrowed(bytes));
        };

        let mut class = ClassFile::parse(bytes).map_err(|source| RewriteError::Parse {
            class: internal.clone(),
            source,
        })?;
        let actual = class.name().map_err(|source| RewriteError::Parse {
            class: internal.clone(),
            source,
        })?;
        if actual != internal {
            return Err(RewriteError::NameMismatch {
                expected: internal,
                actual: actual.to_string(),
            });
        }

        let mut changed = false;
        for injection in injections {
            changed |= apply_one(&mut class, injection, &internal)?;
        }
        if !changed {
            return Ok(Cow::Borrowed(bytes));
        }

        let out = class.to_bytes().map_err(|source| RewriteError::Serialize {
            class: internal.clone(),
            source,
        })?;
        debug!(class = %internal, before = bytes.len(), after = out.len(), "[Transformer] Rewrote class");
        Ok(Cow::Owned(out))
    }
}

fn apply_one(class: &mut ClassFile, injection: &Injection, internal: &str) -> Result<bool> {
    let target = &injection.target;
    let edit_error = |source| RewriteError::Edit {
        injection: injection.id.clone(),
        class: internal.to_string(),
        method: format!("{}{}", target.name, target.descriptor),
        source,
    };

    let Some(method) = class.find_method(&target.name, &target.descriptor) else {
        debug!(injection = %injection.id, target = %target, "[Transformer] Target method absent; inert");
        return Ok(false);
    };
    let Some(mut code) = class.method_code(method).map_err(edit_error)? else {
        warn!(injection = %injection.id, target = %target, "[Transformer] Target method has no body; inert");
        return Ok(false);
    };

    match injection.apply(&mut code, &mut class.constant_pool).map_err(edit_error)? {
        EditOutcome::Changed(sites) => {
            class.set_method_code(method, &code).map_err(edit_error)?;
            if injection.mark_applied() {
                info!(injection = %injection.id, target = %target, sites, "[Transformer] Injection applied");
            }
            Ok(true)
        }
        EditOutcome::AlreadyPresent => {
            debug!(injection = %injection.id, target = %target, "[Transformer] Already applied");
            Ok(false)
        }
        EditOutcome::NoMatch => {
            debug!(injection = %injection.id, target = %target, "[Transformer] Nothing to edit");
            Ok(false)
        }
    }
}

fn internal_name(class_name: &str) -> String {
    class_name.replace('.', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injection::{HookRef, InsnPattern, MethodTarget, Position};
    use warden_classfile::opcodes::*;
    use warden_classfile::{ClassBuilder, Code, Instruction, ACC_PUBLIC, ACC_STATIC};

    fn server_class() -> Vec<u8> {
        let mut b = ClassBuilder::new("host/Server");
        let hello = b.pool().intern_string("hello").unwrap();
        b.method(
            ACC_PUBLIC,
            "grant",
            "(Ljava/lang/String;)V",
            Code::new(1, 2, vec![Instruction::ldc(hello), Instruction::simple(POP), Instruction::simple(RETURN)]),
        )
        .unwrap();
        b.method(ACC_PUBLIC | ACC_STATIC, "tick", "()V", Code::new(0, 0, vec![Instruction::simple(RETURN)]))
            .unwrap();
        b.build().unwrap()
    }

    fn monitor() -> Injection {
        Injection::call(
            "grant-monitor",
            MethodTarget::new("host.Server", "grant", "(Ljava/lang/String;)V"),
            HookRef::new("warden/runtime/Hooks", "privilegeGrant"),
            Position::Begin,
        )
    }

    #[test]
    fn test_untargeted_class_is_byte_identical() {
        let bytes = server_class();
        let transformer = ClassTransformer::new([monitor()]);
        let out = transformer.rewrite(&bytes, "other.Thing").unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, &bytes[..]);
    }

    #[test]
    fn test_targeted_method_gets_the_hook_once() {
        let bytes = server_class();
        let transformer = ClassTransformer::new([monitor()]);
        let once = transformer.rewrite(&bytes, "host.Server").unwrap().into_owned();
        assert_ne!(once, bytes);
        assert!(transformer.injections()[0].is_applied());
        assert_eq!(transformer.inert().count(), 0);

        let class = ClassFile::parse(&once).unwrap();
        let grant = class.find_method("grant", "(Ljava/lang/String;)V").unwrap();
        let code = class.method_code(grant).unwrap().unwrap();
        assert_eq!(code.len(), 4);
        let hook = code.instructions[0].member(&class.constant_pool).unwrap();
        assert_eq!(hook.to_string(), "warden/runtime/Hooks.privilegeGrant()V");
        // The untouched method is unchanged.
        let tick = class.find_method("tick", "()V").unwrap();
        assert_eq!(class.method_code(tick).unwrap().unwrap().len(), 1);

        let twice = transformer.rewrite(&once, "host/Server").unwrap();
        assert_eq!(&*twice, &once[..]);
    }

    #[test]
    fn test_two_hooks_on_one_method_rewrite_once() {
        let bytes = server_class();
        let dispatch = Injection::call(
            "dispatch-monitor",
            MethodTarget::new("host.Server", "grant", "(Ljava/lang/String;)V"),
            HookRef::new("warden/runtime/Hooks", "commandDispatch"),
            Position::Begin,
        );
        let transformer = ClassTransformer::new([monitor(), dispatch]);
        let once = transformer.rewrite(&bytes, "host.Server").unwrap().into_owned();

        let class = ClassFile::parse(&once).unwrap();
        let grant = class.find_method("grant", "(Ljava/lang/String;)V").unwrap();
        assert_eq!(class.method_code(grant).unwrap().unwrap().len(), 5);

        let twice = transformer.rewrite(&once, "host.Server").unwrap();
        assert!(matches!(twice, Cow::Borrowed(_)));
        assert_eq!(&*twice, &once[..]);
    }

    #[test]
    fn test_absent_target_is_inert() {
        let bytes = server_class();
        let transformer = ClassTransformer::new([Injection::call(
            "missing",
            MethodTarget::new("host/Server", "shutdown", "()V"),
            HookRef::new("warden/runtime/Hooks", "x"),
            Position::End,
        )]);
        let out = transformer.rewrite(&bytes, "host/Server").unwrap();
        assert_eq!(&*out, &bytes[..]);
        assert_eq!(transformer.inert().count(), 1);
    }

    #[test]
    fn test_garbage_bytes_fail_loudly() {
        let transformer = ClassTransformer::new([monitor()]);
        let err = transformer.rewrite(b"\xca\xfe\xba\xbe\x00", "host.Server").unwrap_err();
        assert!(matches!(err, RewriteError::Parse { .. }));
    }

    #[test]
    fn test_name_mismatch_is_rejected() {
        let transformer = ClassTransformer::new([Injection::excise(
            "x",
            MethodTarget::new("host/Other", "run", "()V"),
            vec![InsnPattern::op(NOP)],
        )]);
        let err = transformer.rewrite(&server_class(), "host/Other").unwrap_err();
        assert!(matches!(err, RewriteError::NameMismatch { .. }));
    }
}
