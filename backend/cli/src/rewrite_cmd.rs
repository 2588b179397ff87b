//! `warden rewrite`: run the built-in injections over one class file.

use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use warden_classfile::ClassFile;
use warden_hooks::{builtin_injections, frame_injections, ClassTransformer};
use warden_plugins::PluginIndex;

use crate::terminal_output::{note_info, note_success};

/// Whether the written class differs from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStatus {
    Rewritten,
    Unchanged,
}

/// Rewrite `bytes`, taking the class name from the class file itself.
pub fn rewrite_bytes<'a>(transformer: &ClassTransformer, bytes: &'a [u8]) -> Result<(String, Cow<'a, [u8]>)> {
    let name = ClassFile::parse(bytes)
        .and_then(|class| class.name().map(str::to_string))
        .context("read class name")?;
    let out = transformer
        .rewrite(bytes, &name)
        .with_context(|| format!("rewrite {name}"))?;
    Ok((name, out))
}

/// Built-in injections plus frame tracking for every indexed plugin's
/// main class.
pub fn transformer_for(index: &PluginIndex) -> ClassTransformer {
    let mains = index.descriptors().map(|d| d.main.as_str());
    ClassTransformer::new(builtin_injections().into_iter().chain(frame_injections(mains)))
}

pub fn run(transformer: &ClassTransformer, input: &Path, output: &Path) -> Result<RewriteStatus> {
    let bytes = std::fs::read(input).with_context(|| format!("read {}", input.display()))?;
    let (name, out) = rewrite_bytes(transformer, &bytes)?;

    std::fs::write(output, &*out).with_context(|| format!("write {}", output.display()))?;
    let status = match out {
        Cow::Borrowed(_) => RewriteStatus::Unchanged,
        Cow::Owned(_) => RewriteStatus::Rewritten,
    };
    info!(class = %name, status = ?status, output = %output.display(), "[Rewrite] Done");

    match status {
        RewriteStatus::Rewritten => {
            let applied: Vec<&str> = transformer
                .injections()
                .iter()
                .filter(|i| i.is_applied())
                .map(|i| i.id.as_str())
                .collect();
            note_success(&format!("{name}: applied {}", applied.join(", ")));
        }
        RewriteStatus::Unchanged => note_info(&format!("{name}: no injection applies, copied unchanged")),
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use warden_classfile::opcodes::{ICONST_0, INVOKESTATIC, RETURN};
    use warden_classfile::{ClassBuilder, Code, Instruction, ACC_PUBLIC};
    use warden_analysis::archive::write_test_jar;
    use warden_hooks::HOOK_CLASS;

    fn builtin() -> ClassTransformer {
        ClassTransformer::new(builtin_injections())
    }

    fn class(name: &str) -> Vec<u8> {
        let mut b = ClassBuilder::new(name);
        b.method(
            ACC_PUBLIC,
            "setOp",
            "(Z)V",
            Code::new(1, 2, vec![Instruction::simple(ICONST_0), Instruction::simple(RETURN)]),
        )
        .unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_targeted_class_gets_hook() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("CraftPlayer.class");
        let output = dir.path().join("out.class");
        std::fs::write(&input, class("org/bukkit/craftbukkit/entity/CraftPlayer")).unwrap();

        assert_eq!(run(&builtin(), &input, &output).unwrap(), RewriteStatus::Rewritten);
        let rewritten = ClassFile::parse(&std::fs::read(&output).unwrap()).unwrap();
        let method = rewritten.find_method("setOp", "(Z)V").unwrap();
        let code = rewritten.method_code(method).unwrap().unwrap();
        let first = &code.instructions[0];
        assert_eq!(first.opcode, INVOKESTATIC);
        let hook = first.member(&rewritten.constant_pool).unwrap();
        assert_eq!(hook.owner, HOOK_CLASS);
    }

    #[test]
    fn test_untargeted_class_is_copied_verbatim() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("Other.class");
        let output = dir.path().join("out.class");
        let bytes = class("some/plugin/Other");
        std::fs::write(&input, &bytes).unwrap();

        assert_eq!(run(&builtin(), &input, &output).unwrap(), RewriteStatus::Unchanged);
        assert_eq!(std::fs::read(&output).unwrap(), bytes);
    }

    #[test]
    fn test_indexed_plugin_main_gets_frame_hooks() {
        let dir = TempDir::new().unwrap();
        let plugins = dir.path().join("plugins");
        std::fs::create_dir_all(&plugins).unwrap();
        write_test_jar(
            &plugins.join("good.jar"),
            &[("plugin.yml", b"name: Good\nmain: good.Main\n"), ("good/Main.class", b"x")],
        )
        .unwrap();
        let index = PluginIndex::discover(&plugins).unwrap();

        let mut b = ClassBuilder::new("good/Main");
        b.method(ACC_PUBLIC, "onEnable", "()V", Code::new(0, 1, vec![Instruction::simple(RETURN)]))
            .unwrap();
        let input = dir.path().join("Main.class");
        let output = dir.path().join("out.class");
        std::fs::write(&input, b.build().unwrap()).unwrap();

        assert_eq!(run(&transformer_for(&index), &input, &output).unwrap(), RewriteStatus::Rewritten);
        let rewritten = ClassFile::parse(&std::fs::read(&output).unwrap()).unwrap();
        let method = rewritten.find_method("onEnable", "()V").unwrap();
        let code = rewritten.method_code(method).unwrap().unwrap();
        let first = code.instructions[0].member(&rewritten.constant_pool).unwrap();
        assert_eq!(first.name, "enterPlugin");
    }

    #[test]
    fn test_garbage_is_an_error() {
        let transformer = ClassTransformer::new(builtin_injections());
        assert!(rewrite_bytes(&transformer, b"not a class").is_err());
    }
}
