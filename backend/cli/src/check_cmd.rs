//! `warden check`: evaluate one DAC decision against the loaded policy.

use std::path::Path;

use anyhow::{bail, Context, Result};
use warden_core::{Frame, PluginLookup, WardenContext};
use warden_dac::{Argument, DacEngine, DacError, DacPolicy, Operation};

use crate::bootstrap::Bootstrap;
use crate::terminal_output::{note_error, note_success};

/// Method name used when only a class or plugin is given.
const UNKNOWN_METHOD: &str = "<unknown>";

#[derive(Debug, Clone, Default)]
pub struct CheckArgs {
    pub operation: String,
    pub plugin: Option<String>,
    pub class: Option<String>,
    pub method: Option<String>,
    pub argument: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DacError),
}

/// Errors here are usage errors: an unknown operation or caller, or an
/// argument that does not fit the operation.
pub fn prepare(args: &CheckArgs, lookup: &dyn PluginLookup, base: &Path) -> Result<(Operation, Argument, Vec<Frame>)> {
    let operation: Operation = args.operation.parse()?;
    let argument = match Argument::parse(operation, &args.argument, base) {
        Ok(argument) => argument,
        Err(reason) => bail!("invalid argument for {operation}: {reason}"),
    };
    let method = args.method.as_deref().unwrap_or(UNKNOWN_METHOD);

    let frames = match (&args.plugin, &args.class) {
        (None, None) => Vec::new(),
        (plugin, Some(class)) => {
            if let Some(plugin) = plugin {
                let owner = lookup.plugin_for_class(class).map(|p| p.display_name.as_str());
                if owner != Some(plugin.as_str()) {
                    bail!("class {class} does not belong to plugin {plugin}");
                }
            }
            vec![Frame::new(class.as_str(), method)]
        }
        (Some(plugin), None) => {
            let indexed = lookup
                .plugin_by_name(plugin)
                .with_context(|| format!("no indexed plugin named {plugin}"))?;
            let class = indexed
                .class_names
                .iter()
                .next()
                .with_context(|| format!("plugin {plugin} ships no classes"))?;
            vec![Frame::new(class.as_str(), method)]
        }
    };
    Ok((operation, argument, frames))
}

pub fn decide(boot: &Bootstrap, ctx: WardenContext, operation: Operation, argument: &Argument, frames: &[Frame]) -> Decision {
    let policy = DacPolicy::from_config(&boot.config.dac, Some(ctx.lookup().as_ref()));
    let engine = DacEngine::new(policy, ctx).with_self_defense(boot.self_defense());
    match engine.check(operation, argument, frames) {
        Ok(()) => Decision::Allowed,
        Err(e) => Decision::Denied(e),
    }
}

pub fn report(decision: &Decision, operation: Operation, argument: &Argument) {
    match decision {
        Decision::Allowed => note_success(&format!("ALLOW {operation} {argument}")),
        Decision::Denied(e) => note_error(&format!("DENY {e}")),
    }
}
