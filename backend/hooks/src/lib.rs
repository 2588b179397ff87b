//! `warden-hooks`: load-time code rewriting.
//!
//! Injections declare edits to named methods; `ClassTransformer` applies them
//! as classes load and leaves every other class byte-identical. The
//! `HookDispatcher` is the runtime end of the hook calls the edits insert.

pub mod builtin;
pub mod dispatcher;
pub mod error;
pub mod injection;
pub mod loaded;
pub mod transformer;

pub use builtin::{
    builtin_injections, frame_injections, BUILTIN_HOOKS, BUILTIN_INJECTIONS, HOOK_CLASS, PLUGIN_ENTRY_POINTS,
};
pub use dispatcher::{DispatchError, HookAction, HookCall, HookDispatcher};
pub use error::{Result, RewriteError};
pub use injection::{
    EditKind, EditOutcome, HookRef, Injection, InsnPattern, MethodTarget, OperandPattern, Position,
    HOOK_DESCRIPTOR,
};
pub use loaded::{LoadedClass, LoadedClasses};
pub use transformer::ClassTransformer;
