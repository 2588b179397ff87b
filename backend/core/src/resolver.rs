/// Identity Resolver: attributes the current call to a plugin.
///
/// Walks a call stack from the innermost frame outwards and returns the first
/// frame whose class belongs to a registered plugin other than the host.
use std::cell::RefCell;
use std::sync::Arc;

use tracing::trace;

use crate::identity::Identity;
use crate::plugin::PluginLookup;

/// One frame of a call stack as reported by the host runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub class_name: String,
    pub method_name: String,
}

impl Frame {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    lookup: Arc<dyn PluginLookup>,
    host_plugin: Option<String>,
}

impl IdentityResolver {
    pub fn new(lookup: Arc<dyn PluginLookup>) -> Self {
        Self { lookup, host_plugin: None }
    }

    /// Frames owned by this plugin are treated as host frames.
    pub fn with_host_plugin(mut self, name: impl Into<String>) -> Self {
        self.host_plugin = Some(name.into());
        self
    }

    pub fn lookup(&self) -> &Arc<dyn PluginLookup> {
        &self.lookup
    }

    /// Resolve the caller from frames ordered innermost first.
    ///
    /// Returns `None` when no frame belongs to a plugin: the action was not
    /// plugin-initiated.
    pub fn resolve_caller<'a>(&self, frames: impl IntoIterator<Item = &'a Frame>) -> Option<Identity> {
        for frame in frames {
            let Some(plugin) = self.lookup.plugin_for_class(&frame.class_name) else {
                continue;
            };
            if self.host_plugin.as_deref() == Some(plugin.display_name.as_str()) {
                continue;
            }
            let identity = Identity::concrete(
                plugin.jar_file.to_string_lossy(),
                plugin.display_name.as_str(),
                frame.class_name.as_str(),
                frame.method_name.as_str(),
            );
            match identity {
                Ok(identity) => return Some(identity),
                Err(e) => trace!(class = %frame.class_name, error = %e, "Skipping unattributable frame"),
            }
        }
        None
    }

    /// Resolve the caller from this thread's recorded `CallStack`.
    pub fn resolve_current(&self) -> Option<Identity> {
        CallStack::with_frames(|frames| self.resolve_caller(frames.iter().rev()))
    }
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Per-thread record of instrumented method entries.
///
/// Method-entry hooks push a frame and method-exit hooks pop it, so the stack
/// mirrors the instrumented part of the real call stack.
pub struct CallStack;

impl CallStack {
    pub fn push(frame: Frame) {
        FRAMES.with(|f| f.borrow_mut().push(frame));
    }

    pub fn pop() -> Option<Frame> {
        FRAMES.with(|f| f.borrow_mut().pop())
    }

    /// Push a frame that is popped when the guard drops.
    pub fn enter(frame: Frame) -> FrameGuard {
        Self::push(frame);
        FrameGuard { _private: () }
    }

    pub fn depth() -> usize {
        FRAMES.with(|f| f.borrow().len())
    }

    /// Borrow the frames, outermost first.
    pub fn with_frames<R>(f: impl FnOnce(&[Frame]) -> R) -> R {
        FRAMES.with(|frames| f(&frames.borrow()))
    }

    pub fn clear() {
        FRAMES.with(|f| f.borrow_mut().clear());
    }
}

#[must_use = "the frame is popped as soon as the guard drops"]
pub struct FrameGuard {
    _private: (),
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        CallStack::pop();
    }
}
