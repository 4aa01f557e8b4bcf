//! Captured backtraces.
//!
//! A backtrace clones the `Arc<MethodVersion>` of every frame at capture
//! time, so it keeps resolving names and line numbers even after its class
//! is redefined. The registry tracks live backtraces weakly so redefinition
//! tooling can ask which classes are still pinned by captured traces.

use super::metadata::{ClassId, MethodVersion};
use std::sync::{Arc, Mutex, Weak};

/// One frame of a captured backtrace.
#[derive(Clone)]
pub struct BacktraceFrame {
    pub method: Arc<MethodVersion>,
    pub bci: u16,
}

impl BacktraceFrame {
    pub fn class(&self) -> ClassId {
        self.method.class
    }

    pub fn method_name(&self) -> &str {
        &self.method.name
    }

    /// The source line of this frame, if the method has line info.
    pub fn line(&self) -> Option<u16> {
        self.method.line_for_bci(self.bci)
    }
}

impl std::fmt::Debug for BacktraceFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "at {:?} bci={}", self.method, self.bci)?;
        if let Some(line) = self.line() {
            write!(f, " line={}", line)?;
        }
        Ok(())
    }
}

/// An immutable capture of one thread's call stack, innermost frame first.
pub struct Backtrace {
    frames: Box<[BacktraceFrame]>,
}

impl Backtrace {
    pub fn frames(&self) -> &[BacktraceFrame] {
        &self.frames
    }

    pub fn references_class(&self, class: ClassId) -> bool {
        self.frames.iter().any(|f| f.class() == class)
    }
}

impl std::fmt::Debug for Backtrace {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "backtrace ({} frames):", self.frames.len())?;
        for frame in self.frames.iter() {
            writeln!(f, "  {:?}", frame)?;
        }
        Ok(())
    }
}

/// All live backtraces, held weakly. Dead entries are pruned on the way
/// through, so the registry never grows beyond the number of captures that
/// were live at some point since the last walk.
pub struct BacktraceRegistry {
    traces: Mutex<Vec<Weak<Backtrace>>>,
}

impl BacktraceRegistry {
    pub fn new() -> Self {
        BacktraceRegistry {
            traces: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, frames: Vec<BacktraceFrame>) -> Arc<Backtrace> {
        let trace = Arc::new(Backtrace {
            frames: frames.into_boxed_slice(),
        });
        self.traces.lock().unwrap().push(Arc::downgrade(&trace));
        trace
    }

    /// How many live backtraces still hold a method version of `class`, any
    /// generation.
    pub fn references_to(&self, class: ClassId) -> usize {
        let mut traces = self.traces.lock().unwrap();
        traces.retain(|w| w.strong_count() > 0);
        traces
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|t| t.references_class(class))
            .count()
    }

    pub fn live_count(&self) -> usize {
        let mut traces = self.traces.lock().unwrap();
        traces.retain(|w| w.strong_count() > 0);
        traces.len()
    }
}

impl Default for BacktraceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
