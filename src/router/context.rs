use crate::template::normalize;

/// Path prefix fragments pushed by nested [`Router::mount`](super::Router::mount) calls.
///
/// Only used during the single-threaded registration phase.
#[derive(Debug, Default, Clone)]
pub struct ContextStack {
    frames: Vec<String>,
}

impl ContextStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.frames.push(fragment.to_string());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.frames.pop()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// All frames concatenated bottom-to-top, outer prefixes first.
    #[must_use]
    pub fn current(&self) -> String {
        self.frames.concat()
    }

    /// Effective path for `local` under the current frames, slash-collapsed.
    #[must_use]
    pub fn resolve(&self, local: &str) -> String {
        let mut path = self.current();
        path.push_str(local);
        normalize(&path)
    }
}
