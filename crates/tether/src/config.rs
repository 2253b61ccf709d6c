//! Engine configuration

use crate::defaults::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_MEMORY_PAGES};

/// Options applied to every store created from an [`Engine`](crate::Engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Hard cap on the size of any memory, in pages
    pub max_memory_pages: u32,

    /// Maximum nesting of calls into the engine on one store
    pub max_call_depth: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_memory_pages: DEFAULT_MAX_MEMORY_PAGES,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Config {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memory page cap
    pub fn max_memory_pages(mut self, pages: u32) -> Self {
        self.max_memory_pages = pages;
        self
    }

    /// Set the call depth limit
    pub fn max_call_depth(mut self, depth: u32) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub(crate) fn to_native(self) -> tether_capi::wasm_config_t {
        tether_capi::wasm_config_t {
            max_memory_pages: self.max_memory_pages,
            max_call_depth: self.max_call_depth,
        }
    }
}
