//! Default constants for engine configuration.

/// Size of one linear-memory page in bytes (64 KiB).
pub const WASM_PAGE_SIZE: usize = tether_capi::WASM_PAGE_SIZE;

/// Default cap on the number of pages any memory may reach (4 GiB).
pub const DEFAULT_MAX_MEMORY_PAGES: u32 = 65_536;

/// Default maximum nesting of calls into the engine on one store.
///
/// Reentrant host -> VM -> host chains deeper than this trap with
/// `TrapCode::StackOverflow`.
pub const DEFAULT_MAX_CALL_DEPTH: u32 = 1000;
