pub mod backoff;
pub mod binance;
pub mod fallback;
pub mod notifier;
pub mod pipeline;
pub mod store;
pub mod symbols;
pub mod types;
