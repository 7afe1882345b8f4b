pub mod fallback;
pub mod price_feed;
