pub mod telegram;

pub use telegram::with_flood_retry;
