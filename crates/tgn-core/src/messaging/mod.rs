//! Outbound messaging abstractions (Telegram today, other backends behind the same port).

pub mod port;
pub mod types;
