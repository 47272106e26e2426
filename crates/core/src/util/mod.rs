pub mod rate_limit;
pub mod ring_buffer;

pub use rate_limit::RateLimitedWarn;
pub use ring_buffer::RingBuffer;
