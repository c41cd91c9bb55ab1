mod fanout;
mod memory;
mod sink;

pub use fanout::FanoutSink;
pub use memory::MemorySink;
pub use sink::NotificationSink;
