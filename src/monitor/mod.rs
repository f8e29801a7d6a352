mod collector;
mod lock;
mod pool;
mod transport;
mod worker;

pub mod metrics;
pub mod options;
pub mod parser;
pub mod platform;

pub use collector::Collector;
pub use pool::ConnectionPool;
pub use transport::SshTransport;
pub use worker::Worker;

pub type WorkerEvent = worker::Event;
