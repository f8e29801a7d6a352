mod history;
mod ring;

pub use history::HistoryStore;
pub use history::InterfaceRate;
pub use ring::RingBuffer;
