mod file;
mod memory;

pub use file::JsonFileCacheStore;
pub use memory::InMemoryCacheStore;
