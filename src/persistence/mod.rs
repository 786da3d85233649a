pub mod files;
pub mod gateway;
pub mod json_store;

pub use files::{atomic_write, ensure_dir, get_data_dir, init_local_data_dir, read_file, DATA_DIR_NAME};
pub use gateway::{MemoryGateway, PersistenceGateway};
pub use json_store::{JsonFileGateway, TASKS_KEY};
