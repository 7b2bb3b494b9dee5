pub mod temp_manager;

pub use temp_manager::TempFileManager;
