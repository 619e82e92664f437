pub mod dir_ops;
pub mod file_ops;
pub mod menus;
pub mod process_ops;
pub mod system_ops;
