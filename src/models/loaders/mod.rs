pub mod media_loader;

pub use media_loader::load_media_folder;
