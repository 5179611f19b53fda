pub mod category;
pub mod credential;
pub mod item;
pub mod loaders;
pub mod media;
pub mod metadata;

pub use category::StockCategory;
pub use credential::Credential;
pub use item::{ItemId, ItemStats, ItemStatus, WorkItem};
pub use loaders::load_media_folder;
pub use media::{MediaFile, MediaKind, MediaPreview};
pub use metadata::{Generated, Language, LocalizedMetadata, Metadata};
