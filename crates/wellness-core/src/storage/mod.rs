pub mod blob;
pub mod documents;
pub mod kv;

pub use blob::{LocalFileSystemStore, ObjectStore, UrlSigner};
pub use documents::DocumentStore;
pub use kv::KvStore;
