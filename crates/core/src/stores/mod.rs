pub mod notion;

pub use notion::{page_id_from_reference, HttpAssetFetcher, NotionClient};
