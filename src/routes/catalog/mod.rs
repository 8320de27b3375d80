mod model;

pub use model::{AssetType, Catalog, CatalogSnapshot, Category, LinkType, Status};
