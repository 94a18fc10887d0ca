pub mod toml_loader;

pub use toml_loader::{load_catalog, load_catalog_or_builtin};
