mod catalog;
mod paths;
mod set;

pub use catalog::{MigrationCatalog, MigrationManifest, MigrationOperation, ValueType};
pub use paths::{
    file_category, is_in_managed_dir, managed_purpose, FileCategory, AGENT_LAYER_DIR,
    MANAGED_DIRS, MEMORY_DIR,
};
pub use set::{Template, TemplateSet};

#[cfg(test)]
mod tests;
