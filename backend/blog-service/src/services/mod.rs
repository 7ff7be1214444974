/// Business logic layer for blog-service
pub mod labels;
pub mod posts;

pub use labels::LabelCounters;
pub use posts::{generate_slug, PostService};
