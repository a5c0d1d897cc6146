pub mod assets;
pub mod config;
pub mod dates;
pub mod docindex;
pub mod error;
pub mod fields;
pub mod filesystem;
pub mod frontmatter;
pub mod ingest;
pub mod longform;
pub mod model;
pub mod newsroom;
pub mod runtime;
pub mod tabular;
pub mod validate;
pub mod writer;
