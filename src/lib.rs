pub mod addressables;
pub mod config;
pub mod container;
pub mod env;
pub mod game_files;
pub mod handle;
pub mod patch;
pub mod texture;
pub mod tree;
pub mod typetree_generator_cache;
pub mod unity;
pub mod utils;
pub mod workflow;

pub use rabex;

pub use config::{FontMode, GamePaths, PatchConfig, Platform, TranslationVariant};
pub use container::{Bundle, Container, Entry, ObjectTable};
pub use env::Environment;
pub use game_files::GameFiles;
