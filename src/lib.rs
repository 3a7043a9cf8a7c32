pub mod defs;
pub mod mesh;
pub mod settings;
pub mod texture;
pub mod view;
