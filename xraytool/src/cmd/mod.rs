pub mod ogf;
pub mod scene;
