pub mod io;
pub mod resources;
pub mod scene;
pub mod settings;
