pub mod assets;
pub mod logging;
