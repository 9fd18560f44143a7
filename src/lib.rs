pub mod assets;
pub mod config;
pub mod gemini;
pub mod io;
pub mod resolver;
pub mod script;
pub mod state;
pub mod workflow;
