pub mod apply;
pub mod cli;
pub mod config;
pub mod diff;
pub mod document;
pub mod editor;
pub mod errors;
pub mod form;
pub mod prompt;
pub mod provider;
pub mod session;
pub mod suggest;
pub mod transcript;
pub mod upload;
pub mod ux;
pub mod wire;
