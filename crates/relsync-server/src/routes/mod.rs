pub mod releases;
pub mod webhook;
