pub mod chain;

pub use chain::{Plugin, PluginChain, PluginRegistry};
