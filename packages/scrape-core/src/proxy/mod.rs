pub mod resolver;

pub use resolver::{ProxyPolicyRepository, ProxyResolver};
