pub mod annotation;
pub mod chain;
pub mod context;
pub mod dataflow;
pub mod demangle;
pub mod identity;
pub mod program;
pub mod schema;
pub mod store;
pub mod synthesized;
