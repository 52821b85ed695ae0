pub mod engine;
pub mod pipeline;
