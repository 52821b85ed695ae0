pub mod market;
pub mod report;
pub mod score;
pub mod sector;
pub mod signal;
