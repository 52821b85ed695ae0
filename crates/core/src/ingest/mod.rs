pub mod collector;
pub mod financials;
pub mod naver;
pub mod provider;
pub mod types;
