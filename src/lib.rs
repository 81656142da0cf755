pub mod converter;
pub mod data;
pub mod output;
