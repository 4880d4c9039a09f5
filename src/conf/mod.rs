mod config;
mod merge;

pub use config::Config;

#[cfg(test)]
mod merge_test;
