//! Tree level optimizations, run between parsing and name checking.

pub mod dead_code;
