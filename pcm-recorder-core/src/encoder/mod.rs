pub mod adapter;
pub mod software;
