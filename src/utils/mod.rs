pub mod fs;
#[cfg(feature = "xlsx")]
pub mod xlsx;
