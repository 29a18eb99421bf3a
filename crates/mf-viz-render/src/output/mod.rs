#[cfg(feature = "png")]
pub mod png;
