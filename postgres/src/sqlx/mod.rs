#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod watermark;
