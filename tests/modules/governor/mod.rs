//! Gatekeeper模块测试


#[allow(unused_imports)]
pub use integration::*;
