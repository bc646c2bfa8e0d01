//! 配置模块测试

#[allow(unused_imports)]
pub mod integration;

#[allow(unused_imports)]
pub use integration::*;
