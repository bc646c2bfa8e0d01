//! 集成测试模块
//!
//! 测试外部存储后端

#[cfg(feature = "redis")]
#[allow(unused_imports)]
mod redis_test;

#[cfg(feature = "redis")]
#[allow(unused_imports)]
pub use redis_test::*;
