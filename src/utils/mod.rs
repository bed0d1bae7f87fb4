//! 工具模块

pub mod id_gen;
pub mod logging;

pub use id_gen::IdGenerator;
