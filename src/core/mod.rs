//! 核心层：引擎错误与恢复策略

pub mod error;
pub mod recovery;

pub use error::{EngineError, RecoveryAction};
pub use recovery::RecoveryEngine;
