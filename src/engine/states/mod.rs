//! 各状态的转换函数：读写 RunContext，发出一个 RunEvent，返回下一个状态

mod calling;
mod generating;
mod init;
mod resolving;

pub use calling::{calling, calling_delegate, calling_interactive_tool};
pub use generating::{generating, generating_run_result};
pub use init::init;
pub use resolving::resolving;
