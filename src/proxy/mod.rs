pub mod dispatch;
pub mod hooks;

pub use dispatch::proxy_handler;
pub use hooks::{HookAction, HookContext, HookFn, HookRegistry};
