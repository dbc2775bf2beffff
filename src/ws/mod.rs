pub mod connctx;
pub mod fanout;
pub mod registry;
pub mod roomctx;
pub mod roomid;
