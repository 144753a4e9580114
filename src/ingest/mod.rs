pub mod parse;
pub mod receiver;

pub use receiver::{bind_socket, Receiver};
