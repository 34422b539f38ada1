pub mod server;

pub use server::{router, run, AppState};
