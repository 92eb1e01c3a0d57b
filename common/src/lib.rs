pub mod config;
pub mod messages;
pub mod models;
pub mod token;
pub mod utils;

pub use crate::config::*;
pub use crate::messages::*;
pub use crate::models::session::{Fingerprint, Session, SessionResponse, SiweProof};
pub use crate::token::*;
pub use crate::utils::*;
