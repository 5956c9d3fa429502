pub mod session;
pub mod vehicle;

pub use session::{Confidence, Decision, OriginTag};
