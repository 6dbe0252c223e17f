mod labor;
mod record;
mod session;

pub use labor::*;
pub use record::*;
pub use session::*;
