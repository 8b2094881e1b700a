pub mod contract;
pub mod eligibility;
pub mod session;
pub mod window;

pub use contract::*;
pub use eligibility::*;
pub use session::*;
pub use window::*;
