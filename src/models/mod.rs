pub mod credit;
pub mod dashboard;
pub mod inspection;
pub mod mint;
pub mod photo;
pub mod user;

pub use credit::*;
pub use dashboard::*;
pub use inspection::*;
pub use mint::*;
pub use photo::*;
pub use user::*;
