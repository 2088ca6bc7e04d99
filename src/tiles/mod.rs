pub mod clip;
pub mod coord;
pub mod encode;
pub mod filter;
pub mod kind;
pub mod query;
pub mod service;

pub use self::clip::*;
pub use self::coord::*;
pub use self::encode::*;
pub use self::filter::*;
pub use self::kind::*;
pub use self::query::*;
pub use self::service::*;
