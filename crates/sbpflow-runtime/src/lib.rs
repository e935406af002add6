pub mod actor;
pub mod comm_net;
pub mod compute;
pub mod config;
pub mod copy_comm_net;
pub mod msg;
pub mod registry;
pub mod router;
pub mod work;

pub use actor::*;
pub use comm_net::*;
pub use compute::*;
pub use config::*;
pub use copy_comm_net::*;
pub use msg::*;
pub use registry::*;
pub use router::*;
pub use work::*;
