mod node;
mod node_state;

pub use self::node::{Node, ProbeGuard};
pub use self::node_state::NodeState;
