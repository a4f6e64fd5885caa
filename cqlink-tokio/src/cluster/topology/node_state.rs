use bytemuck::NoUninit;
use derive_more::Display;

/// The state of a node, as viewed from the driver.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, NoUninit)]
#[repr(u8)]
pub enum NodeState {
    /// The node is usable by queries. This is the initial state of every known node, since it
    /// might accept connections until proven otherwise.
    Up,
    /// The driver has lost connectivity to the node and waits for the next reconnection attempt,
    /// as scheduled by the [`ReconnectionPolicy`](crate::retry::ReconnectionPolicy).
    Down,
    /// The node is never used, either because it was explicitly ignored, or because its
    /// reconnection schedule ran out of attempts.
    Ignored,
}
