pub(crate) mod circular;
pub(crate) mod peering;

pub(crate) use circular::with_circular_catch;
pub(crate) use peering::PeerWalk;
