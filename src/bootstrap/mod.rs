//! Bootstrap credential handling
//!
//! The bootstrap key is the one-time credential an operator supplies to join
//! this node to a cluster. It carries the cluster's enrollment endpoint and is
//! sent verbatim in the `X-Bootstrap-Key` header of the join request.

mod key;

pub use key::{decode_bootstrap_key, ClusterLocation, KeyError, BOOTSTRAP_KEY_FIELDS};
