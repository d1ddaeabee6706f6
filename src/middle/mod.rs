//! Names are checked here, dead statements are removed from the tree and the
//! result is lowered to the typed IR.

pub mod ir;
pub mod optimization;
pub mod resolve;
