//! Small helpers shared by the identity and query modules.

pub mod id_generator;
pub mod watch;
