//! Utility modules for helium.

pub mod qname;
