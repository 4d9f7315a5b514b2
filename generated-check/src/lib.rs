//! Types emitted by the Rust backend from `model.json`, compiled as a crate.

#[allow(dead_code, unused_imports, clippy::all)]
mod fx {
    include!(concat!(env!("OUT_DIR"), "/model.rs"));
}

pub use fx::*;
