//! # Node Kernel Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Stub providers, call journal, event recorder
//! │
//! └── integration/      # Kernel scenarios end to end
//!     ├── registration.rs
//!     ├── lifecycle.rs
//!     └── dispatch.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p kernel-tests
//!
//! # By category
//! cargo test -p kernel-tests integration::registration::
//! cargo test -p kernel-tests integration::lifecycle::
//!
//! # Benchmarks
//! cargo bench -p kernel-tests
//! ```

pub mod support;
