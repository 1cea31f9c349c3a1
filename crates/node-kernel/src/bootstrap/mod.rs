//! # Bootstrap
//!
//! The two stages the kernel runs on startup:
//!
//! - `register`: [`RegistrationPipeline`] validates and registers providers
//! - `boot`: [`LifecycleController`] boots or defers them and keeps watching

pub mod lifecycle;
pub mod register;

pub use lifecycle::{LifecycleController, ProviderWatcher};
pub use register::{RegistrationPipeline, RegistrationReport};
